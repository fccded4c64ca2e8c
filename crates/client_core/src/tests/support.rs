//! In-memory `ShipmentApi` used by the view-model tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{ProjectId, Shipment, ShipmentId, ShipmentStatus},
    lifecycle::validate_transition,
    protocol::{CreateLabelRequest, QuoteRequest, ShippingQuote},
};

use crate::{ClientError, ShipmentApi};

pub(crate) fn shipment(status: ShipmentStatus, return_required: bool) -> Shipment {
    let stamp = Utc
        .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("timestamp");
    Shipment {
        id: ShipmentId(1),
        project_id: ProjectId(7),
        status,
        tracking_number: Some("TR000000042".to_string()),
        carrier: Some("fedex".to_string()),
        label_url: Some("http://sandbox.test/labels/TR000000042.pdf".to_string()),
        return_label_url: return_required
            .then(|| "http://sandbox.test/labels/TR000000042-return.pdf".to_string()),
        return_required,
        estimated_delivery_date: None,
        created_at: stamp,
        updated_at: stamp,
    }
}

pub(crate) fn api_failure() -> ClientError {
    ClientError::Api {
        status: 500,
        code: None,
        message: "boom".to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub shipment: Mutex<Option<Shipment>>,
    pub fail_quote: Mutex<bool>,
    pub fail_label: Mutex<bool>,
    pub fail_mutations: Mutex<bool>,
    pub fail_fetch: Mutex<bool>,
    pub fetches: AtomicUsize,
    pub quotes: AtomicUsize,
    pub labels: AtomicUsize,
}

impl FakeApi {
    pub fn with_shipment(shipment: Shipment) -> Self {
        let api = Self::default();
        *api.shipment.lock().expect("lock") = Some(shipment);
        api
    }

    pub fn set_status(&self, status: ShipmentStatus) {
        if let Some(current) = self.shipment.lock().expect("lock").as_mut() {
            current.status = status;
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn advance(&self, project_id: ProjectId, to: ShipmentStatus) -> Result<Shipment, ClientError> {
        if *self.fail_mutations.lock().expect("lock") {
            return Err(api_failure());
        }
        let mut guard = self.shipment.lock().expect("lock");
        let current = guard
            .as_mut()
            .filter(|s| s.project_id == project_id)
            .ok_or(ClientError::NotFound)?;
        validate_transition(current.status, to, current.return_required).map_err(|err| {
            ClientError::Api {
                status: 409,
                code: None,
                message: err.to_string(),
            }
        })?;
        current.status = to;
        Ok(current.clone())
    }
}

#[async_trait]
impl ShipmentApi for FakeApi {
    async fn quote(&self, request: &QuoteRequest) -> Result<ShippingQuote, ClientError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_quote.lock().expect("lock") {
            return Err(api_failure());
        }
        Ok(ShippingQuote {
            price: if request.return_required { 2600.0 } else { 1700.0 },
            estimated_days: 7,
            carrier: Some("fedex".to_string()),
            valid_until: None,
        })
    }

    async fn create_label(
        &self,
        project_id: ProjectId,
        request: &CreateLabelRequest,
    ) -> Result<Shipment, ClientError> {
        self.labels.fetch_add(1, Ordering::SeqCst);
        if *self.fail_label.lock().expect("lock") {
            return Err(api_failure());
        }
        let mut created = shipment(ShipmentStatus::LabelCreated, request.return_required);
        created.project_id = project_id;
        *self.shipment.lock().expect("lock") = Some(created.clone());
        Ok(created)
    }

    async fn shipment(&self, project_id: ProjectId) -> Result<Option<Shipment>, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *self.fail_fetch.lock().expect("lock") {
            return Err(api_failure());
        }
        Ok(self
            .shipment
            .lock()
            .expect("lock")
            .clone()
            .filter(|s| s.project_id == project_id))
    }

    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ShipmentStatus,
    ) -> Result<Shipment, ClientError> {
        self.advance(project_id, status)
    }

    async fn request_return(&self, project_id: ProjectId) -> Result<Shipment, ClientError> {
        self.advance(project_id, ShipmentStatus::ReturnRequested)
    }

    async fn confirm_return(&self, project_id: ProjectId) -> Result<Shipment, ClientError> {
        self.advance(project_id, ShipmentStatus::Returned)
    }
}
