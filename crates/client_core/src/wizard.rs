use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::{
    domain::{Address, Dimensions, ProjectId, Shipment},
    protocol::{CreateLabelRequest, QuoteRequest, ShippingQuote},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{events::EventBus, ClientError, ShipmentApi};

pub const QUOTE_FAILED: &str =
    "Error al calcular el envío. Por favor verifica los datos ingresados.";
pub const LABEL_CREATED: &str = "¡Etiqueta de envío creada correctamente!";
pub const LABEL_FAILED: &str = "Error al crear la etiqueta. Por favor intenta nuevamente.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardStep {
    Address,
    Dimensions,
    Review,
    Completed,
    Cancelled,
}

impl WizardStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, WizardStep::Completed | WizardStep::Cancelled)
    }
}

/// Everything the brand types in before a label exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipmentFormState {
    pub origin_address: Address,
    pub destination_address: Address,
    pub weight: f64,
    pub dimensions: Dimensions,
    pub description: String,
    pub return_required: bool,
}

impl Default for ShipmentFormState {
    fn default() -> Self {
        Self {
            origin_address: Address::default(),
            destination_address: Address::default(),
            weight: 1.0,
            dimensions: Dimensions::default(),
            description: String::new(),
            return_required: false,
        }
    }
}

impl ShipmentFormState {
    pub fn quote_request(&self) -> QuoteRequest {
        QuoteRequest {
            origin_postal_code: self.origin_address.postal_code.clone(),
            destination_postal_code: self.destination_address.postal_code.clone(),
            weight: self.weight,
            width: self.dimensions.width,
            height: self.dimensions.height,
            length: self.dimensions.length,
            return_required: self.return_required,
        }
    }

    pub fn label_request(&self) -> CreateLabelRequest {
        CreateLabelRequest {
            origin_address: self.origin_address.clone(),
            destination_address: self.destination_address.clone(),
            weight: self.weight,
            dimensions: self.dimensions,
            return_required: self.return_required,
            description: self.description.clone(),
        }
    }

    /// Blank address fields, prefixed with the side they belong to.
    pub fn address_issues(&self) -> Vec<String> {
        let origin = self
            .origin_address
            .missing_fields()
            .into_iter()
            .map(|field| format!("origin.{field}"));
        let destination = self
            .destination_address
            .missing_fields()
            .into_iter()
            .map(|field| format!("destination.{field}"));
        origin.chain(destination).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WizardOptions {
    /// Refuse to leave the address step while any address field is blank.
    pub require_complete_addresses: bool,
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("not available on the {0:?} step")]
    WrongStep(WizardStep),
    #[error("incomplete addresses: {}", .0.join(", "))]
    IncompleteAddresses(Vec<String>),
    #[error("no quote has been calculated")]
    MissingQuote,
    #[error(transparent)]
    Api(#[from] ClientError),
}

pub struct ShipmentWizard {
    api: Arc<dyn ShipmentApi>,
    project_id: ProjectId,
    events: EventBus,
    options: WizardOptions,
    step: WizardStep,
    form: ShipmentFormState,
    quote: Option<ShippingQuote>,
}

impl ShipmentWizard {
    pub fn new(api: Arc<dyn ShipmentApi>, project_id: ProjectId, events: EventBus) -> Self {
        Self::with_options(api, project_id, events, WizardOptions::default())
    }

    pub fn with_options(
        api: Arc<dyn ShipmentApi>,
        project_id: ProjectId,
        events: EventBus,
        options: WizardOptions,
    ) -> Self {
        Self {
            api,
            project_id,
            events,
            options,
            step: WizardStep::Address,
            form: ShipmentFormState::default(),
            quote: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn form(&self) -> &ShipmentFormState {
        &self.form
    }

    pub fn quote(&self) -> Option<&ShippingQuote> {
        self.quote.as_ref()
    }

    pub fn can_generate_label(&self) -> bool {
        self.step == WizardStep::Review && self.quote.is_some()
    }

    /// The form is editable only while its fields are on screen.
    pub fn form_mut(&mut self) -> Result<&mut ShipmentFormState, WizardError> {
        match self.step {
            WizardStep::Address | WizardStep::Dimensions => Ok(&mut self.form),
            other => Err(WizardError::WrongStep(other)),
        }
    }

    /// "Siguiente": address to dimensions. Dimensions advance through a quote.
    pub fn next(&mut self) -> Result<WizardStep, WizardError> {
        if self.step != WizardStep::Address {
            return Err(WizardError::WrongStep(self.step));
        }
        if self.options.require_complete_addresses {
            let issues = self.form.address_issues();
            if !issues.is_empty() {
                return Err(WizardError::IncompleteAddresses(issues));
            }
        }
        self.step = WizardStep::Dimensions;
        Ok(self.step)
    }

    pub fn back(&mut self) -> Result<WizardStep, WizardError> {
        self.step = match self.step {
            WizardStep::Dimensions => WizardStep::Address,
            WizardStep::Review => WizardStep::Dimensions,
            other => return Err(WizardError::WrongStep(other)),
        };
        Ok(self.step)
    }

    pub fn cancel(&mut self) -> Result<(), WizardError> {
        if self.step != WizardStep::Address {
            return Err(WizardError::WrongStep(self.step));
        }
        self.form = ShipmentFormState::default();
        self.quote = None;
        self.step = WizardStep::Cancelled;
        Ok(())
    }

    /// "Calcular envío": prices the parcel and moves on to review.
    pub async fn calculate_quote(&mut self) -> Result<&ShippingQuote, WizardError> {
        if self.step != WizardStep::Dimensions {
            return Err(WizardError::WrongStep(self.step));
        }
        match self.api.quote(&self.form.quote_request()).await {
            Ok(quote) => {
                self.step = WizardStep::Review;
                Ok(self.quote.insert(quote))
            }
            Err(err) => {
                warn!(project_id = %self.project_id, error = %err, "shipment: quote failed");
                self.events.notify_error(QUOTE_FAILED);
                Err(err.into())
            }
        }
    }

    /// "Generar Etiqueta": on success hands back the created shipment.
    pub async fn generate_label(&mut self) -> Result<Shipment, WizardError> {
        if self.step != WizardStep::Review {
            return Err(WizardError::WrongStep(self.step));
        }
        if self.quote.is_none() {
            return Err(WizardError::MissingQuote);
        }
        match self
            .api
            .create_label(self.project_id, &self.form.label_request())
            .await
        {
            Ok(shipment) => {
                info!(
                    project_id = %self.project_id,
                    tracking = ?shipment.tracking_number,
                    "shipment: label created"
                );
                self.events.notify_success(LABEL_CREATED);
                self.form = ShipmentFormState::default();
                self.quote = None;
                self.step = WizardStep::Completed;
                Ok(shipment)
            }
            Err(err) => {
                warn!(project_id = %self.project_id, error = %err, "shipment: label creation failed");
                self.events.notify_error(LABEL_FAILED);
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;
