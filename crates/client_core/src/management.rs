use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::domain::{ProjectId, Role, Shipment};
use thiserror::Error;
use tracing::info;

use crate::{
    events::EventBus,
    tracker::ShipmentTracker,
    wizard::{ShipmentWizard, WizardOptions},
    ShipmentApi,
};

const NOT_SPECIFIED: &str = "No especificado";

/// Project-level shipping state owned by the parent page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementStatus {
    Pending,
    Shipped,
    Delivered,
    Confirmed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

impl TrackingInfo {
    pub fn carrier_or_default(&self) -> &str {
        self.carrier.as_deref().unwrap_or(NOT_SPECIFIED)
    }

    pub fn tracking_number_or_default(&self) -> &str {
        self.tracking_number.as_deref().unwrap_or(NOT_SPECIFIED)
    }
}

impl From<&Shipment> for TrackingInfo {
    fn from(shipment: &Shipment) -> Self {
        Self {
            tracking_number: shipment.tracking_number.clone(),
            carrier: shipment.carrier.clone(),
            additional_info: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Form,
    Tracker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementView {
    /// The brand still has to create the label.
    Form,
    Tracker {
        description: &'static str,
        summary: TrackingInfo,
        tracker_role: Role,
        can_confirm_receipt: bool,
    },
    Waiting {
        message: &'static str,
    },
}

/// Hooks back into the page that owns the project.
pub trait ManagementCallbacks: Send + Sync {
    fn on_update_shipment(&self, shipment: &Shipment);
    fn on_confirm_receipt(&self);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagementError {
    #[error("the shipment form is not on screen")]
    FormNotShown,
    #[error("receipt confirmation is not available")]
    ReceiptNotAvailable,
}

pub struct ShipmentManagement {
    role: Role,
    status: Option<ManagementStatus>,
    tracking: TrackingInfo,
    view_mode: ViewMode,
    callbacks: Arc<dyn ManagementCallbacks>,
}

impl ShipmentManagement {
    pub fn new(
        role: Role,
        status: Option<ManagementStatus>,
        tracking: TrackingInfo,
        callbacks: Arc<dyn ManagementCallbacks>,
    ) -> Self {
        let view_mode = match status {
            Some(ManagementStatus::Shipped | ManagementStatus::Delivered) => ViewMode::Tracker,
            _ => ViewMode::Form,
        };
        Self {
            role,
            status,
            tracking,
            view_mode,
            callbacks,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    /// The parent re-read the project.
    pub fn set_status(&mut self, status: Option<ManagementStatus>, tracking: TrackingInfo) {
        self.status = status;
        self.tracking = tracking;
    }

    pub fn view(&self) -> ManagementView {
        let unshipped = matches!(self.status, None | Some(ManagementStatus::Pending));
        match (self.role, self.status) {
            (Role::Client, _) if unshipped => match self.view_mode {
                ViewMode::Form => ManagementView::Form,
                ViewMode::Tracker => self.tracker_view(false),
            },
            (role, Some(ManagementStatus::Shipped | ManagementStatus::Delivered)) => {
                let can_confirm = role == Role::Creator
                    && self.status == Some(ManagementStatus::Delivered);
                self.tracker_view(can_confirm)
            }
            (Role::Creator, _) => ManagementView::Waiting {
                message: "Esperando que la marca registre la información de envío",
            },
            (Role::Client, _) => ManagementView::Waiting {
                message: "No hay información de envío registrada",
            },
        }
    }

    fn tracker_view(&self, can_confirm_receipt: bool) -> ManagementView {
        ManagementView::Tracker {
            description: match self.role {
                Role::Client => "El producto ha sido enviado al creador",
                Role::Creator => "La marca ha enviado un producto para este proyecto",
            },
            summary: self.tracking.clone(),
            tracker_role: self.role,
            can_confirm_receipt,
        }
    }

    /// The wizard to show when the view is [`ManagementView::Form`].
    pub fn wizard(
        &self,
        api: Arc<dyn ShipmentApi>,
        project_id: ProjectId,
        events: EventBus,
        options: WizardOptions,
    ) -> Option<ShipmentWizard> {
        (self.view() == ManagementView::Form)
            .then(|| ShipmentWizard::with_options(api, project_id, events, options))
    }

    /// The tracker to show when the view is [`ManagementView::Tracker`].
    pub fn tracker(
        &self,
        api: Arc<dyn ShipmentApi>,
        project_id: ProjectId,
        events: EventBus,
    ) -> Option<Arc<ShipmentTracker>> {
        match self.view() {
            ManagementView::Tracker { tracker_role, .. } => {
                Some(ShipmentTracker::new(api, project_id, tracker_role, events))
            }
            _ => None,
        }
    }

    /// Called with the shipment the wizard created.
    pub fn complete_form(&mut self, shipment: &Shipment) -> Result<(), ManagementError> {
        if self.view() != ManagementView::Form {
            return Err(ManagementError::FormNotShown);
        }
        self.callbacks.on_update_shipment(shipment);
        self.tracking = TrackingInfo::from(shipment);
        self.view_mode = ViewMode::Tracker;
        info!(project_id = %shipment.project_id, "shipment: form completed");
        Ok(())
    }

    /// "Confirmar Recepción del Producto".
    pub fn confirm_receipt(&self) -> Result<(), ManagementError> {
        match self.view() {
            ManagementView::Tracker {
                can_confirm_receipt: true,
                ..
            } => {
                self.callbacks.on_confirm_receipt();
                Ok(())
            }
            _ => Err(ManagementError::ReceiptNotAvailable),
        }
    }
}

#[cfg(test)]
#[path = "tests/management_tests.rs"]
mod tests;
