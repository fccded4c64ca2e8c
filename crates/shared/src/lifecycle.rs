//! Shipment state machine: legal transitions, role capabilities and the
//! milestone timeline derived from a status.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Role, ShipmentStatus};

/// A status-mutating operation a user can trigger on an existing shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentAction {
    /// Brand handed the package to the carrier.
    ConfirmShipped,
    /// Creator got the package.
    ConfirmReceived,
    /// Creator starts sending the product back.
    StartReturn,
    /// Brand got the product back.
    ConfirmReturnReceived,
}

impl ShipmentAction {
    pub const ALL: [ShipmentAction; 4] = [
        ShipmentAction::ConfirmShipped,
        ShipmentAction::ConfirmReceived,
        ShipmentAction::StartReturn,
        ShipmentAction::ConfirmReturnReceived,
    ];

    pub fn actor(self) -> Role {
        match self {
            ShipmentAction::ConfirmShipped | ShipmentAction::ConfirmReturnReceived => Role::Client,
            ShipmentAction::ConfirmReceived | ShipmentAction::StartReturn => Role::Creator,
        }
    }

    pub fn source_status(self) -> ShipmentStatus {
        match self {
            ShipmentAction::ConfirmShipped => ShipmentStatus::LabelCreated,
            ShipmentAction::ConfirmReceived => ShipmentStatus::InTransit,
            ShipmentAction::StartReturn => ShipmentStatus::Delivered,
            ShipmentAction::ConfirmReturnReceived => ShipmentStatus::ReturnRequested,
        }
    }

    pub fn target_status(self) -> ShipmentStatus {
        match self {
            ShipmentAction::ConfirmShipped => ShipmentStatus::InTransit,
            ShipmentAction::ConfirmReceived => ShipmentStatus::Delivered,
            ShipmentAction::StartReturn => ShipmentStatus::ReturnRequested,
            ShipmentAction::ConfirmReturnReceived => ShipmentStatus::Returned,
        }
    }

    pub fn is_return_flow(self) -> bool {
        matches!(
            self,
            ShipmentAction::StartReturn | ShipmentAction::ConfirmReturnReceived
        )
    }

    /// Only opening a return depends on `return_required`; a shipment already
    /// in `return_requested` can always be closed out.
    pub fn needs_return_required(self) -> bool {
        self == ShipmentAction::StartReturn
    }

    /// The action whose effect is moving a shipment into `target`.
    pub fn for_target(target: ShipmentStatus) -> Option<ShipmentAction> {
        Self::ALL
            .into_iter()
            .find(|action| action.target_status() == target)
    }

    pub fn label(self) -> &'static str {
        match self {
            ShipmentAction::ConfirmShipped => "Confirmar Envío Realizado",
            ShipmentAction::ConfirmReceived => "Confirmar Recepción",
            ShipmentAction::StartReturn => "Iniciar Devolución",
            ShipmentAction::ConfirmReturnReceived => "Confirmar Devolución Recibida",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentAction::ConfirmShipped => "confirm_shipped",
            ShipmentAction::ConfirmReceived => "confirm_received",
            ShipmentAction::StartReturn => "start_return",
            ShipmentAction::ConfirmReturnReceived => "confirm_return_received",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("shipment is already {0}")]
    Unchanged(ShipmentStatus),
    #[error("cannot move shipment back from {from} to {to}")]
    Backward {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },
    #[error("cannot skip from {from} to {to}")]
    Skipped {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },
    #[error("shipment does not require a return")]
    ReturnNotRequired,
}

/// Checks a single status change against the forward-only lifecycle.
///
/// Each legal edge advances exactly one rank; entering `return_requested`
/// also needs `return_required`.
pub fn validate_transition(
    from: ShipmentStatus,
    to: ShipmentStatus,
    return_required: bool,
) -> Result<(), TransitionError> {
    if from == to {
        return Err(TransitionError::Unchanged(from));
    }
    if to.rank() < from.rank() {
        return Err(TransitionError::Backward { from, to });
    }
    if to.rank() != from.rank() + 1 {
        return Err(TransitionError::Skipped { from, to });
    }
    if to == ShipmentStatus::ReturnRequested && !return_required {
        return Err(TransitionError::ReturnNotRequired);
    }
    Ok(())
}

/// Actions `role` may trigger on a shipment in `status`.
pub fn allowed_actions(
    role: Role,
    status: ShipmentStatus,
    return_required: bool,
) -> BTreeSet<ShipmentAction> {
    ShipmentAction::ALL
        .into_iter()
        .filter(|action| action.actor() == role)
        .filter(|action| action.source_status() == status)
        .filter(|action| !action.needs_return_required() || return_required)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    LabelGenerated,
    InTransit,
    Delivered,
    ReturnRequested,
    Returned,
}

impl Milestone {
    pub fn status(self) -> ShipmentStatus {
        match self {
            Milestone::LabelGenerated => ShipmentStatus::LabelCreated,
            Milestone::InTransit => ShipmentStatus::InTransit,
            Milestone::Delivered => ShipmentStatus::Delivered,
            Milestone::ReturnRequested => ShipmentStatus::ReturnRequested,
            Milestone::Returned => ShipmentStatus::Returned,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Milestone::LabelGenerated => "Etiqueta Generada",
            Milestone::InTransit => "En Tránsito",
            Milestone::Delivered => "Entregado",
            Milestone::ReturnRequested => "Devolución Solicitada",
            Milestone::Returned => "Producto Devuelto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub milestone: Milestone,
    pub completed: bool,
}

pub fn shows_return_steps(status: ShipmentStatus, return_required: bool) -> bool {
    return_required || status.is_return_phase()
}

pub fn timeline(status: ShipmentStatus, return_required: bool) -> Vec<TimelineStep> {
    let mut milestones = vec![
        Milestone::LabelGenerated,
        Milestone::InTransit,
        Milestone::Delivered,
    ];
    if shows_return_steps(status, return_required) {
        milestones.extend([Milestone::ReturnRequested, Milestone::Returned]);
    }

    milestones
        .into_iter()
        .map(|milestone| TimelineStep {
            milestone,
            completed: status.rank() >= milestone.status().rank(),
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
