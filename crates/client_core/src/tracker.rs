//! Live view of one project's shipment: a background poller publishing on a
//! watch channel, the role-gated lifecycle actions, and the render model the
//! dashboard and CLI draw from.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::{ProjectId, Role, Shipment, ShipmentStatus},
    lifecycle::{allowed_actions, timeline, ShipmentAction, TimelineStep},
};
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{events::EventBus, perform_action, ClientError, ShipmentApi};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub const EMPTY_TITLE: &str = "Sin información de envío";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    /// True until the first fetch settles.
    pub loading: bool,
    pub shipment: Option<Shipment>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            loading: true,
            shipment: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Shipping,
    Return,
}

impl LabelKind {
    pub fn title(self) -> &'static str {
        match self {
            LabelKind::Shipping => "Descargar etiqueta de envío",
            LabelKind::Return => "Descargar etiqueta de devolución",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDownload {
    pub kind: LabelKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentPanel {
    pub status: ShipmentStatus,
    pub badge: &'static str,
    pub tracking_number: Option<String>,
    pub timeline: Vec<TimelineStep>,
    pub return_notice: Option<&'static str>,
    pub downloads: Vec<LabelDownload>,
    pub actions: Vec<ShipmentAction>,
    pub updating: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerView {
    Loading,
    Empty { message: &'static str },
    Shipment(ShipmentPanel),
}

pub fn render(role: Role, state: &TrackerState, updating: bool) -> TrackerView {
    if state.loading {
        return TrackerView::Loading;
    }
    let Some(shipment) = state.shipment.as_ref() else {
        return TrackerView::Empty {
            message: empty_message(role),
        };
    };
    TrackerView::Shipment(ShipmentPanel {
        status: shipment.status,
        badge: shipment.status.label(),
        tracking_number: shipment.tracking_number.clone(),
        timeline: timeline(shipment.status, shipment.return_required),
        return_notice: return_notice(role, shipment),
        downloads: downloads(shipment),
        actions: allowed_actions(role, shipment.status, shipment.return_required)
            .into_iter()
            .collect(),
        updating,
    })
}

fn empty_message(role: Role) -> &'static str {
    match role {
        Role::Client => "Aún no has generado la etiqueta de envío para este proyecto.",
        Role::Creator => {
            "El cliente aún no ha generado la etiqueta de envío para este proyecto."
        }
    }
}

fn return_notice(role: Role, shipment: &Shipment) -> Option<&'static str> {
    if !shipment.return_required || shipment.status.is_return_phase() {
        return None;
    }
    Some(match role {
        Role::Creator => {
            "Al finalizar el proyecto, deberás devolver el producto al cliente. \
             Se generará automáticamente una etiqueta de devolución."
        }
        Role::Client => {
            "El creador deberá devolver el producto una vez finalizado el proyecto. \
             La etiqueta de devolución ya está incluida."
        }
    })
}

fn downloads(shipment: &Shipment) -> Vec<LabelDownload> {
    let mut out = Vec::new();
    if let Some(url) = shipment.label_url.as_ref() {
        if shipment.status != ShipmentStatus::Pending {
            out.push(LabelDownload {
                kind: LabelKind::Shipping,
                url: url.clone(),
            });
        }
    }
    if let Some(url) = shipment.return_label_url.as_ref() {
        if shipment.return_required || shipment.status == ShipmentStatus::ReturnRequested {
            out.push(LabelDownload {
                kind: LabelKind::Return,
                url: url.clone(),
            });
        }
    }
    out
}

fn success_message(action: ShipmentAction) -> String {
    match action {
        ShipmentAction::ConfirmShipped | ShipmentAction::ConfirmReceived => {
            format!("Estado actualizado a: {}", action.target_status().label())
        }
        ShipmentAction::StartReturn => "Devolución solicitada correctamente".to_string(),
        ShipmentAction::ConfirmReturnReceived => "Devolución confirmada correctamente".to_string(),
    }
}

fn failure_message(action: ShipmentAction) -> &'static str {
    match action {
        ShipmentAction::ConfirmShipped | ShipmentAction::ConfirmReceived => {
            "Error al actualizar el estado del envío"
        }
        ShipmentAction::StartReturn => "Error al solicitar la devolución",
        ShipmentAction::ConfirmReturnReceived => "Error al confirmar la devolución",
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{action:?} is not available to this role while the shipment is {status}")]
    NotAllowed {
        action: ShipmentAction,
        status: ShipmentStatus,
    },
    #[error("no shipment loaded for this project")]
    NoShipment,
    #[error("another shipment update is still running")]
    Busy,
    #[error(transparent)]
    Api(#[from] ClientError),
}

/// Stops the poller when dropped.
#[derive(Debug)]
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Aborts the poller and waits until it has unwound.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.as_ref() {
            task.abort();
        }
    }
}

struct UpdatingGuard<'a>(&'a AtomicBool);

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ShipmentTracker {
    api: Arc<dyn ShipmentApi>,
    project_id: ProjectId,
    role: Role,
    events: EventBus,
    state: watch::Sender<TrackerState>,
    updating: AtomicBool,
}

impl ShipmentTracker {
    pub fn new(
        api: Arc<dyn ShipmentApi>,
        project_id: ProjectId,
        role: Role,
        events: EventBus,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(TrackerState::default());
        Arc::new(Self {
            api,
            project_id,
            role,
            events,
            state,
            updating: AtomicBool::new(false),
        })
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TrackerState {
        self.state.borrow().clone()
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub fn view(&self) -> TrackerView {
        render(self.role, &self.state.borrow(), self.is_updating())
    }

    /// Fetches once; watchers are only woken when something visible changed.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        match self.api.shipment(self.project_id).await {
            Ok(fetched) => {
                let changed = self.state.send_if_modified(|state| {
                    let changed = state.loading || state.shipment != fetched;
                    state.loading = false;
                    state.shipment = fetched;
                    changed
                });
                debug!(project_id = %self.project_id, changed, "shipment: fetched");
                Ok(())
            }
            Err(err) => {
                self.state.send_if_modified(|state| {
                    let was_loading = state.loading;
                    state.loading = false;
                    was_loading
                });
                Err(err)
            }
        }
    }

    /// Fetches now and then every `period` until the handle goes away.
    pub fn start_polling(self: &Arc<Self>, period: Duration) -> PollHandle {
        let tracker = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = tracker.refresh().await {
                    warn!(project_id = %tracker.project_id, %error, "shipment: poll failed");
                }
            }
        });
        PollHandle { task: Some(task) }
    }

    /// Runs one lifecycle action for this tracker's role, then re-fetches.
    pub async fn perform(&self, action: ShipmentAction) -> Result<Shipment, TrackerError> {
        let (status, return_required) = {
            let state = self.state.borrow();
            let shipment = state.shipment.as_ref().ok_or(TrackerError::NoShipment)?;
            (shipment.status, shipment.return_required)
        };
        if !allowed_actions(self.role, status, return_required).contains(&action) {
            return Err(TrackerError::NotAllowed { action, status });
        }
        if self
            .updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrackerError::Busy);
        }

        let result = {
            let _guard = UpdatingGuard(&self.updating);
            perform_action(self.api.as_ref(), self.project_id, action).await
        };
        match result {
            Ok(shipment) => {
                info!(
                    project_id = %self.project_id,
                    action = action.as_str(),
                    status = ?shipment.status,
                    "shipment: action applied"
                );
                self.events.notify_success(success_message(action));
                if let Err(error) = self.refresh().await {
                    warn!(project_id = %self.project_id, %error, "shipment: re-fetch after action failed");
                }
                Ok(shipment)
            }
            Err(err) => {
                warn!(
                    project_id = %self.project_id,
                    action = action.as_str(),
                    error = %err,
                    "shipment: action failed"
                );
                self.events.notify_error(failure_message(action));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/tracker_tests.rs"]
mod tests;
