use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use chrono::{Duration, Utc};
use shared::{
    domain::{Dimensions, ProjectId, Role, Shipment, ShipmentId, ShipmentStatus},
    error::{ApiError, ErrorCode},
    lifecycle::{validate_transition, ShipmentAction},
    protocol::{CreateLabelRequest, QuoteRequest, ShippingQuote},
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

mod tokens;

pub use tokens::{Claims, TokenIssuer, TokenKind};

const BASE_PRICE: f64 = 1500.0;
const PRICE_PER_KG: f64 = 200.0;
const RETURN_SURCHARGE: f64 = 1.5;
const SANDBOX_CARRIER: &str = "fedex";
const QUOTE_VALIDITY_HOURS: i64 = 24;
const DELIVERY_ESTIMATE_DAYS: i64 = 5;

#[derive(Clone)]
pub struct ApiContext {
    pub shipments: ShipmentStore,
    pub tokens: TokenIssuer,
    pub public_url: String,
}

/// In-memory shipments keyed by project; one shipment per project.
#[derive(Clone, Default)]
pub struct ShipmentStore {
    by_project: Arc<RwLock<HashMap<ProjectId, Shipment>>>,
    next_id: Arc<AtomicI64>,
}

impl ShipmentStore {
    pub async fn get(&self, project_id: ProjectId) -> Option<Shipment> {
        self.by_project.read().await.get(&project_id).cloned()
    }

    fn allocate_id(&self) -> ShipmentId {
        ShipmentId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Sandbox tariff: base + weight + volume + postal distance, with a return surcharge,
/// rounded to the nearest hundred.
pub fn quote_price(req: &QuoteRequest) -> f64 {
    let dimensions = Dimensions {
        width: req.width,
        height: req.height,
        length: req.length,
    };
    let volume_factor = dimensions.volume() / 1000.0;
    let distance_factor = postal_distance(req) as f64 / 100.0;
    let mut price = BASE_PRICE + req.weight * PRICE_PER_KG + volume_factor + distance_factor;
    if req.return_required {
        price *= RETURN_SURCHARGE;
    }
    (price / 100.0).round() * 100.0
}

pub fn quote_estimated_days(req: &QuoteRequest) -> u32 {
    3 + (postal_distance(req) / 1000).min(4) as u32
}

fn postal_distance(req: &QuoteRequest) -> u64 {
    let origin = postal_number(&req.origin_postal_code).unwrap_or_default();
    let destination = postal_number(&req.destination_postal_code).unwrap_or_default();
    origin.abs_diff(destination)
}

/// Digits of a postal code as a number; `C1043AAX` reads as 1043.
fn postal_number(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub fn quote_shipping(req: &QuoteRequest) -> Result<ShippingQuote, ApiError> {
    if postal_number(&req.origin_postal_code).is_none() {
        return Err(ApiError::validation("origin postal code is required"));
    }
    if postal_number(&req.destination_postal_code).is_none() {
        return Err(ApiError::validation("destination postal code is required"));
    }
    if !(req.weight > 0.0) {
        return Err(ApiError::validation("weight must be positive"));
    }
    if !(req.width > 0.0 && req.height > 0.0 && req.length > 0.0) {
        return Err(ApiError::validation("dimensions must be positive"));
    }

    Ok(ShippingQuote {
        price: quote_price(req),
        estimated_days: quote_estimated_days(req),
        carrier: Some(SANDBOX_CARRIER.to_string()),
        valid_until: Some(Utc::now() + Duration::hours(QUOTE_VALIDITY_HOURS)),
    })
}

pub async fn create_label(
    ctx: &ApiContext,
    caller: Role,
    project_id: ProjectId,
    req: CreateLabelRequest,
) -> Result<Shipment, ApiError> {
    if caller != Role::Client {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only the brand can generate a shipping label",
        ));
    }
    if !(req.weight > 0.0) {
        return Err(ApiError::validation("weight must be positive"));
    }
    for (side, address) in [
        ("origin", &req.origin_address),
        ("destination", &req.destination_address),
    ] {
        if postal_number(&address.postal_code).is_none() {
            return Err(ApiError::validation(format!(
                "{side} postal code is required"
            )));
        }
    }

    let mut guard = ctx.shipments.by_project.write().await;
    let existing = guard.get(&project_id);
    if let Some(existing) = existing {
        validate_transition(
            existing.status,
            ShipmentStatus::LabelCreated,
            req.return_required,
        )
        .map_err(|err| ApiError::new(ErrorCode::Conflict, err.to_string()))?;
    }

    let now = Utc::now();
    let id = existing
        .map(|shipment| shipment.id)
        .unwrap_or_else(|| ctx.shipments.allocate_id());
    let tracking_number = format!("TR{:09}", Uuid::new_v4().as_u128() % 1_000_000_000);
    let shipment = Shipment {
        id,
        project_id,
        status: ShipmentStatus::LabelCreated,
        label_url: Some(format!("{}/labels/{tracking_number}.pdf", ctx.public_url)),
        return_label_url: req.return_required.then(|| {
            format!("{}/labels/{tracking_number}-return.pdf", ctx.public_url)
        }),
        tracking_number: Some(tracking_number),
        carrier: Some(SANDBOX_CARRIER.to_string()),
        return_required: req.return_required,
        estimated_delivery_date: Some(now + Duration::days(DELIVERY_ESTIMATE_DAYS)),
        created_at: now,
        updated_at: now,
    };
    guard.insert(project_id, shipment.clone());

    info!(
        project_id = %project_id,
        shipment_id = %shipment.id,
        return_required = shipment.return_required,
        "shipping label created"
    );
    Ok(shipment)
}

pub async fn get_shipment(ctx: &ApiContext, project_id: ProjectId) -> Result<Shipment, ApiError> {
    ctx.shipments
        .get(project_id)
        .await
        .ok_or_else(|| ApiError::not_found("no shipment for project"))
}

pub async fn update_status(
    ctx: &ApiContext,
    caller: Role,
    project_id: ProjectId,
    status: ShipmentStatus,
) -> Result<Shipment, ApiError> {
    let action = match status {
        ShipmentStatus::InTransit | ShipmentStatus::Delivered => ShipmentAction::for_target(status),
        _ => None,
    }
    .ok_or_else(|| {
        ApiError::validation(format!(
            "status must be in_transit or delivered, got {status}"
        ))
    })?;
    apply_action(ctx, caller, project_id, action).await
}

pub async fn request_return(
    ctx: &ApiContext,
    caller: Role,
    project_id: ProjectId,
) -> Result<Shipment, ApiError> {
    apply_action(ctx, caller, project_id, ShipmentAction::StartReturn).await
}

pub async fn confirm_return(
    ctx: &ApiContext,
    caller: Role,
    project_id: ProjectId,
) -> Result<Shipment, ApiError> {
    apply_action(ctx, caller, project_id, ShipmentAction::ConfirmReturnReceived).await
}

async fn apply_action(
    ctx: &ApiContext,
    caller: Role,
    project_id: ProjectId,
    action: ShipmentAction,
) -> Result<Shipment, ApiError> {
    let mut guard = ctx.shipments.by_project.write().await;
    let shipment = guard
        .get_mut(&project_id)
        .ok_or_else(|| ApiError::not_found("no shipment for project"))?;

    let target = action.target_status();
    validate_transition(shipment.status, target, shipment.return_required)
        .map_err(|err| ApiError::new(ErrorCode::Conflict, err.to_string()))?;
    if action.actor() != caller {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            format!("{} cannot {}", caller, action.as_str()),
        ));
    }

    let previous = shipment.status;
    shipment.status = target;
    shipment.updated_at = Utc::now();
    info!(
        project_id = %project_id,
        from = %previous,
        to = %target,
        role = %caller,
        "shipment status changed"
    );
    Ok(shipment.clone())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
