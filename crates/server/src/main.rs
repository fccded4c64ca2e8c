use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use server_api::{
    confirm_return, create_label, get_shipment, quote_shipping, request_return, update_status,
    ApiContext, Claims, ShipmentStore, TokenIssuer, TokenKind,
};
use shared::{
    domain::{ProjectId, Shipment},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateLabelRequest, QuoteRequest, ShippingQuote, StatusUpdateRequest, TokenObtainRequest,
        TokenPair, TokenRefreshRequest, TokenRefreshResponse,
    },
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

const MAX_BODY_BYTES: usize = 64 * 1024;

struct AppState {
    api: ApiContext,
}

type HttpError = (StatusCode, Json<ApiError>);
type HttpResult<T> = Result<Json<T>, HttpError>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let api = ApiContext {
        shipments: ShipmentStore::default(),
        tokens: TokenIssuer::new(
            settings.jwt_secret.as_bytes(),
            settings.access_ttl_seconds,
            settings.refresh_ttl_seconds,
        ),
        public_url: settings.resolved_public_url(),
    };
    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "shipment sandbox listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/token/", post(obtain_token))
        .route("/token/refresh/", post(refresh_token))
        .route("/projects/shipping/quote/", post(http_quote))
        .route("/projects/projects/:project_id/shipment/", get(http_get_shipment))
        .route(
            "/projects/projects/:project_id/shipment/label/",
            post(http_create_label),
        )
        .route(
            "/projects/projects/:project_id/shipment/status/",
            post(http_update_status),
        )
        .route(
            "/projects/projects/:project_id/shipment/return/",
            post(http_request_return),
        )
        .route(
            "/projects/projects/:project_id/shipment/returned/",
            post(http_confirm_return),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_error(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, HttpError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            http_error(ApiError::new(
                ErrorCode::Unauthorized,
                "missing bearer token",
            ))
        })?;
    state
        .api
        .tokens
        .verify(token, TokenKind::Access)
        .map_err(http_error)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn obtain_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenObtainRequest>,
) -> HttpResult<TokenPair> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(http_error(ApiError::validation("username is required")));
    }
    let pair = state
        .api
        .tokens
        .issue_pair(username, req.role)
        .map_err(http_error)?;
    info!(%username, role = %req.role, "sandbox tokens issued");
    Ok(Json(pair))
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRefreshRequest>,
) -> HttpResult<TokenRefreshResponse> {
    state
        .api
        .tokens
        .refresh(&req.refresh)
        .map(Json)
        .map_err(http_error)
}

async fn http_quote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<QuoteRequest>,
) -> HttpResult<ShippingQuote> {
    let claims = authenticate(&state, &headers)?;
    debug!(user = %claims.sub, "quote requested");
    quote_shipping(&req).map(Json).map_err(http_error)
}

async fn http_get_shipment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
) -> HttpResult<Shipment> {
    authenticate(&state, &headers)?;
    get_shipment(&state.api, ProjectId(project_id))
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_create_label(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateLabelRequest>,
) -> HttpResult<Shipment> {
    let claims = authenticate(&state, &headers)?;
    create_label(&state.api, claims.role, ProjectId(project_id), req)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
    Json(req): Json<StatusUpdateRequest>,
) -> HttpResult<Shipment> {
    let claims = authenticate(&state, &headers)?;
    update_status(&state.api, claims.role, ProjectId(project_id), req.status)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_request_return(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
) -> HttpResult<Shipment> {
    let claims = authenticate(&state, &headers)?;
    request_return(&state.api, claims.role, ProjectId(project_id))
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_confirm_return(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
) -> HttpResult<Shipment> {
    let claims = authenticate(&state, &headers)?;
    confirm_return(&state.api, claims.role, ProjectId(project_id))
        .await
        .map(Json)
        .map_err(http_error)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
