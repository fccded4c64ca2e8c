use super::*;
use axum::{body, body::Body, http::Request, response::Response};
use shared::domain::ShipmentStatus;
use tower::ServiceExt;

fn test_app() -> Router {
    let api = ApiContext {
        shipments: ShipmentStore::default(),
        tokens: TokenIssuer::new(b"route-secret", 300, 3600),
        public_url: "http://sandbox.test".to_string(),
    };
    build_router(Arc::new(AppState { api }))
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn post_json(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    payload: serde_json::Value,
) -> Response {
    let mut request = Request::post(uri).header("content-type", "application/json");
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let request = request
        .body(Body::from(payload.to_string()))
        .expect("request");
    app.clone().oneshot(request).await.expect("response")
}

async fn get_with_token(app: &Router, uri: &str, token: &str) -> Response {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request");
    app.clone().oneshot(request).await.expect("response")
}

async fn sign_in(app: &Router, username: &str, role: &str) -> TokenPair {
    let response = post_json(
        app,
        "/token/",
        None,
        serde_json::json!({ "username": username, "role": role }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

fn label_payload(return_required: bool) -> serde_json::Value {
    let address = |postal: &str| {
        serde_json::json!({
            "street": "Av. Corrientes",
            "number": "1234",
            "city": "CABA",
            "state": "Buenos Aires",
            "postal_code": postal,
            "phone": "+5491123456789",
        })
    };
    serde_json::json!({
        "origin_address": address("1000"),
        "destination_address": address("5000"),
        "weight": 1.0,
        "dimensions": { "width": 20.0, "height": 15.0, "length": 30.0 },
        "return_required": return_required,
        "description": "Sample",
    })
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app();
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn shipment_routes_require_bearer_token() {
    let app = test_app();
    let request = Request::get("/projects/projects/1/shipment/")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let response = get_with_token(&app, "/projects/projects/1/shipment/", "garbage").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_cannot_be_used_as_access_token() {
    let app = test_app();
    let pair = sign_in(&app, "brand", "client").await;
    let response = get_with_token(&app, "/projects/projects/1/shipment/", &pair.refresh).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = post_json(
        &app,
        "/token/refresh/",
        None,
        serde_json::json!({ "refresh": pair.refresh }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed: TokenRefreshResponse = json_body(response).await;
    let response = get_with_token(&app, "/projects/projects/1/shipment/", &refreshed.access).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quote_route_prices_request() {
    let app = test_app();
    let pair = sign_in(&app, "brand", "marca").await;
    let response = post_json(
        &app,
        "/projects/shipping/quote/",
        Some(&pair.access),
        serde_json::json!({
            "origin_postal_code": "1000",
            "destination_postal_code": "5000",
            "weight": 1.0,
            "width": 20.0,
            "height": 15.0,
            "length": 30.0,
            "return_required": false,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let quote: ShippingQuote = json_body(response).await;
    assert_eq!(quote.price, 1700.0);
    assert_eq!(quote.estimated_days, 7);
}

#[tokio::test]
async fn shipment_lifecycle_over_http() {
    let app = test_app();
    let brand = sign_in(&app, "brand", "client").await;
    let creator = sign_in(&app, "creator", "creator").await;

    let response = post_json(
        &app,
        "/projects/projects/5/shipment/label/",
        Some(&brand.access),
        label_payload(true),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let shipment: Shipment = json_body(response).await;
    assert_eq!(shipment.status, ShipmentStatus::LabelCreated);

    let response = post_json(
        &app,
        "/projects/projects/5/shipment/status/",
        Some(&creator.access),
        serde_json::json!({ "status": "in_transit" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_json(
        &app,
        "/projects/projects/5/shipment/status/",
        Some(&brand.access),
        serde_json::json!({ "status": "in_transit" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        "/projects/projects/5/shipment/return/",
        Some(&creator.access),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post_json(
        &app,
        "/projects/projects/5/shipment/status/",
        Some(&creator.access),
        serde_json::json!({ "status": "delivered" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        "/projects/projects/5/shipment/return/",
        Some(&creator.access),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        "/projects/projects/5/shipment/returned/",
        Some(&brand.access),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_with_token(&app, "/projects/projects/5/shipment/", &creator.access).await;
    assert_eq!(response.status(), StatusCode::OK);
    let shipment: Shipment = json_body(response).await;
    assert_eq!(shipment.status, ShipmentStatus::Returned);
}

#[tokio::test]
async fn token_route_rejects_blank_username() {
    let app = test_app();
    let response = post_json(
        &app,
        "/token/",
        None,
        serde_json::json!({ "username": "  ", "role": "client" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
