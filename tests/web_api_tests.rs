//! Integration tests for the Rack Inverter Web API.
//!
//! These tests require the `web` feature to be enabled:
//! ```bash
//! cargo test --features web web_api
//! ```

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use rack_inverter::constants::REMOTE_USER_HEADER;
use rack_inverter::models::Inventory;
use rack_inverter::store::{MemoryStore, RackStore};
use rack_inverter::web::{create_router, AppState};

mod fixtures;
use fixtures::{test_grants, test_inventory, ADMIN, OPERATOR, VIEWER};

/// Creates a router over `inventory`, returning the store for inspection.
fn create_test_app(inventory: Inventory) -> (axum::Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(inventory));
    let state = AppState::new(store.clone(), Arc::new(test_grants()));
    (create_router(state), store)
}

/// Sends a request and returns status, `Location` header, and JSON body.
async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
) -> (StatusCode, Option<String>, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(REMOTE_USER_HEADER, user);
    }

    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, location, json)
}

// ============================================================================
// Health and rack detail
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let (app, _) = create_test_app(test_inventory());

    let (status, _, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_rack_detail() {
    let (app, _) = create_test_app(test_inventory());

    let (status, _, json) = send(&app, "GET", "/racks/1/", Some(VIEWER)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rack"]["name"], "rack-a");
    assert_eq!(json["unit_order"], "ascending");
    assert_eq!(json["devices"].as_array().unwrap().len(), 4);
    assert_eq!(json["reservations"].as_array().unwrap().len(), 1);

    let (status, _, _) = send(&app, "GET", "/racks/1", Some(VIEWER)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rack_detail_errors() {
    let (app, _) = create_test_app(test_inventory());

    let (status, _, _) = send(&app, "GET", "/racks/1/", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(&app, "GET", "/racks/1/", Some("nobody")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, json) = send(&app, "GET", "/racks/99/", Some(ADMIN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("99"));
}

// ============================================================================
// Toggle
// ============================================================================

#[tokio::test]
async fn test_toggle_redirects_with_success_message() {
    let (app, store) = create_test_app(test_inventory());

    let (status, location, json) =
        send(&app, "POST", "/racks/1/toggle-units-order/", Some(OPERATOR)).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/racks/1/"));
    assert_eq!(json["level"], "success");
    assert_eq!(
        json["message"],
        "Switched rack-a to descending units while preserving layout for 3 devices and 1 reservations."
    );
    assert!(store.rack(1).unwrap().unwrap().desc_units);
}

#[tokio::test]
async fn test_legacy_route_alias() {
    let (app, store) = create_test_app(test_inventory());

    let (status, location, json) = send(
        &app,
        "POST",
        "/racks/1/convert-to-descending-units/",
        Some(OPERATOR),
    )
    .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/racks/1/"));
    assert_eq!(json["level"], "success");
    assert!(store.rack(1).unwrap().unwrap().desc_units);

    // Calling it again flips back; the legacy name is not one-way.
    let (status, _, json) = send(
        &app,
        "POST",
        "/racks/1/convert-to-descending-units",
        Some(OPERATOR),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("to ascending units"));
    assert!(!store.rack(1).unwrap().unwrap().desc_units);
}

#[tokio::test]
async fn test_route_without_trailing_slash() {
    let (app, _) = create_test_app(test_inventory());

    let (status, _, _) = send(&app, "POST", "/racks/1/toggle-units-order", Some(OPERATOR)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_get_not_allowed_on_toggle_routes() {
    let (app, store) = create_test_app(test_inventory());
    let before = store.inventory();

    for uri in [
        "/racks/1/toggle-units-order/",
        "/racks/1/convert-to-descending-units/",
    ] {
        let (status, _, _) = send(&app, "GET", uri, Some(OPERATOR)).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "GET {uri}");
    }

    assert_eq!(store.inventory(), before);
}

#[tokio::test]
async fn test_toggle_without_user_is_forbidden() {
    let (app, store) = create_test_app(test_inventory());
    let before = store.inventory();

    let (status, location, _) = send(&app, "POST", "/racks/1/toggle-units-order/", None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(location.is_none());
    assert_eq!(store.inventory(), before);
}

#[tokio::test]
async fn test_toggle_without_permission_is_forbidden() {
    let (app, store) = create_test_app(test_inventory());
    let before = store.inventory();

    let (status, _, json) =
        send(&app, "POST", "/racks/1/toggle-units-order/", Some(VIEWER)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json["details"]
        .as_str()
        .unwrap()
        .contains("change rack on this rack"));
    assert_eq!(store.inventory(), before);
    assert!(store.change_log().is_empty());
}

#[tokio::test]
async fn test_toggle_unknown_rack() {
    let (app, _) = create_test_app(test_inventory());

    let (status, _, _) = send(&app, "POST", "/racks/99/toggle-units-order/", Some(ADMIN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_toggle_validation_failure_redirects_with_error() {
    let mut inventory = test_inventory();
    inventory.devices[1].position = Some(43);
    let (app, store) = create_test_app(inventory);
    let before = store.inventory();

    let (status, location, json) =
        send(&app, "POST", "/racks/1/toggle-units-order/", Some(OPERATOR)).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/racks/1/"));
    assert_eq!(json["level"], "error");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Cannot switch rack unit order"));
    assert_eq!(store.inventory(), before);
}

#[tokio::test]
async fn test_toggle_storage_failure() {
    let (app, store) = create_test_app(test_inventory());
    store.update_device_position_unchecked(3, Some(1)).unwrap();
    let before = store.inventory();

    let (status, location, json) =
        send(&app, "POST", "/racks/1/toggle-units-order/", Some(OPERATOR)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(location.is_none());
    assert_eq!(json["error"], "Unit order switch failed");
    assert_eq!(store.inventory(), before);
}
