//! Web API module for Rack Inverter.
//!
//! This module exposes the unit-order toggle over HTTP, shaped like the
//! host DCIM application's own views: a successful toggle or a rejected one
//! both redirect back to the rack, carrying a status message.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /racks/{id}/` - Rack detail (rack, devices, reservations)
//! - `POST /racks/{id}/toggle-units-order/` - Flip the rack's unit order
//! - `POST /racks/{id}/convert-to-descending-units/` - Legacy alias of the above
//!
//! The caller is identified by the `X-Remote-User` header set by the
//! authenticating proxy in front of this service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{Authorizer, Resource, Subject};
use crate::config::Config;
use crate::constants::{APP_NAME, REMOTE_USER_HEADER};
use crate::models::{Device, Rack, RackId, Reservation, UnitOrder};
use crate::services::{ToggleCoordinator, ToggleError};
use crate::store::{MemoryStore, RackStore};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the web API.
#[derive(Clone)]
pub struct AppState {
    /// Rack storage
    store: Arc<dyn RackStore>,
    /// Permission checks
    authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(store: Arc<dyn RackStore>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self { store, authorizer }
    }

    /// Opens the inventory file and builds grants from the configuration.
    pub fn from_config(config: &Config, inventory_path: &std::path::Path) -> anyhow::Result<Self> {
        let store =
            MemoryStore::open(inventory_path)?.with_lock_timeout(config.storage.lock_timeout());
        Ok(Self::new(Arc::new(store), Arc::new(config.grant_table())))
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Current health status (e.g., "healthy").
    pub status: String,
    /// Application version.
    pub version: String,
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    /// Operation succeeded
    Success,
    /// Operation was rejected
    Error,
}

/// Status message attached to a redirect back to the rack.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    /// Message severity
    pub level: MessageLevel,
    /// Human-readable message
    pub message: String,
}

/// Rack detail response.
#[derive(Debug, Serialize)]
pub struct RackDetailResponse {
    /// The rack itself
    pub rack: Rack,
    /// Current numbering direction
    pub unit_order: UnitOrder,
    /// All devices of the rack, mounted or not
    pub devices: Vec<Device>,
    /// All reservations of the rack
    pub reservations: Vec<Reservation>,
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Error message.
    pub error: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// A `303 See Other` back to the rack detail view with a status message.
type RedirectWithMessage = (StatusCode, [(header::HeaderName, String); 1], Json<StatusMessage>);

// ============================================================================
// Helpers
// ============================================================================

/// Extracts the authenticated caller from the request headers.
fn remote_user(headers: &HeaderMap) -> ApiResult<Subject> {
    headers
        .get(REMOTE_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Subject::new)
        .ok_or_else(|| {
            (
                StatusCode::FORBIDDEN,
                Json(ApiError::new("Authentication required")),
            )
        })
}

/// URL of the rack detail view.
fn rack_url(rack_id: RackId) -> String {
    format!("/racks/{rack_id}/")
}

fn redirect_to_rack(rack_id: RackId, level: MessageLevel, message: String) -> RedirectWithMessage {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, rack_url(rack_id))],
        Json(StatusMessage { level, message }),
    )
}

fn internal_error(
    error: impl Into<String>,
    details: impl std::fmt::Display,
) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::with_details(error, details.to_string())),
    )
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /health - Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /racks/{id}/ - Rack with its devices and reservations.
async fn get_rack(
    State(state): State<AppState>,
    Path(rack_id): Path<RackId>,
    headers: HeaderMap,
) -> ApiResult<Json<RackDetailResponse>> {
    let subject = remote_user(&headers)?;

    let rack = state
        .store
        .rack(rack_id)
        .map_err(|e| internal_error("Failed to read rack", e))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(format!("Rack not found: {rack_id}"))),
            )
        })?;

    if !state.authorizer.can_view(&subject, Resource::Rack(&rack)) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiError::new("You do not have permission to view this rack.")),
        ));
    }

    let devices = state
        .store
        .devices(rack_id)
        .map_err(|e| internal_error("Failed to read devices", e))?;
    let reservations = state
        .store
        .reservations(rack_id)
        .map_err(|e| internal_error("Failed to read reservations", e))?;

    Ok(Json(RackDetailResponse {
        unit_order: rack.unit_order(),
        rack,
        devices,
        reservations,
    }))
}

/// POST /racks/{id}/toggle-units-order/ - Flip the rack's unit order.
///
/// Also mounted at the legacy `convert-to-descending-units/` path.
async fn toggle_units_order(
    State(state): State<AppState>,
    Path(rack_id): Path<RackId>,
    headers: HeaderMap,
) -> ApiResult<RedirectWithMessage> {
    let subject = remote_user(&headers)?;
    info!(
        "User {} requested unit order switch for rack {}",
        subject.username, rack_id
    );

    // The coordinator blocks on row locks; keep it off the async workers.
    let store = Arc::clone(&state.store);
    let authorizer = Arc::clone(&state.authorizer);
    let result = tokio::task::spawn_blocking(move || {
        ToggleCoordinator::new(store.as_ref(), authorizer.as_ref()).toggle(rack_id, &subject)
    })
    .await
    .map_err(|e| {
        error!("Toggle task for rack {} failed: {}", rack_id, e);
        internal_error("Unit order switch failed", e)
    })?;

    match result {
        Ok(outcome) => Ok(redirect_to_rack(
            rack_id,
            MessageLevel::Success,
            outcome.message(),
        )),
        Err(e @ ToggleError::Validation { .. }) => Ok(redirect_to_rack(
            rack_id,
            MessageLevel::Error,
            e.user_message(),
        )),
        Err(ToggleError::Forbidden { missing }) => Err((
            StatusCode::FORBIDDEN,
            Json(ApiError::with_details(
                "You do not have permission to modify this rack.",
                missing.join("; "),
            )),
        )),
        Err(ToggleError::RackNotFound(id)) => Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(format!("Rack not found: {id}"))),
        )),
        Err(ToggleError::Storage(e)) => {
            error!("Unit order switch for rack {} failed: {}", rack_id, e);
            Err(internal_error("Unit order switch failed", e))
        }
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the API router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Rack detail (redirect target)
        .route("/racks/{id}", get(get_rack))
        .route("/racks/{id}/", get(get_rack))
        // Unit order toggle, current and legacy names
        .route("/racks/{id}/toggle-units-order", post(toggle_units_order))
        .route("/racks/{id}/toggle-units-order/", post(toggle_units_order))
        .route(
            "/racks/{id}/convert-to-descending-units",
            post(toggle_units_order),
        )
        .route(
            "/racks/{id}/convert-to-descending-units/",
            post(toggle_units_order),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the web server.
///
/// # Arguments
///
/// * `config` - Application configuration
/// * `inventory_path` - Inventory JSON file backing the store
/// * `addr` - Socket address to bind to
///
/// # Errors
///
/// Returns an error if the inventory cannot be loaded or the server fails to start.
pub async fn run_server(
    config: Config,
    inventory_path: PathBuf,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let state = AppState::from_config(&config, &inventory_path)?;
    let app = create_router(state);

    info!(
        "Starting {} web server on {} (inventory: {})",
        APP_NAME,
        addr,
        inventory_path.display()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_remote_user_present() {
        let mut headers = HeaderMap::new();
        headers.insert(REMOTE_USER_HEADER, HeaderValue::from_static(" ops "));
        assert_eq!(remote_user(&headers).unwrap().username, "ops");
    }

    #[test]
    fn test_remote_user_missing_or_blank() {
        let headers = HeaderMap::new();
        assert_eq!(remote_user(&headers).unwrap_err().0, StatusCode::FORBIDDEN);

        let mut headers = HeaderMap::new();
        headers.insert(REMOTE_USER_HEADER, HeaderValue::from_static("   "));
        assert!(remote_user(&headers).is_err());
    }

    #[test]
    fn test_rack_url() {
        assert_eq!(rack_url(42), "/racks/42/");
    }
}
