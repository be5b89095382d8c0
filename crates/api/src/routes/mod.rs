//! API routes

pub mod metrics;
pub mod migrations;

use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::compression::CompressionLayer;

use crate::auth::require_auth;
use crate::error::ApiError;
use crate::state::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/metrics", get(metrics::get_metrics))
        .route("/metrics/overview", get(metrics::get_overview))
        .route("/migrations", get(migrations::get_migrations))
        .layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", protected_routes)
        .with_state(state)
}

/// Gzip response bodies for clients that accept it
///
/// Migration reports and long histories are the large payloads here.
pub fn compression_layer() -> CompressionLayer {
    CompressionLayer::new().gzip(true)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Parse an optional positive integer query parameter
pub(crate) fn positive_param(name: &str, raw: Option<&str>, default: i64) -> Result<i64, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };

    match raw.parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ApiError::Validation(format!(
            "{} must be a positive integer, got '{}'",
            name, raw
        ))),
    }
}

/// Parse an optional boolean query parameter
pub(crate) fn bool_param(name: &str, raw: Option<&str>, default: bool) -> Result<bool, ApiError> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ApiError::Validation(format!(
            "{} must be true or false, got '{}'",
            name, other
        ))),
    }
}
