// API crate clippy configuration
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

//! Revlens API Library
//!
//! This crate contains the API server components for Revlens: bearer
//! authentication, organization scoping, and the metrics and plan
//! migration endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::{compression_layer, create_router};
pub use state::AppState;
