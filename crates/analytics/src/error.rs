//! Analytics error types

use thiserror::Error;

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Errors surfaced by the aggregation and analysis passes
///
/// Missing data is not an error: readers return `Ok(None)` or an empty
/// sequence and callers render an empty state.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No authenticated organization")]
    Unauthorized,

    #[error("Data store unavailable: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyticsError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        AnalyticsError::InvalidArgument(msg.into())
    }
}

impl From<sqlx::Error> for AnalyticsError {
    fn from(e: sqlx::Error) -> Self {
        AnalyticsError::Upstream(e.to_string())
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(e: serde_json::Error) -> Self {
        AnalyticsError::Internal(e.to_string())
    }
}
