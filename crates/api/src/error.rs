//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use revlens_analytics::AnalyticsError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("No organization found")]
    NoOrganization,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::NoOrganization => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::NoOrganization => "NO_ORGANIZATION",
            ApiError::Validation(_) => "INVALID_ARGUMENT",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::NoOrganization => {
                "No organization found for the authenticated user".to_string()
            }
            ApiError::Validation(msg) => msg.clone(),
            // Query details stay in the logs
            ApiError::Upstream(detail) | ApiError::Internal(detail) => {
                tracing::error!(error = %detail, code = self.code(), "Request failed");
                "Something went wrong. Please try again later.".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::InvalidArgument(msg) => ApiError::Validation(msg),
            AnalyticsError::Unauthorized => ApiError::Unauthorized,
            AnalyticsError::Upstream(msg) => ApiError::Upstream(msg),
            AnalyticsError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_analytics_error_mapping() {
        assert!(matches!(
            ApiError::from(AnalyticsError::invalid_argument("days")),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(AnalyticsError::Unauthorized),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from(AnalyticsError::Upstream("down".into())),
            ApiError::Upstream(_)
        ));
    }

    #[tokio::test]
    async fn test_upstream_hides_details() {
        let response =
            ApiError::Upstream("connection refused to 10.0.0.5:5432".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "UPSTREAM_ERROR");
        assert!(!body["error"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_validation_keeps_message() {
        let response = ApiError::Validation("days must be a positive integer".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "days must be a positive integer");
        assert_eq!(body["code"], "INVALID_ARGUMENT");
    }

    #[test]
    fn test_auth_errors_are_unauthorized() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NoOrganization.status(), StatusCode::UNAUTHORIZED);
    }
}
