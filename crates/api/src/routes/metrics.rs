//! Metrics routes

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use revlens_analytics::thresholds::DEFAULT_HISTORY_DAYS;
use serde::Deserialize;
use serde_json::{json, Value};

use super::positive_param;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub view: Option<String>,
    pub days: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricsView {
    Snapshot,
    History,
}

impl MetricsView {
    fn parse(raw: Option<&str>) -> ApiResult<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("snapshot") => Ok(MetricsView::Snapshot),
            Some("history") => Ok(MetricsView::History),
            Some(other) => Err(ApiError::Validation(format!(
                "view must be 'snapshot' or 'history', got '{}'",
                other
            ))),
        }
    }
}

/// Current snapshot or trailing history
pub async fn get_metrics(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<Value>> {
    let org_id = auth_user.org_id;

    match MetricsView::parse(query.view.as_deref())? {
        MetricsView::Snapshot => {
            let snapshot = state
                .analytics
                .metrics
                .current_snapshot(org_id)
                .await
                .inspect_err(|e| tracing::error!(org_id = %org_id, error = %e, "Failed to load snapshot"))?;
            Ok(Json(json!({ "data": snapshot })))
        }
        MetricsView::History => {
            let days = positive_param("days", query.days.as_deref(), DEFAULT_HISTORY_DAYS)?;
            let history = state
                .analytics
                .metrics
                .history(org_id, days)
                .await
                .inspect_err(|e| tracing::error!(org_id = %org_id, error = %e, "Failed to load history"))?;
            Ok(Json(json!({ "data": history })))
        }
    }
}

/// Latest snapshot with month-over-month MRR change
pub async fn get_overview(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let org_id = auth_user.org_id;
    let overview = state
        .analytics
        .metrics
        .overview(org_id)
        .await
        .inspect_err(|e| tracing::error!(org_id = %org_id, error = %e, "Failed to load overview"))?;

    Ok(Json(json!({ "data": overview })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_parse() {
        assert_eq!(MetricsView::parse(None).unwrap(), MetricsView::Snapshot);
        assert_eq!(MetricsView::parse(Some("history")).unwrap(), MetricsView::History);
        assert!(MetricsView::parse(Some("HISTORY")).is_err());
    }
}
