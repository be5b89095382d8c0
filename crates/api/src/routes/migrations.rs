//! Plan migration routes

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use revlens_analytics::{thresholds::DEFAULT_WINDOW_MONTHS, MigrationQuery, PlanMigrationReport};
use serde::Deserialize;

use super::{bool_param, positive_param};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MigrationsQuery {
    pub months: Option<String>,
    #[serde(rename = "includeNew", alias = "include_new")]
    pub include_new: Option<String>,
}

impl MigrationsQuery {
    fn parse(&self) -> ApiResult<MigrationQuery> {
        Ok(MigrationQuery {
            window_months: positive_param(
                "months",
                self.months.as_deref(),
                i64::from(DEFAULT_WINDOW_MONTHS),
            )?,
            include_new_signups: bool_param("includeNew", self.include_new.as_deref(), true)?,
        })
    }
}

/// Migration paths, funnel, insights and friction points
pub async fn get_migrations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<MigrationsQuery>,
) -> ApiResult<Json<PlanMigrationReport>> {
    let org_id = auth_user.org_id;
    let query = query.parse()?;

    let report = state
        .analytics
        .migration_report(org_id, query)
        .await
        .inspect_err(|e| {
            tracing::error!(org_id = %org_id, error = %e, "Failed to analyze plan migrations")
        })?;

    tracing::debug!(
        org_id = %org_id,
        paths = report.analysis.paths.len(),
        insights = report.insights.len(),
        friction_points = report.friction_points.len(),
        "Plan migration report served"
    );

    Ok(Json(report))
}
