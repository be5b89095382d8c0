// Analytics crate clippy configuration
#![allow(clippy::too_many_arguments)] // Test event builders mirror the event row shape
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

//! Revlens Analytics Module
//!
//! Turns mirrored subscription events and daily snapshots into dashboard data.
//!
//! ## Features
//!
//! - **Metrics**: Current snapshot, trailing history, month-over-month overview
//! - **Plan Migrations**: `from -> to` paths, conversion rates, days to migrate
//! - **Funnel**: Per-plan upgrade, downgrade and churn rates
//! - **Friction**: Low-conversion and slow-migration paths with severities
//! - **Insights**: Narrative sentences for the dashboard
//! - **Snapshots**: Daily snapshot builder run by the worker
//! - **Invariants**: Consistency checks over events and snapshots

pub mod error;
pub mod friction;
pub mod insights;
pub mod invariants;
pub mod metrics;
pub mod pg_store;
pub mod plan_migrations;
pub mod snapshot;
pub mod store;
pub mod thresholds;


#[cfg(test)]
pub(crate) mod test_support;

// Error
pub use error::{AnalyticsError, AnalyticsResult};

// Friction
pub use friction::{detect_friction, FrictionKind, FrictionPoint, FrictionReport, FrictionSeverity};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Metrics
pub use metrics::{MetricsAggregator, MetricsOverview};

// Plan Migrations
pub use plan_migrations::{
    analyze_events, MigrationPath, MigrationQuery, PlanFunnelStat, PlanMigrationAnalysis,
    PlanMigrationAnalyzer,
};

// Snapshots
pub use snapshot::{build_snapshot, SnapshotResult, SnapshotService};

// Stores
pub use pg_store::PgEventStore;
pub use store::{
    DateRange, EventQuery, EventStore, InMemoryEventStore, PaymentStats, SnapshotRepository,
};

// Thresholds
pub use thresholds::AnalysisThresholds;

use std::sync::Arc;

use revlens_shared::OrgId;
use serde::Serialize;

/// Migration analysis with its derived insights and friction points
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMigrationReport {
    #[serde(flatten)]
    pub analysis: PlanMigrationAnalysis,
    pub insights: Vec<String>,
    pub friction_points: Vec<FrictionPoint>,
}

/// Main analytics service that combines the read-side passes
#[derive(Clone)]
pub struct AnalyticsService {
    pub metrics: MetricsAggregator,
    pub migrations: PlanMigrationAnalyzer,
    pub thresholds: AnalysisThresholds,
}

impl AnalyticsService {
    /// Create an analytics service with thresholds from the environment
    pub fn from_env(store: Arc<dyn EventStore>) -> Self {
        Self::new(store, AnalysisThresholds::from_env())
    }

    pub fn new(store: Arc<dyn EventStore>, thresholds: AnalysisThresholds) -> Self {
        Self {
            metrics: MetricsAggregator::new(store.clone()),
            migrations: PlanMigrationAnalyzer::new(store, thresholds),
            thresholds,
        }
    }

    /// Analyze plan migrations and attach insights and friction points
    pub async fn migration_report(
        &self,
        org_id: OrgId,
        query: MigrationQuery,
    ) -> AnalyticsResult<PlanMigrationReport> {
        let analysis = self.migrations.analyze(org_id, query).await?;
        Ok(self.report_for(analysis))
    }

    pub fn report_for(&self, analysis: PlanMigrationAnalysis) -> PlanMigrationReport {
        let FrictionReport {
            insights,
            friction_points,
        } = detect_friction(&analysis.paths, &analysis.funnel, &self.thresholds);

        PlanMigrationReport {
            analysis,
            insights,
            friction_points,
        }
    }
}
