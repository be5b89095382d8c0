//! Analytics Invariants Module
//!
//! Runnable consistency checks over the mirrored events and the computed
//! snapshots. The worker runs them after each snapshot sweep.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Organization(s) affected
    pub org_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - dashboards may double count
    Critical,
    /// High - derived numbers are wrong
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

impl InvariantCheckSummary {
    fn from_violations(checked_at: OffsetDateTime, violations: Vec<InvariantViolation>) -> Self {
        let checks_run = InvariantChecker::available_checks().len();
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();

        Self {
            checked_at,
            checks_run,
            checks_passed: checks_run.saturating_sub(checks_failed),
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        }
    }
}

/// Row type for duplicate snapshot violation
#[derive(Debug, sqlx::FromRow)]
struct DuplicateSnapshotRow {
    org_id: Uuid,
    snapshot_date: Date,
    row_count: i64,
}

/// Row type for ARR/MRR mismatch violation
#[derive(Debug, sqlx::FromRow)]
struct ArrMismatchRow {
    org_id: Uuid,
    snapshot_date: Date,
    mrr_cents: i64,
    arr_cents: i64,
}

/// Row type for plan distribution violation
#[derive(Debug, sqlx::FromRow)]
struct PlanDistributionRow {
    org_id: Uuid,
    snapshot_date: Date,
    distribution_total: Option<f64>,
}

/// Row type for plan change without a source plan
#[derive(Debug, sqlx::FromRow)]
struct PlanChangeWithoutSourceRow {
    org_id: Uuid,
    event_count: i64,
}

/// Service for running analytics invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> AnalyticsResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_snapshot_per_day().await?);
        violations.extend(self.check_arr_matches_mrr().await?);
        violations.extend(self.check_plan_distribution_sums_to_one().await?);
        violations.extend(self.check_event_plan_consistency().await?);

        Ok(InvariantCheckSummary::from_violations(now, violations))
    }

    /// Invariant 1: At most one snapshot per organization per day
    ///
    /// The unique constraint should make this impossible; it is checked anyway
    /// because history views would show duplicate points.
    async fn check_single_snapshot_per_day(&self) -> AnalyticsResult<Vec<InvariantViolation>> {
        let rows: Vec<DuplicateSnapshotRow> = sqlx::query_as(
            r#"
            SELECT org_id, snapshot_date, COUNT(*) AS row_count
            FROM daily_metrics_snapshots
            GROUP BY org_id, snapshot_date
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_snapshot_per_day".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Organization has {} snapshots for {} (expected 1)",
                    row.row_count, row.snapshot_date
                ),
                context: serde_json::json!({
                    "snapshot_date": row.snapshot_date.to_string(),
                    "row_count": row.row_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: ARR is exactly twelve times MRR
    async fn check_arr_matches_mrr(&self) -> AnalyticsResult<Vec<InvariantViolation>> {
        let rows: Vec<ArrMismatchRow> = sqlx::query_as(
            r#"
            SELECT org_id, snapshot_date, mrr_cents, arr_cents
            FROM daily_metrics_snapshots
            WHERE arr_cents <> mrr_cents * 12
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "arr_matches_mrr".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Snapshot {} has ARR ${:.2} but MRR ${:.2}",
                    row.snapshot_date,
                    row.arr_cents as f64 / 100.0,
                    row.mrr_cents as f64 / 100.0
                ),
                context: serde_json::json!({
                    "snapshot_date": row.snapshot_date.to_string(),
                    "mrr_cents": row.mrr_cents,
                    "arr_cents": row.arr_cents,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: Plan distribution fractions sum to 1 when anything is active
    async fn check_plan_distribution_sums_to_one(
        &self,
    ) -> AnalyticsResult<Vec<InvariantViolation>> {
        let rows: Vec<PlanDistributionRow> = sqlx::query_as(
            r#"
            SELECT s.org_id, s.snapshot_date, d.total AS distribution_total
            FROM daily_metrics_snapshots s
            CROSS JOIN LATERAL (
                SELECT SUM(value::TEXT::DOUBLE PRECISION) AS total
                FROM jsonb_each(s.plan_distribution)
            ) d
            WHERE s.active_subscriptions > 0
              AND ABS(COALESCE(d.total, 0) - 1.0) > 0.01
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "plan_distribution_sums_to_one".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Snapshot {} plan distribution sums to {:.3}",
                    row.snapshot_date,
                    row.distribution_total.unwrap_or(0.0)
                ),
                context: serde_json::json!({
                    "snapshot_date": row.snapshot_date.to_string(),
                    "distribution_total": row.distribution_total,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 4: Upgrades and downgrades name the plan they left
    ///
    /// Without a source plan these events fall into the new-signup path.
    async fn check_event_plan_consistency(&self) -> AnalyticsResult<Vec<InvariantViolation>> {
        let rows: Vec<PlanChangeWithoutSourceRow> = sqlx::query_as(
            r#"
            SELECT org_id, COUNT(*) AS event_count
            FROM subscription_events
            WHERE event_type IN ('UPGRADE', 'DOWNGRADE')
              AND previous_plan_id IS NULL
              AND previous_plan_nickname IS NULL
            GROUP BY org_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "event_plan_consistency".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "{} plan change events have no previous plan",
                    row.event_count
                ),
                context: serde_json::json!({
                    "event_count": row.event_count,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> AnalyticsResult<Vec<InvariantViolation>> {
        match name {
            "single_snapshot_per_day" => self.check_single_snapshot_per_day().await,
            "arr_matches_mrr" => self.check_arr_matches_mrr().await,
            "plan_distribution_sums_to_one" => self.check_plan_distribution_sums_to_one().await,
            "event_plan_consistency" => self.check_event_plan_consistency().await,
            other => Err(AnalyticsError::invalid_argument(format!(
                "unknown invariant check: {}",
                other
            ))),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "single_snapshot_per_day",
            "arr_matches_mrr",
            "plan_distribution_sums_to_one",
            "event_plan_consistency",
        ]
    }
}
