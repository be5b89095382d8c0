//! Revlens Background Worker
//!
//! Handles scheduled jobs including:
//! - Daily metrics snapshots for every organization (default 00:15 UTC)
//! - Snapshot invariant checks after each snapshot sweep
//! - Heartbeat logging (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use revlens_analytics::{
    InvariantCheckSummary, InvariantChecker, PgEventStore, SnapshotResult, SnapshotService,
};
use revlens_shared::create_pool;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// 00:15 UTC daily, after the billing provider's midnight sync
const DEFAULT_SNAPSHOT_CRON: &str = "0 15 0 * * *";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

struct WorkerConfig {
    database_url: String,
    snapshot_cron: String,
    max_connections: u32,
}

impl WorkerConfig {
    fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid DATABASE_MAX_CONNECTIONS: {}", raw))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            snapshot_cron: std::env::var("SNAPSHOT_CRON")
                .unwrap_or_else(|_| DEFAULT_SNAPSHOT_CRON.to_string()),
            max_connections,
        })
    }
}

/// The day a sweep running at `now` should snapshot (the last complete UTC day)
fn snapshot_target_date(now: OffsetDateTime) -> Date {
    now.date().previous_day().unwrap_or(now.date())
}

/// (computed, errors) counts for a sweep
fn tally_snapshot_results(results: &[SnapshotResult]) -> (usize, usize) {
    let computed = results
        .iter()
        .filter(|r| matches!(r, SnapshotResult::Computed { .. }))
        .count();
    (computed, results.len() - computed)
}

/// Log results of a snapshot sweep
fn log_snapshot_results(date: Date, results: &[SnapshotResult]) {
    let (computed, errors) = tally_snapshot_results(results);
    let total_mrr_cents: i64 = results
        .iter()
        .filter_map(|r| match r {
            SnapshotResult::Computed { mrr_cents, .. } => Some(*mrr_cents),
            SnapshotResult::Error { .. } => None,
        })
        .sum();

    info!(
        date = %date,
        computed = computed,
        errors = errors,
        total_mrr_cents = total_mrr_cents,
        "Daily snapshot sweep complete"
    );

    // Log individual errors
    for result in results {
        if let SnapshotResult::Error { org_id, error } = result {
            error!(org_id = %org_id, date = %date, error = %error, "Failed to compute snapshot");
        }
    }
}

fn log_invariant_summary(summary: &InvariantCheckSummary) {
    if summary.healthy {
        info!(
            checks_run = summary.checks_run,
            "Analytics invariant checks passed"
        );
        return;
    }

    warn!(
        checks_run = summary.checks_run,
        checks_failed = summary.checks_failed,
        violations = summary.violations.len(),
        "Analytics invariant violations detected"
    );
    for violation in &summary.violations {
        warn!(
            invariant = %violation.invariant,
            severity = %violation.severity,
            org_ids = ?violation.org_ids,
            description = %violation.description,
            "Invariant violation"
        );
    }
}

/// Snapshot yesterday for every organization, then check invariants
async fn run_snapshot_sweep(snapshots: &SnapshotService, checker: &InvariantChecker) {
    let date = snapshot_target_date(OffsetDateTime::now_utc());
    info!(date = %date, "Running daily snapshot sweep");

    match snapshots.compute_all(date).await {
        Ok(results) => log_snapshot_results(date, &results),
        Err(e) => {
            error!(date = %date, error = %e, "Failed to list organizations for snapshot sweep");
            return;
        }
    }

    match checker.run_all_checks().await {
        Ok(summary) => log_invariant_summary(&summary),
        Err(e) => error!(error = %e, "Failed to run analytics invariant checks"),
    }
}

fn build_services(pool: PgPool) -> (Arc<SnapshotService>, Arc<InvariantChecker>) {
    let store = Arc::new(PgEventStore::new(pool.clone()));
    (
        Arc::new(SnapshotService::new(store)),
        Arc::new(InvariantChecker::new(pool)),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Revlens Worker v{}", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;
    let pool = create_pool(&config.database_url, config.max_connections).await?;
    let (snapshots, checker) = build_services(pool);

    // Catch up on startup so a missed run does not leave a gap until tomorrow
    {
        let snapshots = snapshots.clone();
        let checker = checker.clone();
        tokio::spawn(async move {
            run_snapshot_sweep(&snapshots, &checker).await;
        });
    }

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Daily snapshot sweep plus invariant checks
    let job_snapshots = snapshots.clone();
    let job_checker = checker.clone();
    scheduler
        .add(Job::new_async(config.snapshot_cron.as_str(), move |_uuid, _l| {
            let snapshots = job_snapshots.clone();
            let checker = job_checker.clone();
            Box::pin(async move {
                run_snapshot_sweep(&snapshots, &checker).await;
            })
        })?)
        .await?;
    info!(cron = %config.snapshot_cron, "Scheduled: Daily metrics snapshot sweep");

    // Job 2: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Revlens Worker started successfully with {} scheduled jobs", 2);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
