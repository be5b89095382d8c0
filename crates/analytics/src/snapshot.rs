//! Daily metrics snapshot computation
//!
//! Replays the event history up to the end of a calendar day to rebuild each
//! subscription's state, then derives the day's aggregates. The worker runs
//! this once per organization per day and upserts the result.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use revlens_shared::{DailyMetricsSnapshot, OrgId, SubscriptionEvent, SubscriptionEventType};
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime, Time};

use crate::error::AnalyticsResult;
use crate::plan_migrations::{div_round_half_away, UNKNOWN_PLAN};
use crate::store::{EventQuery, PaymentStats, SnapshotRepository};

#[derive(Debug, Clone)]
struct ActiveSubscription<'a> {
    customer: &'a str,
    plan: &'a str,
    mrr_cents: i64,
}

/// Per-day movement of existing MRR
#[derive(Debug, Default)]
struct DayMovement {
    new: i32,
    canceled: i32,
    upgraded: i32,
    downgraded: i32,
    churned_existing: i32,
    expansion_cents: i64,
    contraction_cents: i64,
    churned_cents: i64,
}

fn day_bounds(date: Date) -> (OffsetDateTime, OffsetDateTime) {
    let start = date.with_time(Time::MIDNIGHT).assume_utc();
    (start, start + Duration::days(1))
}

fn apply<'a>(
    state: &mut HashMap<&'a str, ActiveSubscription<'a>>,
    event: &'a SubscriptionEvent,
) {
    let sub = event.stripe_subscription_id.as_str();
    match event.event_type {
        SubscriptionEventType::Canceled => {
            state.remove(sub);
        }
        _ => {
            state.insert(
                sub,
                ActiveSubscription {
                    customer: event.stripe_customer_id.as_str(),
                    plan: event.new_plan_name().unwrap_or(UNKNOWN_PLAN),
                    mrr_cents: event.new_mrr_cents.unwrap_or(0),
                },
            );
        }
    }
}

/// Build the snapshot for `date` from an organization's event history
///
/// Events after the end of `date` are ignored, so the full history can be passed.
pub fn build_snapshot(
    org_id: OrgId,
    date: Date,
    history: &[SubscriptionEvent],
    payments: PaymentStats,
) -> DailyMetricsSnapshot {
    let (day_start, day_end) = day_bounds(date);

    let mut ordered: Vec<&SubscriptionEvent> =
        history.iter().filter(|e| e.occurred_at < day_end).collect();
    ordered.sort_by_key(|e| e.occurred_at);

    let split = ordered.partition_point(|e| e.occurred_at < day_start);
    let (before, during) = ordered.split_at(split);

    let mut state: HashMap<&str, ActiveSubscription> = HashMap::new();
    for event in before {
        apply(&mut state, *event);
    }

    let start_mrr: i64 = state.values().map(|s| s.mrr_cents).sum();
    let start_active = state.len();
    let existing: HashSet<&str> = state.keys().copied().collect();

    let mut movement = DayMovement::default();
    for event in during {
        let sub = event.stripe_subscription_id.as_str();
        let is_existing = existing.contains(sub);

        match event.event_type {
            SubscriptionEventType::New => movement.new += 1,
            SubscriptionEventType::Upgrade => movement.upgraded += 1,
            SubscriptionEventType::Downgrade => movement.downgraded += 1,
            SubscriptionEventType::Canceled => movement.canceled += 1,
        }

        if is_existing {
            let current = state.get(sub).map(|s| s.mrr_cents);
            match event.event_type {
                SubscriptionEventType::Canceled => {
                    if let Some(mrr) = current {
                        movement.churned_existing += 1;
                        movement.churned_cents += mrr;
                    }
                }
                SubscriptionEventType::Upgrade | SubscriptionEventType::Downgrade => {
                    let before = current
                        .or(event.previous_mrr_cents)
                        .unwrap_or(0);
                    let delta = event.new_mrr_cents.unwrap_or(0) - before;
                    if delta > 0 {
                        movement.expansion_cents += delta;
                    } else {
                        movement.contraction_cents += -delta;
                    }
                }
                SubscriptionEventType::New => {}
            }
        }

        apply(&mut state, *event);
    }

    let mrr_cents: i64 = state.values().map(|s| s.mrr_cents).sum();
    let active = state.len();
    let customers: HashSet<&str> = state.values().map(|s| s.customer).collect();

    let arpu_cents = if customers.is_empty() {
        0
    } else {
        div_round_half_away(mrr_cents, i64::try_from(customers.len()).unwrap_or(i64::MAX))
    };

    let mut plan_counts: BTreeMap<String, usize> = BTreeMap::new();
    for sub in state.values() {
        *plan_counts.entry(sub.plan.to_string()).or_default() += 1;
    }
    let plan_distribution = plan_counts
        .into_iter()
        .map(|(plan, n)| (plan, n as f64 / active as f64))
        .collect();

    let customer_churn_rate = ratio_percent(movement.churned_existing as f64, start_active as f64);
    let revenue_churn_rate = ratio_percent(
        (movement.churned_cents + movement.contraction_cents) as f64,
        start_mrr as f64,
    );
    let net_revenue_retention = if start_mrr > 0 {
        (start_mrr + movement.expansion_cents - movement.contraction_cents - movement.churned_cents)
            as f64
            / start_mrr as f64
            * 100.0
    } else {
        100.0
    };

    DailyMetricsSnapshot {
        org_id: org_id.0,
        snapshot_date: date,
        mrr_cents,
        arr_cents: mrr_cents * 12,
        arpu_cents,
        active_subscriptions: i32::try_from(active).unwrap_or(i32::MAX),
        new_subscriptions: movement.new,
        canceled_subscriptions: movement.canceled,
        upgraded_subscriptions: movement.upgraded,
        downgraded_subscriptions: movement.downgraded,
        customer_churn_rate,
        revenue_churn_rate,
        net_revenue_retention,
        successful_payments: payments.succeeded,
        failed_payments: payments.failed,
        average_discount_percent: payments.average_discount_percent,
        plan_distribution,
    }
}

fn ratio_percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    part / whole * 100.0
}

/// Outcome of computing one organization's snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotResult {
    Computed { org_id: OrgId, mrr_cents: i64 },
    Error { org_id: OrgId, error: String },
}

/// Computes and stores daily snapshots
#[derive(Clone)]
pub struct SnapshotService {
    repo: Arc<dyn SnapshotRepository>,
}

impl SnapshotService {
    pub fn new(repo: Arc<dyn SnapshotRepository>) -> Self {
        Self { repo }
    }

    /// Compute and upsert the snapshot for one organization and day
    pub async fn compute(&self, org_id: OrgId, date: Date) -> AnalyticsResult<DailyMetricsSnapshot> {
        let (_, day_end) = day_bounds(date);
        let query = EventQuery::new().before(day_end - Duration::microseconds(1));

        let (history, payments) = tokio::try_join!(
            self.repo.list_events(org_id, &query),
            self.repo.payment_stats(org_id, date),
        )?;

        let snapshot = build_snapshot(org_id, date, &history, payments);
        self.repo.upsert_snapshot(&snapshot).await?;

        tracing::debug!(
            org_id = %org_id,
            date = %date,
            mrr_cents = snapshot.mrr_cents,
            active = snapshot.active_subscriptions,
            "Daily snapshot computed"
        );

        Ok(snapshot)
    }

    /// Compute `date` for every organization; one failure does not stop the rest
    pub async fn compute_all(&self, date: Date) -> AnalyticsResult<Vec<SnapshotResult>> {
        let org_ids = self.repo.list_organization_ids().await?;
        let mut results = Vec::with_capacity(org_ids.len());

        for org_id in org_ids {
            match self.compute(org_id, date).await {
                Ok(snapshot) => results.push(SnapshotResult::Computed {
                    org_id,
                    mrr_cents: snapshot.mrr_cents,
                }),
                Err(e) => {
                    tracing::error!(org_id = %org_id, date = %date, error = %e, "Snapshot computation failed");
                    results.push(SnapshotResult::Error {
                        org_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(results)
    }
}
