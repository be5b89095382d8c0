//! Plan migration path analysis
//!
//! Groups subscription changes into `from -> to` paths and derives per-plan
//! funnel statistics over a trailing window of months.
//!
//! ## Pass structure
//!
//! 1. One ordered read of the organization's event history up to `now`.
//! 2. History is indexed by customer so lead-time and churn lookups are
//!    in-memory scans instead of one query per event.
//! 3. Events inside the window are folded into path and funnel accumulators
//!    that live only for this call.

use std::collections::HashMap;
use std::sync::Arc;

use revlens_shared::{OrgId, SubscriptionEvent, SubscriptionEventType};
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::store::{EventQuery, EventStore};
use crate::thresholds::{AnalysisThresholds, DEFAULT_WINDOW_MONTHS};

/// Target label when an event carries no new plan
pub const UNKNOWN_PLAN: &str = "Unknown";

/// Source label for new signups
pub const NEW_SIGNUP_LABEL: &str = "NEW";

const SECONDS_PER_DAY: f64 = 86_400.0;
const SECONDS_PER_DAY_I64: i64 = 86_400;

/// Events that move a subscription onto a plan
const TRANSITION_TYPES: [SubscriptionEventType; 3] = [
    SubscriptionEventType::New,
    SubscriptionEventType::Upgrade,
    SubscriptionEventType::Downgrade,
];

/// Parameters for a migration analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationQuery {
    pub window_months: i64,
    /// Include `NEW -> plan` paths in the returned path list
    pub include_new_signups: bool,
}

impl Default for MigrationQuery {
    fn default() -> Self {
        Self {
            window_months: i64::from(DEFAULT_WINDOW_MONTHS),
            include_new_signups: true,
        }
    }
}

/// A distinct `from -> to` transition and its aggregates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPath {
    /// `None` for new signups
    pub from_plan: Option<String>,
    pub to_plan: String,
    pub count: u32,
    pub total_mrr_delta: i64,
    pub average_mrr_delta: i64,
    /// Percent of the source plan's transitions that took this path
    pub conversion_rate: Option<f64>,
    pub average_days_to_migrate: Option<f64>,
}

impl MigrationPath {
    pub fn is_new_signup(&self) -> bool {
        self.from_plan.is_none()
    }

    /// Source label for display (`NEW` for signups)
    pub fn from_label(&self) -> &str {
        self.from_plan.as_deref().unwrap_or(NEW_SIGNUP_LABEL)
    }
}

/// Outcomes for transitions leaving one plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFunnelStat {
    pub plan: String,
    pub total_customers: u32,
    pub upgrade_count: u32,
    pub downgrade_count: u32,
    pub churn_count: u32,
    pub upgrade_rate: f64,
    pub downgrade_rate: f64,
    pub churn_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMigrationAnalysis {
    pub window_months: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub window_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub window_end: OffsetDateTime,
    /// Qualifying events in the window, new signups included
    pub total_events: u32,
    pub paths: Vec<MigrationPath>,
    pub funnel: Vec<PlanFunnelStat>,
}

#[derive(Clone)]
pub struct PlanMigrationAnalyzer {
    store: Arc<dyn EventStore>,
    thresholds: AnalysisThresholds,
}

impl PlanMigrationAnalyzer {
    pub fn new(store: Arc<dyn EventStore>, thresholds: AnalysisThresholds) -> Self {
        Self { store, thresholds }
    }

    pub async fn analyze(
        &self,
        org_id: OrgId,
        query: MigrationQuery,
    ) -> AnalyticsResult<PlanMigrationAnalysis> {
        self.analyze_as_of(org_id, query, OffsetDateTime::now_utc())
            .await
    }

    pub async fn analyze_as_of(
        &self,
        org_id: OrgId,
        query: MigrationQuery,
        now: OffsetDateTime,
    ) -> AnalyticsResult<PlanMigrationAnalysis> {
        if query.window_months <= 0 {
            return Err(AnalyticsError::invalid_argument(format!(
                "months must be a positive integer, got {}",
                query.window_months
            )));
        }
        let window_start = months_before(now, query.window_months)?;

        let history = self
            .store
            .list_events(org_id, &EventQuery::new().before(now))
            .await?;

        let analysis = analyze_events(
            &history,
            window_start,
            now,
            query,
            &self.thresholds,
        );

        tracing::debug!(
            org_id = %org_id,
            history_events = history.len(),
            window_events = analysis.total_events,
            paths = analysis.paths.len(),
            funnel_plans = analysis.funnel.len(),
            "Plan migration analysis complete"
        );

        Ok(analysis)
    }
}

// =============================================================================
// Aggregation pass
// =============================================================================

#[derive(Debug)]
struct PathAccumulator {
    from_plan: Option<String>,
    to_plan: String,
    count: u32,
    total_mrr_delta: i64,
    lead_time_days: Vec<f64>,
}

#[derive(Debug)]
struct FunnelAccumulator {
    plan: String,
    total: u32,
    upgrades: u32,
    downgrades: u32,
    churns: u32,
}

/// Per-customer view of the event history, ascending by time
struct CustomerIndex<'a> {
    by_customer: HashMap<&'a str, Vec<&'a SubscriptionEvent>>,
}

impl<'a> CustomerIndex<'a> {
    fn build(history: &'a [SubscriptionEvent]) -> Self {
        let mut by_customer: HashMap<&str, Vec<&SubscriptionEvent>> = HashMap::new();
        for event in history {
            by_customer
                .entry(event.stripe_customer_id.as_str())
                .or_default()
                .push(event);
        }
        for events in by_customer.values_mut() {
            events.sort_by_key(|e| e.occurred_at);
        }
        Self { by_customer }
    }

    fn events_for(&self, customer: &str) -> &[&'a SubscriptionEvent] {
        self.by_customer
            .get(customer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Days since the customer most recently moved onto the plan this event leaves
    fn lead_time_days(&self, event: &SubscriptionEvent) -> Option<f64> {
        let events = self.events_for(&event.stripe_customer_id);
        let prior_end = events.partition_point(|e| e.occurred_at < event.occurred_at);

        events[..prior_end]
            .iter()
            .rev()
            .find(|prior| moved_onto_plan_left_by(prior, event))
            .map(|prior| (event.occurred_at - prior.occurred_at).as_seconds_f64() / SECONDS_PER_DAY)
    }

    /// Whether the customer canceled within `days` after this event
    ///
    /// A window reaching past the last representable instant has no deadline.
    fn churned_within(&self, event: &SubscriptionEvent, days: i64) -> bool {
        let deadline = days
            .checked_mul(SECONDS_PER_DAY_I64)
            .and_then(|secs| event.occurred_at.checked_add(Duration::seconds(secs)));
        self.events_for(&event.stripe_customer_id).iter().any(|e| {
            e.event_type == SubscriptionEventType::Canceled
                && e.occurred_at > event.occurred_at
                && deadline.map_or(true, |d| e.occurred_at <= d)
        })
    }
}

/// `prior` put the customer on the plan that `event` moves them off
fn moved_onto_plan_left_by(prior: &SubscriptionEvent, event: &SubscriptionEvent) -> bool {
    match (&prior.new_plan_id, &event.previous_plan_id) {
        (Some(a), Some(b)) => a == b,
        _ => match (prior.new_plan_name(), event.previous_plan_name()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// Run the aggregation pass over an organization's event history
///
/// `history` may contain events outside the window and of any type; only
/// NEW/UPGRADE/DOWNGRADE events inside `[window_start, window_end]` become
/// path occurrences. The full history feeds lead-time and churn lookups.
pub fn analyze_events(
    history: &[SubscriptionEvent],
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    query: MigrationQuery,
    thresholds: &AnalysisThresholds,
) -> PlanMigrationAnalysis {
    let index = CustomerIndex::build(history);

    let mut window_events: Vec<&SubscriptionEvent> = history
        .iter()
        .filter(|e| TRANSITION_TYPES.contains(&e.event_type))
        .filter(|e| e.occurred_at >= window_start && e.occurred_at <= window_end)
        .collect();
    window_events.sort_by_key(|e| e.occurred_at);

    let mut paths: Vec<PathAccumulator> = Vec::new();
    let mut path_index: HashMap<(Option<String>, String), usize> = HashMap::new();
    let mut funnel: Vec<FunnelAccumulator> = Vec::new();
    let mut funnel_index: HashMap<String, usize> = HashMap::new();

    for event in &window_events {
        let from_plan = event.previous_plan_name().map(str::to_string);
        let to_plan = event.new_plan_name().unwrap_or(UNKNOWN_PLAN).to_string();

        let slot = *path_index
            .entry((from_plan.clone(), to_plan.clone()))
            .or_insert_with(|| {
                paths.push(PathAccumulator {
                    from_plan: from_plan.clone(),
                    to_plan: to_plan.clone(),
                    count: 0,
                    total_mrr_delta: 0,
                    lead_time_days: Vec::new(),
                });
                paths.len() - 1
            });

        let path = &mut paths[slot];
        path.count += 1;
        path.total_mrr_delta += event.mrr_delta_cents();

        if event.event_type.is_plan_change() {
            if let Some(days) = index.lead_time_days(event) {
                path.lead_time_days.push(days);
            }
        }

        let Some(from) = from_plan else {
            continue;
        };

        let slot = *funnel_index.entry(from.clone()).or_insert_with(|| {
            funnel.push(FunnelAccumulator {
                plan: from,
                total: 0,
                upgrades: 0,
                downgrades: 0,
                churns: 0,
            });
            funnel.len() - 1
        });

        let stat = &mut funnel[slot];
        stat.total += 1;
        match event.event_type {
            SubscriptionEventType::Upgrade => stat.upgrades += 1,
            SubscriptionEventType::Downgrade => stat.downgrades += 1,
            _ => {}
        }
        if index.churned_within(event, thresholds.churn_attribution_days) {
            stat.churns += 1;
        }
    }

    let source_totals: HashMap<&str, u32> =
        funnel.iter().map(|f| (f.plan.as_str(), f.total)).collect();

    let mut path_list: Vec<MigrationPath> = paths
        .iter()
        .filter(|p| query.include_new_signups || p.from_plan.is_some())
        .map(|p| MigrationPath {
            from_plan: p.from_plan.clone(),
            to_plan: p.to_plan.clone(),
            count: p.count,
            total_mrr_delta: p.total_mrr_delta,
            average_mrr_delta: rounded_average(p.total_mrr_delta, p.count),
            conversion_rate: p
                .from_plan
                .as_deref()
                .and_then(|from| source_totals.get(from))
                .map(|total| percent(p.count, *total)),
            average_days_to_migrate: mean(&p.lead_time_days),
        })
        .collect();
    // sort_by is stable, so ties keep discovery order
    path_list.sort_by(|a, b| b.count.cmp(&a.count));

    let mut funnel_list: Vec<PlanFunnelStat> = funnel
        .into_iter()
        .map(|f| PlanFunnelStat {
            upgrade_rate: percent(f.upgrades, f.total),
            downgrade_rate: percent(f.downgrades, f.total),
            churn_rate: percent(f.churns, f.total),
            plan: f.plan,
            total_customers: f.total,
            upgrade_count: f.upgrades,
            downgrade_count: f.downgrades,
            churn_count: f.churns,
        })
        .collect();
    funnel_list.sort_by(|a, b| b.total_customers.cmp(&a.total_customers));

    PlanMigrationAnalysis {
        window_months: query.window_months,
        window_start,
        window_end,
        total_events: u32::try_from(window_events.len()).unwrap_or(u32::MAX),
        paths: path_list,
        funnel: funnel_list,
    }
}

/// Nearest-integer average, halves rounded away from zero
fn rounded_average(total: i64, count: u32) -> i64 {
    if count == 0 {
        return 0;
    }
    div_round_half_away(total, i64::from(count))
}

/// `n / d` rounded to the nearest integer, halves away from zero, for `d > 0`
pub(crate) fn div_round_half_away(n: i64, d: i64) -> i64 {
    let quotient = n / d;
    let remainder = n % d;
    if remainder.unsigned_abs() >= d.unsigned_abs() - remainder.unsigned_abs() {
        quotient + n.signum()
    } else {
        quotient
    }
}

fn percent(part: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(part) / f64::from(total) * 100.0
}

fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Same wall-clock instant `months` calendar months earlier
///
/// The day is clamped to the target month's length (Mar 31 -> Feb 28).
pub fn months_before(at: OffsetDateTime, months: i64) -> AnalyticsResult<OffsetDateTime> {
    let out_of_range = || AnalyticsError::invalid_argument("months is out of range");

    let month_index = i64::from(at.year()) * 12 + i64::from(u8::from(at.month())) - 1;
    let target = month_index.checked_sub(months).ok_or_else(out_of_range)?;

    let year = i32::try_from(target.div_euclid(12)).map_err(|_| out_of_range())?;
    let month = u8::try_from(target.rem_euclid(12) + 1)
        .ok()
        .and_then(|m| time::Month::try_from(m).ok())
        .ok_or_else(out_of_range)?;
    let day = at.day().min(time::util::days_in_year_month(year, month));

    let date = Date::from_calendar_date(year, month, day).map_err(|_| out_of_range())?;
    Ok(at.replace_date(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEventStore;
    use crate::test_support::event_at;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-06-30 12:00 UTC);

    fn analyze(history: &[SubscriptionEvent]) -> PlanMigrationAnalysis {
        let start = months_before(NOW, 12).unwrap();
        analyze_events(
            history,
            start,
            NOW,
            MigrationQuery::default(),
            &AnalysisThresholds::default(),
        )
    }

    fn signup(org: OrgId, customer: &str, plan: &str, mrr: i64, at: OffsetDateTime) -> SubscriptionEvent {
        event_at(org, customer, SubscriptionEventType::New, None, Some(plan), 0, mrr, at)
    }

    fn change(
        org: OrgId,
        customer: &str,
        event_type: SubscriptionEventType,
        from: &str,
        to: &str,
        from_mrr: i64,
        to_mrr: i64,
        at: OffsetDateTime,
    ) -> SubscriptionEvent {
        event_at(org, customer, event_type, Some(from), Some(to), from_mrr, to_mrr, at)
    }

    fn cancel(org: OrgId, customer: &str, plan: &str, mrr: i64, at: OffsetDateTime) -> SubscriptionEvent {
        event_at(org, customer, SubscriptionEventType::Canceled, Some(plan), None, mrr, 0, at)
    }

    #[test]
    fn test_starter_to_growth_scenario() {
        let org = OrgId::new();
        let mut history = Vec::new();
        for i in 0..5 {
            history.push(signup(
                org,
                &format!("cus_{i}"),
                "Starter",
                2900,
                datetime!(2026-01-01 00:00 UTC) + Duration::days(i),
            ));
        }
        history.push(change(
            org,
            "cus_0",
            SubscriptionEventType::Upgrade,
            "Starter",
            "Growth",
            2900,
            9900,
            datetime!(2026-03-01 00:00 UTC),
        ));
        history.push(change(
            org,
            "cus_1",
            SubscriptionEventType::Upgrade,
            "Starter",
            "Growth",
            2900,
            9900,
            datetime!(2026-03-02 00:00 UTC),
        ));

        let analysis = analyze(&history);

        assert_eq!(analysis.total_events, 7);
        assert_eq!(analysis.paths.iter().map(|p| p.count).sum::<u32>(), 7);

        // NEW -> Starter is most common
        assert_eq!(analysis.paths[0].from_plan, None);
        assert_eq!(analysis.paths[0].to_plan, "Starter");
        assert_eq!(analysis.paths[0].count, 5);
        assert_eq!(analysis.paths[0].conversion_rate, None);

        let growth = &analysis.paths[1];
        assert_eq!(growth.from_plan.as_deref(), Some("Starter"));
        assert_eq!(growth.to_plan, "Growth");
        assert_eq!(growth.count, 2);
        assert_eq!(growth.average_mrr_delta, 7000);
        assert_eq!(growth.conversion_rate, Some(100.0));

        assert_eq!(analysis.funnel.len(), 1);
        let starter = &analysis.funnel[0];
        assert_eq!(starter.plan, "Starter");
        assert_eq!(starter.total_customers, 2);
        assert_eq!(starter.upgrade_count, 2);
        assert_eq!(starter.upgrade_rate, 100.0);
        assert_eq!(starter.churn_count, 0);
    }

    #[test]
    fn test_lead_time_uses_most_recent_matching_prior_event() {
        let org = OrgId::new();
        let history = vec![
            signup(org, "cus_a", "Starter", 2900, datetime!(2026-01-01 00:00 UTC)),
            change(
                org,
                "cus_a",
                SubscriptionEventType::Upgrade,
                "Starter",
                "Growth",
                2900,
                9900,
                datetime!(2026-01-11 00:00 UTC),
            ),
            change(
                org,
                "cus_a",
                SubscriptionEventType::Downgrade,
                "Growth",
                "Starter",
                9900,
                2900,
                datetime!(2026-02-10 00:00 UTC),
            ),
            change(
                org,
                "cus_a",
                SubscriptionEventType::Upgrade,
                "Starter",
                "Growth",
                2900,
                9900,
                datetime!(2026-02-15 00:00 UTC),
            ),
        ];

        let analysis = analyze(&history);
        let up = analysis
            .paths
            .iter()
            .find(|p| p.from_plan.as_deref() == Some("Starter") && p.to_plan == "Growth")
            .unwrap();
        // Samples: 10 days (from signup) and 5 days (from the downgrade)
        assert_eq!(up.count, 2);
        assert_eq!(up.average_days_to_migrate, Some(7.5));

        let down = analysis
            .paths
            .iter()
            .find(|p| p.to_plan == "Starter" && p.from_plan.is_some())
            .unwrap();
        assert_eq!(down.average_days_to_migrate, Some(30.0));
    }

    #[test]
    fn test_missing_prior_event_records_no_sample() {
        let org = OrgId::new();
        let history = vec![change(
            org,
            "cus_a",
            SubscriptionEventType::Upgrade,
            "Starter",
            "Growth",
            2900,
            9900,
            datetime!(2026-02-15 00:00 UTC),
        )];

        let analysis = analyze(&history);
        assert_eq!(analysis.paths[0].average_days_to_migrate, None);
    }

    #[test]
    fn test_lead_time_looks_before_window() {
        let org = OrgId::new();
        let history = vec![
            signup(org, "cus_a", "Starter", 2900, datetime!(2024-06-30 12:00 UTC)),
            change(
                org,
                "cus_a",
                SubscriptionEventType::Upgrade,
                "Starter",
                "Growth",
                2900,
                9900,
                datetime!(2026-06-30 12:00 UTC),
            ),
        ];

        let analysis = analyze(&history);
        // The signup is outside the window and is not a path occurrence
        assert_eq!(analysis.total_events, 1);
        assert_eq!(analysis.paths[0].average_days_to_migrate, Some(730.0));
    }

    #[test]
    fn test_churn_within_attribution_window() {
        let org = OrgId::new();
        let history = vec![
            change(
                org,
                "cus_a",
                SubscriptionEventType::Downgrade,
                "Growth",
                "Starter",
                9900,
                2900,
                datetime!(2026-01-01 00:00 UTC),
            ),
            cancel(org, "cus_a", "Starter", 2900, datetime!(2026-03-31 00:00 UTC)),
            change(
                org,
                "cus_b",
                SubscriptionEventType::Downgrade,
                "Growth",
                "Starter",
                9900,
                2900,
                datetime!(2026-01-01 00:00 UTC),
            ),
            // 91 days later: outside the window
            cancel(org, "cus_b", "Starter", 2900, datetime!(2026-04-02 00:00 UTC)),
        ];

        let analysis = analyze(&history);
        let growth = &analysis.funnel[0];
        assert_eq!(growth.plan, "Growth");
        assert_eq!(growth.total_customers, 2);
        assert_eq!(growth.downgrade_count, 2);
        assert_eq!(growth.churn_count, 1);
        assert_eq!(growth.churn_rate, 50.0);
        // Cancellations are not path occurrences
        assert_eq!(analysis.total_events, 2);
    }

    #[test]
    fn test_exclude_new_signups_from_path_list() {
        let org = OrgId::new();
        let history = vec![
            signup(org, "cus_a", "Starter", 2900, datetime!(2026-01-01 00:00 UTC)),
            change(
                org,
                "cus_a",
                SubscriptionEventType::Upgrade,
                "Starter",
                "Growth",
                2900,
                9900,
                datetime!(2026-02-01 00:00 UTC),
            ),
        ];

        let analysis = analyze_events(
            &history,
            months_before(NOW, 12).unwrap(),
            NOW,
            MigrationQuery {
                window_months: 12,
                include_new_signups: false,
            },
            &AnalysisThresholds::default(),
        );

        assert_eq!(analysis.paths.len(), 1);
        assert!(analysis.paths.iter().all(|p| !p.is_new_signup()));
        // Signup still feeds the lead-time lookup
        assert_eq!(analysis.paths[0].average_days_to_migrate, Some(31.0));
        assert_eq!(analysis.total_events, 2);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let org = OrgId::new();
        let history = vec![
            change(org, "c1", SubscriptionEventType::Upgrade, "A", "B", 100, 200, datetime!(2026-01-01 00:00 UTC)),
            change(org, "c2", SubscriptionEventType::Upgrade, "C", "D", 100, 200, datetime!(2026-01-02 00:00 UTC)),
            change(org, "c3", SubscriptionEventType::Upgrade, "E", "F", 100, 200, datetime!(2026-01-03 00:00 UTC)),
            change(org, "c4", SubscriptionEventType::Upgrade, "E", "F", 100, 200, datetime!(2026-01-04 00:00 UTC)),
        ];

        let analysis = analyze(&history);
        let order: Vec<&str> = analysis.paths.iter().map(|p| p.to_plan.as_str()).collect();
        assert_eq!(order, vec!["F", "B", "D"]);
    }

    #[test]
    fn test_unknown_target_plan() {
        let org = OrgId::new();
        let history = vec![event_at(
            org,
            "cus_a",
            SubscriptionEventType::New,
            None,
            None,
            0,
            1000,
            datetime!(2026-02-01 00:00 UTC),
        )];

        let analysis = analyze(&history);
        assert_eq!(analysis.paths[0].to_plan, UNKNOWN_PLAN);
        assert_eq!(analysis.paths[0].from_label(), NEW_SIGNUP_LABEL);
    }

    #[test]
    fn test_average_mrr_delta_rounds_to_nearest() {
        assert_eq!(rounded_average(10, 4), 3); // 2.5
        assert_eq!(rounded_average(7, 3), 2); // 2.33
        assert_eq!(rounded_average(-10, 4), -3);
        assert_eq!(rounded_average(0, 0), 0);
        assert_eq!(rounded_average(-7, 2), -4); // -3.5
        assert_eq!(rounded_average(5, 1), 5);
    }

    #[test]
    fn test_average_mrr_delta_exact_beyond_f64_precision() {
        // 2^53 + 1 is not representable as f64
        let total = (1_i64 << 53) + 1;
        assert_eq!(rounded_average(total, 1), total);
        assert_eq!(rounded_average(i64::MAX, 1), i64::MAX);
        assert_eq!(rounded_average(i64::MIN + 1, 1), i64::MIN + 1);
        assert_eq!(rounded_average(i64::MAX, 2), i64::MAX / 2 + 1);
    }

    #[test]
    fn test_churn_window_beyond_calendar_counts_any_later_cancel() {
        let org = OrgId::new();
        let history = vec![
            signup(org, "cus_a", "Starter", 2900, datetime!(2025-08-01 00:00 UTC)),
            change(
                org,
                "cus_a",
                SubscriptionEventType::Upgrade,
                "Starter",
                "Growth",
                2900,
                9900,
                datetime!(2026-01-15 00:00 UTC),
            ),
            cancel(org, "cus_a", "Growth", 9900, datetime!(2026-06-01 00:00 UTC)),
        ];
        let start = months_before(NOW, 12).unwrap();

        for days in [5_000_000, i64::MAX] {
            let thresholds = AnalysisThresholds {
                churn_attribution_days: days,
                ..AnalysisThresholds::default()
            };
            let analysis =
                analyze_events(&history, start, NOW, MigrationQuery::default(), &thresholds);
            let starter = analysis.funnel.iter().find(|f| f.plan == "Starter").unwrap();
            assert_eq!(starter.churn_count, 1, "days = {}", days);
        }

        let thresholds = AnalysisThresholds {
            churn_attribution_days: 30,
            ..AnalysisThresholds::default()
        };
        let analysis = analyze_events(&history, start, NOW, MigrationQuery::default(), &thresholds);
        let starter = analysis.funnel.iter().find(|f| f.plan == "Starter").unwrap();
        assert_eq!(starter.churn_count, 0);
    }

    #[test]
    fn test_months_before_clamps_day() {
        assert_eq!(
            months_before(datetime!(2026-03-31 10:00 UTC), 1).unwrap(),
            datetime!(2026-02-28 10:00 UTC)
        );
        assert_eq!(
            months_before(datetime!(2026-01-15 00:00 UTC), 12).unwrap(),
            datetime!(2025-01-15 00:00 UTC)
        );
        assert_eq!(
            months_before(datetime!(2026-02-10 00:00 UTC), 3).unwrap(),
            datetime!(2025-11-10 00:00 UTC)
        );
    }

    #[tokio::test]
    async fn test_analyzer_rejects_non_positive_window() {
        let analyzer = PlanMigrationAnalyzer::new(
            Arc::new(InMemoryEventStore::new()),
            AnalysisThresholds::default(),
        );
        let err = analyzer
            .analyze(
                OrgId::new(),
                MigrationQuery {
                    window_months: 0,
                    include_new_signups: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_analyzer_propagates_store_failure() {
        let store = Arc::new(InMemoryEventStore::new());
        store.set_unavailable(true);
        let analyzer = PlanMigrationAnalyzer::new(store, AnalysisThresholds::default());

        let err = analyzer
            .analyze(OrgId::new(), MigrationQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_analyzer_reads_from_store() {
        let store = Arc::new(InMemoryEventStore::new());
        let org = OrgId::new();
        let other = OrgId::new();
        store
            .insert_event(signup(org, "cus_a", "Starter", 2900, datetime!(2026-05-01 00:00 UTC)))
            .await;
        store
            .insert_event(signup(other, "cus_b", "Growth", 9900, datetime!(2026-05-01 00:00 UTC)))
            .await;
        // After `now`: excluded
        store
            .insert_event(signup(org, "cus_c", "Starter", 2900, datetime!(2026-07-02 00:00 UTC)))
            .await;

        let analyzer = PlanMigrationAnalyzer::new(store, AnalysisThresholds::default());
        let analysis = analyzer
            .analyze_as_of(org, MigrationQuery::default(), NOW)
            .await
            .unwrap();

        assert_eq!(analysis.total_events, 1);
        assert_eq!(analysis.paths[0].to_plan, "Starter");
    }
}
