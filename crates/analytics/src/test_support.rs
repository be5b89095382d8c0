//! Builders shared by the unit tests

use std::collections::BTreeMap;

use revlens_shared::{DailyMetricsSnapshot, OrgId, SubscriptionEvent, SubscriptionEventType};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

fn price_id(plan: &str) -> String {
    format!("price_{}", plan.to_lowercase())
}

/// Event for `customer` moving `from -> to` at `at`
///
/// Amounts are only recorded on the side that names a plan.
pub fn event_at(
    org: OrgId,
    customer: &str,
    event_type: SubscriptionEventType,
    from: Option<&str>,
    to: Option<&str>,
    prev_mrr: i64,
    new_mrr: i64,
    at: OffsetDateTime,
) -> SubscriptionEvent {
    SubscriptionEvent {
        id: Uuid::new_v4(),
        org_id: org.0,
        stripe_subscription_id: format!("sub_{customer}"),
        stripe_customer_id: customer.to_string(),
        event_type,
        previous_plan_id: from.map(price_id),
        new_plan_id: to.map(price_id),
        previous_plan_nickname: from.map(str::to_string),
        new_plan_nickname: to.map(str::to_string),
        previous_mrr_cents: from.map(|_| prev_mrr),
        new_mrr_cents: to.map(|_| new_mrr),
        previous_quantity: Some(1),
        new_quantity: Some(1),
        occurred_at: at,
    }
}

pub fn snapshot(org: OrgId, date: Date, mrr_cents: i64) -> DailyMetricsSnapshot {
    DailyMetricsSnapshot {
        org_id: org.0,
        snapshot_date: date,
        mrr_cents,
        arr_cents: mrr_cents * 12,
        arpu_cents: 0,
        active_subscriptions: 0,
        new_subscriptions: 0,
        canceled_subscriptions: 0,
        upgraded_subscriptions: 0,
        downgraded_subscriptions: 0,
        customer_churn_rate: 0.0,
        revenue_churn_rate: 0.0,
        net_revenue_retention: 100.0,
        successful_payments: 0,
        failed_payments: 0,
        average_discount_percent: 0.0,
        plan_distribution: BTreeMap::new(),
    }
}
