//! Common types used across Revlens

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Organization ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub Uuid);

impl OrgId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OrgId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Subscription Events
// =============================================================================

/// Kind of billing-state transition recorded for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionEventType {
    New,
    Upgrade,
    Downgrade,
    Canceled,
}

impl SubscriptionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionEventType::New => "NEW",
            SubscriptionEventType::Upgrade => "UPGRADE",
            SubscriptionEventType::Downgrade => "DOWNGRADE",
            SubscriptionEventType::Canceled => "CANCELED",
        }
    }

    /// Plan changes on an existing subscription
    pub fn is_plan_change(&self) -> bool {
        matches!(
            self,
            SubscriptionEventType::Upgrade | SubscriptionEventType::Downgrade
        )
    }
}

impl std::fmt::Display for SubscriptionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown subscription event type: {0}")]
pub struct UnknownEventType(pub String);

impl std::str::FromStr for SubscriptionEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(SubscriptionEventType::New),
            "UPGRADE" => Ok(SubscriptionEventType::Upgrade),
            "DOWNGRADE" => Ok(SubscriptionEventType::Downgrade),
            "CANCELED" => Ok(SubscriptionEventType::Canceled),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SubscriptionEventType {
    type Error = UnknownEventType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Immutable record of a billing-state transition
///
/// Written by the sync process whenever the billing provider reports a change
/// to a subscription. Amounts are monthly recurring revenue in cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub id: Uuid,
    pub org_id: Uuid,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    #[sqlx(try_from = "String")]
    pub event_type: SubscriptionEventType,
    pub previous_plan_id: Option<String>,
    pub new_plan_id: Option<String>,
    pub previous_plan_nickname: Option<String>,
    pub new_plan_nickname: Option<String>,
    pub previous_mrr_cents: Option<i64>,
    pub new_mrr_cents: Option<i64>,
    pub previous_quantity: Option<i32>,
    pub new_quantity: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl SubscriptionEvent {
    /// Display name of the plan the subscription left (nickname preferred over price ID)
    pub fn previous_plan_name(&self) -> Option<&str> {
        self.previous_plan_nickname
            .as_deref()
            .or(self.previous_plan_id.as_deref())
    }

    /// Display name of the plan the subscription moved to
    pub fn new_plan_name(&self) -> Option<&str> {
        self.new_plan_nickname
            .as_deref()
            .or(self.new_plan_id.as_deref())
    }

    /// Change in MRR caused by this event, in cents
    pub fn mrr_delta_cents(&self) -> i64 {
        self.new_mrr_cents.unwrap_or(0) - self.previous_mrr_cents.unwrap_or(0)
    }
}

// =============================================================================
// Daily Metrics Snapshot
// =============================================================================

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Point-in-time aggregates for one organization on one calendar day
///
/// At most one row exists per (org_id, snapshot_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetricsSnapshot {
    pub org_id: Uuid,
    #[serde(with = "iso_date")]
    pub snapshot_date: Date,
    pub mrr_cents: i64,
    pub arr_cents: i64,
    pub arpu_cents: i64,
    pub active_subscriptions: i32,
    pub new_subscriptions: i32,
    pub canceled_subscriptions: i32,
    pub upgraded_subscriptions: i32,
    pub downgraded_subscriptions: i32,
    /// Percent of subscriptions active at start of day that canceled
    pub customer_churn_rate: f64,
    /// Percent of start-of-day MRR lost to cancellations and contraction
    pub revenue_churn_rate: f64,
    /// Net revenue retention, percent
    pub net_revenue_retention: f64,
    pub successful_payments: i32,
    pub failed_payments: i32,
    pub average_discount_percent: f64,
    /// Plan display name -> fraction of active subscriptions
    #[sqlx(json)]
    pub plan_distribution: BTreeMap<String, f64>,
}
