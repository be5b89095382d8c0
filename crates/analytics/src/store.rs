//! Event and snapshot accessors
//!
//! Every read is scoped to a single organization. The analysis passes only
//! ever see data through [`EventStore`], so they can run against Postgres in
//! production and [`InMemoryEventStore`] in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use revlens_shared::{DailyMetricsSnapshot, OrgId, SubscriptionEvent, SubscriptionEventType};
use time::{Date, OffsetDateTime};
use tokio::sync::RwLock;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Filter for [`EventStore::list_events`]
///
/// Both time bounds are inclusive. `None` leaves the side open.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub types: Option<Vec<SubscriptionEventType>>,
    pub occurred_after: Option<OffsetDateTime>,
    pub occurred_before: Option<OffsetDateTime>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(mut self, types: &[SubscriptionEventType]) -> Self {
        self.types = Some(types.to_vec());
        self
    }

    pub fn after(mut self, at: OffsetDateTime) -> Self {
        self.occurred_after = Some(at);
        self
    }

    pub fn before(mut self, at: OffsetDateTime) -> Self {
        self.occurred_before = Some(at);
        self
    }

    pub fn matches(&self, event: &SubscriptionEvent) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(after) = self.occurred_after {
            if event.occurred_at < after {
                return false;
            }
        }
        if let Some(before) = self.occurred_before {
            if event.occurred_at > before {
                return false;
            }
        }
        true
    }

    /// Event type names for SQL `= ANY($n)` binding
    pub fn type_names(&self) -> Option<Vec<String>> {
        self.types
            .as_ref()
            .map(|types| types.iter().map(|t| t.as_str().to_string()).collect())
    }
}

/// Inclusive calendar-date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: Date) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Invoice payment outcomes for one organization on one day
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaymentStats {
    pub succeeded: i32,
    pub failed: i32,
    pub average_discount_percent: f64,
}

/// Read-only, organization-scoped access to billing events and snapshots
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events matching `query`, ordered by `occurred_at` ascending
    async fn list_events(
        &self,
        org_id: OrgId,
        query: &EventQuery,
    ) -> AnalyticsResult<Vec<SubscriptionEvent>>;

    async fn get_snapshot(
        &self,
        org_id: OrgId,
        date: Date,
    ) -> AnalyticsResult<Option<DailyMetricsSnapshot>>;

    /// Most recent snapshot on or before today, if any
    async fn latest_snapshot(&self, org_id: OrgId)
        -> AnalyticsResult<Option<DailyMetricsSnapshot>>;

    /// Snapshots within `range`, ordered by date ascending
    async fn list_snapshots(
        &self,
        org_id: OrgId,
        range: DateRange,
    ) -> AnalyticsResult<Vec<DailyMetricsSnapshot>>;
}

/// Write side used by the snapshot job
#[async_trait]
pub trait SnapshotRepository: EventStore {
    async fn list_organization_ids(&self) -> AnalyticsResult<Vec<OrgId>>;

    async fn payment_stats(&self, org_id: OrgId, date: Date) -> AnalyticsResult<PaymentStats>;

    /// Insert or replace the snapshot for (org_id, snapshot_date)
    async fn upsert_snapshot(&self, snapshot: &DailyMetricsSnapshot) -> AnalyticsResult<()>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// In-memory store for tests and local demos
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<OrgId, Vec<SubscriptionEvent>>>,
    snapshots: RwLock<HashMap<OrgId, BTreeMap<Date, DailyMetricsSnapshot>>>,
    payments: RwLock<HashMap<(OrgId, Date), PaymentStats>>,
    unavailable: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: SubscriptionEvent) {
        let mut events = self.events.write().await;
        let org_events = events.entry(OrgId(event.org_id)).or_default();
        org_events.push(event);
        org_events.sort_by_key(|e| e.occurred_at);
    }

    pub async fn insert_events(&self, events: impl IntoIterator<Item = SubscriptionEvent>) {
        for event in events {
            self.insert_event(event).await;
        }
    }

    pub async fn insert_snapshot(&self, snapshot: DailyMetricsSnapshot) {
        self.snapshots
            .write()
            .await
            .entry(OrgId(snapshot.org_id))
            .or_default()
            .insert(snapshot.snapshot_date, snapshot);
    }

    pub async fn set_payment_stats(&self, org_id: OrgId, date: Date, stats: PaymentStats) {
        self.payments.write().await.insert((org_id, date), stats);
    }

    /// Make every subsequent read fail as if the database were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AnalyticsResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AnalyticsError::Upstream(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn list_events(
        &self,
        org_id: OrgId,
        query: &EventQuery,
    ) -> AnalyticsResult<Vec<SubscriptionEvent>> {
        self.check_available()?;
        Ok(self
            .events
            .read()
            .await
            .get(&org_id)
            .map(|events| events.iter().filter(|e| query.matches(e)).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_snapshot(
        &self,
        org_id: OrgId,
        date: Date,
    ) -> AnalyticsResult<Option<DailyMetricsSnapshot>> {
        self.check_available()?;
        Ok(self
            .snapshots
            .read()
            .await
            .get(&org_id)
            .and_then(|s| s.get(&date).cloned()))
    }

    async fn latest_snapshot(
        &self,
        org_id: OrgId,
    ) -> AnalyticsResult<Option<DailyMetricsSnapshot>> {
        self.check_available()?;
        let today = OffsetDateTime::now_utc().date();
        Ok(self
            .snapshots
            .read()
            .await
            .get(&org_id)
            .and_then(|s| s.range(..=today).next_back().map(|(_, v)| v.clone())))
    }

    async fn list_snapshots(
        &self,
        org_id: OrgId,
        range: DateRange,
    ) -> AnalyticsResult<Vec<DailyMetricsSnapshot>> {
        self.check_available()?;
        Ok(self
            .snapshots
            .read()
            .await
            .get(&org_id)
            .filter(|_| range.start <= range.end)
            .map(|s| {
                s.range(range.start..=range.end)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryEventStore {
    async fn list_organization_ids(&self) -> AnalyticsResult<Vec<OrgId>> {
        self.check_available()?;
        let mut ids: Vec<OrgId> = self.events.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn payment_stats(&self, org_id: OrgId, date: Date) -> AnalyticsResult<PaymentStats> {
        self.check_available()?;
        Ok(self
            .payments
            .read()
            .await
            .get(&(org_id, date))
            .copied()
            .unwrap_or_default())
    }

    async fn upsert_snapshot(&self, snapshot: &DailyMetricsSnapshot) -> AnalyticsResult<()> {
        self.check_available()?;
        self.insert_snapshot(snapshot.clone()).await;
        Ok(())
    }
}
