//! Metrics aggregation over daily snapshots

use std::sync::Arc;

use revlens_shared::{DailyMetricsSnapshot, OrgId};
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::store::{DateRange, EventStore};

/// Month-over-month comparisons look for a snapshot at least this many days older
const COMPARISON_GAP_DAYS: i64 = 30;

/// How far past the comparison gap to search for an older snapshot
const COMPARISON_LOOKBACK_DAYS: i64 = 90;

/// Latest snapshot plus its change against the month before
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsOverview {
    pub current: DailyMetricsSnapshot,
    pub previous: Option<DailyMetricsSnapshot>,
    /// Percent change in MRR versus `previous`; absent when there is no
    /// comparison snapshot or its MRR was zero
    pub mrr_change_percent: Option<f64>,
}

#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn EventStore>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Latest snapshot for the organization, `None` when nothing has been computed yet
    pub async fn current_snapshot(
        &self,
        org_id: OrgId,
    ) -> AnalyticsResult<Option<DailyMetricsSnapshot>> {
        self.store.latest_snapshot(org_id).await
    }

    /// Up to `days` snapshots ending today, oldest first
    pub async fn history(
        &self,
        org_id: OrgId,
        days: i64,
    ) -> AnalyticsResult<Vec<DailyMetricsSnapshot>> {
        self.history_as_of(org_id, days, OffsetDateTime::now_utc().date())
            .await
    }

    /// Up to `days` snapshots ending on `today`, oldest first
    ///
    /// Missing days stay missing; nothing is synthesized for gaps.
    pub async fn history_as_of(
        &self,
        org_id: OrgId,
        days: i64,
        today: Date,
    ) -> AnalyticsResult<Vec<DailyMetricsSnapshot>> {
        if days <= 0 {
            return Err(AnalyticsError::invalid_argument(format!(
                "days must be a positive integer, got {}",
                days
            )));
        }

        // Longer windows than the calendar can hold select the same rows
        let span = days.min(max_history_days());
        let start = today
            .checked_sub(Duration::days(span - 1))
            .unwrap_or(Date::MIN);

        let snapshots = self
            .store
            .list_snapshots(org_id, DateRange::new(start, today))
            .await?;

        Ok(normalize_history(snapshots, days))
    }

    pub async fn overview(&self, org_id: OrgId) -> AnalyticsResult<Option<MetricsOverview>> {
        let Some(current) = self.store.latest_snapshot(org_id).await? else {
            return Ok(None);
        };

        let newest = current
            .snapshot_date
            .checked_sub(Duration::days(COMPARISON_GAP_DAYS))
            .unwrap_or(Date::MIN);
        let oldest = newest
            .checked_sub(Duration::days(COMPARISON_LOOKBACK_DAYS))
            .unwrap_or(Date::MIN);
        let previous = self
            .store
            .list_snapshots(org_id, DateRange::new(oldest, newest))
            .await?
            .into_iter()
            .max_by_key(|s| s.snapshot_date);

        let mrr_change_percent = previous
            .as_ref()
            .filter(|p| p.mrr_cents > 0)
            .map(|p| current.mrr_cents.saturating_sub(p.mrr_cents) as f64 / p.mrr_cents as f64 * 100.0);

        Ok(Some(MetricsOverview {
            current,
            previous,
            mrr_change_percent,
        }))
    }
}

/// Number of days between the earliest and latest representable dates
fn max_history_days() -> i64 {
    i64::from(Date::MAX.to_julian_day()) - i64::from(Date::MIN.to_julian_day()) + 1
}

/// Sort ascending, drop duplicate dates, and keep at most the newest `days` entries
fn normalize_history(
    mut snapshots: Vec<DailyMetricsSnapshot>,
    days: i64,
) -> Vec<DailyMetricsSnapshot> {
    snapshots.sort_by_key(|s| s.snapshot_date);
    snapshots.dedup_by_key(|s| s.snapshot_date);

    let limit = usize::try_from(days).unwrap_or(usize::MAX);
    if snapshots.len() > limit {
        snapshots.drain(..snapshots.len() - limit);
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEventStore;
    use crate::test_support::snapshot;
    use time::macros::date;

    #[tokio::test]
    async fn test_current_snapshot_no_data() {
        let store = Arc::new(InMemoryEventStore::new());
        let aggregator = MetricsAggregator::new(store);

        let result = aggregator.current_snapshot(OrgId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_current_snapshot_returns_latest() {
        let store = Arc::new(InMemoryEventStore::new());
        let org = OrgId::new();
        let today = OffsetDateTime::now_utc().date();
        store
            .insert_snapshot(snapshot(org, today - Duration::days(2), 1000))
            .await;
        store
            .insert_snapshot(snapshot(org, today - Duration::days(1), 2000))
            .await;

        let aggregator = MetricsAggregator::new(store);
        let current = aggregator.current_snapshot(org).await.unwrap().unwrap();
        assert_eq!(current.mrr_cents, 2000);
    }

    #[tokio::test]
    async fn test_history_rejects_non_positive_days() {
        let aggregator = MetricsAggregator::new(Arc::new(InMemoryEventStore::new()));
        for days in [0, -1, -30] {
            let err = aggregator.history(OrgId::new(), days).await.unwrap_err();
            assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_history_huge_window_returns_all_rows() {
        let store = Arc::new(InMemoryEventStore::new());
        let org = OrgId::new();
        let today = date!(2026 - 03 - 10);
        store.insert_snapshot(snapshot(org, today, 100)).await;
        store
            .insert_snapshot(snapshot(org, date!(1999 - 12 - 31), 10))
            .await;

        let aggregator = MetricsAggregator::new(store);
        for days in [i64::MAX, 1_000_000_000_000_000, max_history_days() + 1] {
            let history = aggregator.history_as_of(org, days, today).await.unwrap();
            assert_eq!(history.len(), 2, "days = {}", days);
            assert_eq!(history[0].snapshot_date, date!(1999 - 12 - 31));
        }

        let history = aggregator.history(org, i64::MAX).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_history_preserves_gaps_and_order() {
        let store = Arc::new(InMemoryEventStore::new());
        let org = OrgId::new();
        let today = date!(2026 - 03 - 10);
        for d in [10, 7, 9, 1] {
            store
                .insert_snapshot(snapshot(
                    org,
                    Date::from_calendar_date(2026, time::Month::March, d).unwrap(),
                    i64::from(d) * 100,
                ))
                .await;
        }
        // Outside the 5-day window
        store
            .insert_snapshot(snapshot(org, date!(2026 - 02 - 20), 50))
            .await;

        let aggregator = MetricsAggregator::new(store);
        let history = aggregator.history_as_of(org, 5, today).await.unwrap();

        let dates: Vec<Date> = history.iter().map(|s| s.snapshot_date).collect();
        assert_eq!(
            dates,
            vec![date!(2026 - 03 - 07), date!(2026 - 03 - 09), date!(2026 - 03 - 10)]
        );
    }

    #[tokio::test]
    async fn test_history_single_day() {
        let store = Arc::new(InMemoryEventStore::new());
        let org = OrgId::new();
        let today = date!(2026 - 03 - 10);
        store.insert_snapshot(snapshot(org, today, 100)).await;
        store
            .insert_snapshot(snapshot(org, date!(2026 - 03 - 09), 90))
            .await;

        let aggregator = MetricsAggregator::new(store);
        let history = aggregator.history_as_of(org, 1, today).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].snapshot_date, today);
    }

    #[test]
    fn test_normalize_history_dedups_and_truncates() {
        let org = OrgId::new();
        let snapshots = vec![
            snapshot(org, date!(2026 - 01 - 03), 3),
            snapshot(org, date!(2026 - 01 - 01), 1),
            snapshot(org, date!(2026 - 01 - 03), 33),
            snapshot(org, date!(2026 - 01 - 02), 2),
        ];
        let out = normalize_history(snapshots, 2);
        let dates: Vec<Date> = out.iter().map(|s| s.snapshot_date).collect();
        assert_eq!(dates, vec![date!(2026 - 01 - 02), date!(2026 - 01 - 03)]);
    }

    #[tokio::test]
    async fn test_overview_month_over_month() {
        let store = Arc::new(InMemoryEventStore::new());
        let org = OrgId::new();
        let today = OffsetDateTime::now_utc().date();
        store.insert_snapshot(snapshot(org, today, 12_000)).await;
        store
            .insert_snapshot(snapshot(org, today - Duration::days(10), 11_000))
            .await;
        store
            .insert_snapshot(snapshot(org, today - Duration::days(31), 10_000))
            .await;

        let aggregator = MetricsAggregator::new(store);
        let overview = aggregator.overview(org).await.unwrap().unwrap();
        assert_eq!(overview.current.mrr_cents, 12_000);
        assert_eq!(overview.previous.as_ref().unwrap().mrr_cents, 10_000);
        let change = overview.mrr_change_percent.unwrap();
        assert!((change - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_overview_without_comparison() {
        let store = Arc::new(InMemoryEventStore::new());
        let org = OrgId::new();
        let today = OffsetDateTime::now_utc().date();
        store.insert_snapshot(snapshot(org, today, 12_000)).await;

        let aggregator = MetricsAggregator::new(store);
        let overview = aggregator.overview(org).await.unwrap().unwrap();
        assert!(overview.previous.is_none());
        assert!(overview.mrr_change_percent.is_none());
    }
}
