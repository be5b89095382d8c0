//! Postgres-backed event store

use async_trait::async_trait;
use revlens_shared::{DailyMetricsSnapshot, OrgId, SubscriptionEvent};
use sqlx::PgPool;
use time::{Date, OffsetDateTime, Time};

use crate::error::AnalyticsResult;
use crate::store::{DateRange, EventQuery, EventStore, PaymentStats, SnapshotRepository};

const SNAPSHOT_COLUMNS: &str = r#"
    org_id, snapshot_date, mrr_cents, arr_cents, arpu_cents,
    active_subscriptions, new_subscriptions, canceled_subscriptions,
    upgraded_subscriptions, downgraded_subscriptions,
    customer_churn_rate, revenue_churn_rate, net_revenue_retention,
    successful_payments, failed_payments, average_discount_percent,
    plan_distribution
"#;

/// Row type for the per-day payment aggregate
#[derive(Debug, sqlx::FromRow)]
struct PaymentStatsRow {
    succeeded: i64,
    failed: i64,
    average_discount_percent: Option<f64>,
}

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn list_events(
        &self,
        org_id: OrgId,
        query: &EventQuery,
    ) -> AnalyticsResult<Vec<SubscriptionEvent>> {
        let events: Vec<SubscriptionEvent> = sqlx::query_as(
            r#"
            SELECT
                id, org_id, stripe_subscription_id, stripe_customer_id, event_type,
                previous_plan_id, new_plan_id, previous_plan_nickname, new_plan_nickname,
                previous_mrr_cents, new_mrr_cents, previous_quantity, new_quantity,
                occurred_at
            FROM subscription_events
            WHERE org_id = $1
              AND ($2::TEXT[] IS NULL OR event_type = ANY($2))
              AND ($3::TIMESTAMPTZ IS NULL OR occurred_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR occurred_at <= $4)
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(org_id.0)
        .bind(query.type_names())
        .bind(query.occurred_after)
        .bind(query.occurred_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn get_snapshot(
        &self,
        org_id: OrgId,
        date: Date,
    ) -> AnalyticsResult<Option<DailyMetricsSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM daily_metrics_snapshots \
             WHERE org_id = $1 AND snapshot_date = $2"
        );
        let snapshot = sqlx::query_as::<_, DailyMetricsSnapshot>(&sql)
            .bind(org_id.0)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(snapshot)
    }

    async fn latest_snapshot(
        &self,
        org_id: OrgId,
    ) -> AnalyticsResult<Option<DailyMetricsSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM daily_metrics_snapshots \
             WHERE org_id = $1 AND snapshot_date <= CURRENT_DATE \
             ORDER BY snapshot_date DESC LIMIT 1"
        );
        let snapshot = sqlx::query_as::<_, DailyMetricsSnapshot>(&sql)
            .bind(org_id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(snapshot)
    }

    async fn list_snapshots(
        &self,
        org_id: OrgId,
        range: DateRange,
    ) -> AnalyticsResult<Vec<DailyMetricsSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM daily_metrics_snapshots \
             WHERE org_id = $1 AND snapshot_date BETWEEN $2 AND $3 \
             ORDER BY snapshot_date ASC"
        );
        let snapshots = sqlx::query_as::<_, DailyMetricsSnapshot>(&sql)
            .bind(org_id.0)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;

        Ok(snapshots)
    }
}

#[async_trait]
impl SnapshotRepository for PgEventStore {
    async fn list_organization_ids(&self) -> AnalyticsResult<Vec<OrgId>> {
        let rows: Vec<(uuid::Uuid,)> =
            sqlx::query_as("SELECT id FROM organizations ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| OrgId(id)).collect())
    }

    async fn payment_stats(&self, org_id: OrgId, date: Date) -> AnalyticsResult<PaymentStats> {
        let start = date.with_time(Time::MIDNIGHT).assume_utc();
        let end = start + time::Duration::days(1);

        let row: PaymentStatsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'succeeded') AS succeeded,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                AVG(discount_percent) AS average_discount_percent
            FROM invoice_payments
            WHERE org_id = $1
              AND paid_at >= $2
              AND paid_at < $3
            "#,
        )
        .bind(org_id.0)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(PaymentStats {
            succeeded: i32::try_from(row.succeeded).unwrap_or(i32::MAX),
            failed: i32::try_from(row.failed).unwrap_or(i32::MAX),
            average_discount_percent: row.average_discount_percent.unwrap_or(0.0),
        })
    }

    async fn upsert_snapshot(&self, snapshot: &DailyMetricsSnapshot) -> AnalyticsResult<()> {
        let plan_distribution = serde_json::to_value(&snapshot.plan_distribution)?;

        sqlx::query(
            r#"
            INSERT INTO daily_metrics_snapshots (
                org_id, snapshot_date, mrr_cents, arr_cents, arpu_cents,
                active_subscriptions, new_subscriptions, canceled_subscriptions,
                upgraded_subscriptions, downgraded_subscriptions,
                customer_churn_rate, revenue_churn_rate, net_revenue_retention,
                successful_payments, failed_payments, average_discount_percent,
                plan_distribution, computed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (org_id, snapshot_date) DO UPDATE SET
                mrr_cents = EXCLUDED.mrr_cents,
                arr_cents = EXCLUDED.arr_cents,
                arpu_cents = EXCLUDED.arpu_cents,
                active_subscriptions = EXCLUDED.active_subscriptions,
                new_subscriptions = EXCLUDED.new_subscriptions,
                canceled_subscriptions = EXCLUDED.canceled_subscriptions,
                upgraded_subscriptions = EXCLUDED.upgraded_subscriptions,
                downgraded_subscriptions = EXCLUDED.downgraded_subscriptions,
                customer_churn_rate = EXCLUDED.customer_churn_rate,
                revenue_churn_rate = EXCLUDED.revenue_churn_rate,
                net_revenue_retention = EXCLUDED.net_revenue_retention,
                successful_payments = EXCLUDED.successful_payments,
                failed_payments = EXCLUDED.failed_payments,
                average_discount_percent = EXCLUDED.average_discount_percent,
                plan_distribution = EXCLUDED.plan_distribution,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(snapshot.org_id)
        .bind(snapshot.snapshot_date)
        .bind(snapshot.mrr_cents)
        .bind(snapshot.arr_cents)
        .bind(snapshot.arpu_cents)
        .bind(snapshot.active_subscriptions)
        .bind(snapshot.new_subscriptions)
        .bind(snapshot.canceled_subscriptions)
        .bind(snapshot.upgraded_subscriptions)
        .bind(snapshot.downgraded_subscriptions)
        .bind(snapshot.customer_churn_rate)
        .bind(snapshot.revenue_churn_rate)
        .bind(snapshot.net_revenue_retention)
        .bind(snapshot.successful_payments)
        .bind(snapshot.failed_payments)
        .bind(snapshot.average_discount_percent)
        .bind(plan_distribution)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
