//! Business thresholds for churn attribution and friction detection
//!
//! Defaults match the values the dashboard has always shipped with. They are
//! kept overridable so operators can tune them per deployment.

use serde::{Deserialize, Serialize};

/// A cancellation within this many days after a plan change counts as churn from that change
pub const CHURN_ATTRIBUTION_DAYS: i64 = 90;

/// Paths slower than this on average are flagged as slow migrations
pub const SLOW_MIGRATION_DAYS: f64 = 180.0;

/// Upper bound accepted for churn attribution overrides (100 years)
pub const MAX_CHURN_ATTRIBUTION_DAYS: i64 = 36_500;

/// Slow migrations beyond this are high severity
pub const VERY_SLOW_MIGRATION_DAYS: f64 = 365.0;

/// Funnel churn rate above which a plan gets its own insight
pub const HIGH_CHURN_RATE_PERCENT: f64 = 20.0;

/// Paths converting below this percent are flagged
pub const LOW_CONVERSION_PERCENT: f64 = 5.0;
pub const LOW_CONVERSION_MEDIUM_PERCENT: f64 = 3.0;
pub const LOW_CONVERSION_HIGH_PERCENT: f64 = 2.0;

/// Minimum path counts (exclusive) before a rule applies
pub const LOW_CONVERSION_MIN_COUNT: u32 = 3;
pub const SLOW_MIGRATION_MIN_COUNT: u32 = 5;

/// Default analysis window for plan migrations
pub const DEFAULT_WINDOW_MONTHS: u32 = 12;

/// Default history length for the metrics view
pub const DEFAULT_HISTORY_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisThresholds {
    pub churn_attribution_days: i64,
    pub slow_migration_days: f64,
    pub very_slow_migration_days: f64,
    pub high_churn_rate_percent: f64,
    pub low_conversion_percent: f64,
    pub low_conversion_medium_percent: f64,
    pub low_conversion_high_percent: f64,
    pub low_conversion_min_count: u32,
    pub slow_migration_min_count: u32,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            churn_attribution_days: CHURN_ATTRIBUTION_DAYS,
            slow_migration_days: SLOW_MIGRATION_DAYS,
            very_slow_migration_days: VERY_SLOW_MIGRATION_DAYS,
            high_churn_rate_percent: HIGH_CHURN_RATE_PERCENT,
            low_conversion_percent: LOW_CONVERSION_PERCENT,
            low_conversion_medium_percent: LOW_CONVERSION_MEDIUM_PERCENT,
            low_conversion_high_percent: LOW_CONVERSION_HIGH_PERCENT,
            low_conversion_min_count: LOW_CONVERSION_MIN_COUNT,
            slow_migration_min_count: SLOW_MIGRATION_MIN_COUNT,
        }
    }
}

impl AnalysisThresholds {
    /// Defaults with `ANALYTICS_*` environment overrides applied
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides from `lookup` applied
    ///
    /// Unparseable or out-of-range values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut thresholds = Self::default();

        if let Some(days) = override_value::<i64, _>(
            &lookup,
            "ANALYTICS_CHURN_ATTRIBUTION_DAYS",
            |d| (1..=MAX_CHURN_ATTRIBUTION_DAYS).contains(d),
        ) {
            thresholds.churn_attribution_days = days;
        }
        if let Some(days) =
            override_value::<f64, _>(&lookup, "ANALYTICS_SLOW_MIGRATION_DAYS", |d| {
                d.is_finite() && *d > 0.0
            })
        {
            thresholds.slow_migration_days = days;
        }
        let slow = thresholds.slow_migration_days;
        if let Some(days) =
            override_value::<f64, _>(&lookup, "ANALYTICS_VERY_SLOW_MIGRATION_DAYS", |d| {
                d.is_finite() && *d >= slow
            })
        {
            thresholds.very_slow_migration_days = days;
        }
        if thresholds.very_slow_migration_days < thresholds.slow_migration_days {
            tracing::warn!(
                slow = thresholds.slow_migration_days,
                very_slow = thresholds.very_slow_migration_days,
                "Very slow migration threshold below slow threshold, raising it to match"
            );
            thresholds.very_slow_migration_days = thresholds.slow_migration_days;
        }

        thresholds
    }
}

fn override_value<T, F>(
    lookup: &F,
    key: &str,
    valid: impl Fn(&T) -> bool,
) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => Some(v),
        Ok(_) => {
            tracing::warn!(key, value = %raw, "Ignoring out-of-range analytics threshold override");
            None
        }
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable analytics threshold override");
            None
        }
    }
}
