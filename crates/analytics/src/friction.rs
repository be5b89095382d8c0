//! Funnel insights and friction point detection

use serde::{Deserialize, Serialize};

use crate::insights;
use crate::plan_migrations::{MigrationPath, PlanFunnelStat};
use crate::thresholds::AnalysisThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrictionSeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for FrictionSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrictionSeverity::Low => write!(f, "low"),
            FrictionSeverity::Medium => write!(f, "medium"),
            FrictionSeverity::High => write!(f, "high"),
        }
    }
}

/// Which rule flagged the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrictionKind {
    LowConversion,
    SlowMigration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrictionPoint {
    pub from_plan: String,
    pub to_plan: String,
    pub kind: FrictionKind,
    pub severity: FrictionSeverity,
    pub count: u32,
    pub conversion_rate: Option<f64>,
    pub average_days_to_migrate: Option<f64>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrictionReport {
    pub insights: Vec<String>,
    pub friction_points: Vec<FrictionPoint>,
}

/// Derive narrative insights and friction points from an analysis
///
/// `paths` is expected in the analyzer's order (count descending), and
/// `funnel` sorted by total customers descending.
pub fn detect_friction(
    paths: &[MigrationPath],
    funnel: &[PlanFunnelStat],
    thresholds: &AnalysisThresholds,
) -> FrictionReport {
    let mut report = FrictionReport::default();

    let plan_changes = || paths.iter().filter(|p| !p.is_new_signup());

    if let Some(top) = most_common(plan_changes().filter(|p| p.average_mrr_delta > 0)) {
        report.insights.push(insights::top_upgrade(top));
    }

    if let Some(top) = most_common(plan_changes().filter(|p| p.average_mrr_delta < 0)) {
        report.insights.push(insights::top_downgrade(top));
    }

    if let Some(plan) = funnel
        .iter()
        .find(|f| f.churn_rate > thresholds.high_churn_rate_percent)
    {
        report.insights.push(insights::high_churn_plan(
            plan,
            thresholds.churn_attribution_days,
        ));
    }

    for path in plan_changes() {
        if let Some(point) = low_conversion(path, thresholds) {
            report.friction_points.push(point);
        }
        if let Some(point) = slow_migration(path, thresholds) {
            report.friction_points.push(point);
        }
    }

    report
}

/// Highest-count path; the earliest one wins ties
fn most_common<'a>(paths: impl Iterator<Item = &'a MigrationPath>) -> Option<&'a MigrationPath> {
    paths.fold(None, |best, path| match best {
        Some(best) if best.count >= path.count => Some(best),
        _ => Some(path),
    })
}

fn low_conversion(path: &MigrationPath, t: &AnalysisThresholds) -> Option<FrictionPoint> {
    let rate = path.conversion_rate?;
    if path.count <= t.low_conversion_min_count || rate >= t.low_conversion_percent {
        return None;
    }

    let severity = if rate < t.low_conversion_high_percent {
        FrictionSeverity::High
    } else if rate < t.low_conversion_medium_percent {
        FrictionSeverity::Medium
    } else {
        FrictionSeverity::Low
    };

    Some(FrictionPoint {
        from_plan: path.from_label().to_string(),
        to_plan: path.to_plan.clone(),
        kind: FrictionKind::LowConversion,
        severity,
        count: path.count,
        conversion_rate: Some(rate),
        average_days_to_migrate: path.average_days_to_migrate,
        description: insights::low_conversion(path, rate),
    })
}

fn slow_migration(path: &MigrationPath, t: &AnalysisThresholds) -> Option<FrictionPoint> {
    let days = path.average_days_to_migrate?;
    if path.count <= t.slow_migration_min_count || days <= t.slow_migration_days {
        return None;
    }

    let severity = if days > t.very_slow_migration_days {
        FrictionSeverity::High
    } else {
        FrictionSeverity::Medium
    };

    Some(FrictionPoint {
        from_plan: path.from_label().to_string(),
        to_plan: path.to_plan.clone(),
        kind: FrictionKind::SlowMigration,
        severity,
        count: path.count,
        conversion_rate: path.conversion_rate,
        average_days_to_migrate: Some(days),
        description: insights::slow_migration(path, days),
    })
}
