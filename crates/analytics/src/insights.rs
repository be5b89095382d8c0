//! Narrative strings for dashboard insights
//!
//! Pure templating. Thresholds and selection live in `friction`.

use crate::plan_migrations::{div_round_half_away, MigrationPath, PlanFunnelStat};

/// Whole currency units from cents, rounded half away from zero
pub fn whole_units(cents: i64) -> i64 {
    div_round_half_away(cents, 100)
}

/// `$1,234` style amount with no sign
pub fn format_amount(cents: i64) -> String {
    let units = whole_units(cents).unsigned_abs().to_string();
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${}", grouped)
}

pub fn top_upgrade(path: &MigrationPath) -> String {
    format!(
        "Most common upgrade: {} → {} ({} customers, +{}/mo avg)",
        path.from_label(),
        path.to_plan,
        path.count,
        format_amount(path.average_mrr_delta)
    )
}

pub fn top_downgrade(path: &MigrationPath) -> String {
    format!(
        "Most common downgrade: {} → {} ({} customers, -{}/mo avg)",
        path.from_label(),
        path.to_plan,
        path.count,
        format_amount(path.average_mrr_delta)
    )
}

pub fn high_churn_plan(stat: &PlanFunnelStat, attribution_days: i64) -> String {
    format!(
        "{} has a {:.0}% churn rate within {} days of a plan change ({} of {} customers)",
        stat.plan, stat.churn_rate, attribution_days, stat.churn_count, stat.total_customers
    )
}

pub fn low_conversion(path: &MigrationPath, rate: f64) -> String {
    format!(
        "Only {:.1}% of {} customers who change plans move to {}",
        rate,
        path.from_label(),
        path.to_plan
    )
}

pub fn slow_migration(path: &MigrationPath, days: f64) -> String {
    format!(
        "Customers take {:.0} days on average to move from {} to {}",
        days,
        path.from_label(),
        path.to_plan
    )
}
