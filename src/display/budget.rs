//! Budget display formatting

use crate::models::Budget;

use super::fit;

const BAR_WIDTH: usize = 20;

/// A fixed-width usage bar, capped at full
fn usage_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64) as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn status_label(budget: &Budget) -> &'static str {
    if !budget.is_active {
        "Inactive"
    } else if budget.is_exceeded() {
        "OVER"
    } else if budget.percent_used() >= f64::from(budget.alert_threshold) {
        "Alert"
    } else {
        ""
    }
}

/// Format budgets with their usage
pub fn format_budget_list(budgets: &[Budget]) -> String {
    if budgets.is_empty() {
        return "No budgets found.".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<12}  {:<16}  {:>10}  {:>10}  {:>10}  {:<22}  {:>6}  {}\n",
        "ID", "Category", "Limit", "Spent", "Remaining", "Usage", "%", "Status"
    ));
    output.push_str(&format!(
        "{:-<12}  {:-<16}  {:->10}  {:->10}  {:->10}  {:-<22}  {:->6}  {:-<8}\n",
        "", "", "", "", "", "", "", ""
    ));

    for budget in budgets {
        let percent = budget.percent_used();
        output.push_str(&format!(
            "{:<12}  {}  {:>10}  {:>10}  {:>10}  {}  {:>5.1}%  {}\n",
            budget.id.to_string(),
            fit(&budget.category, 16),
            budget.limit.to_string(),
            budget.spent.to_string(),
            budget.remaining().to_string(),
            usage_bar(percent),
            percent,
            status_label(budget),
        ));
    }

    output
}

pub fn format_budget_details(budget: &Budget, date_format: &str) -> String {
    let mut output = String::new();

    output.push_str(&format!("Budget: {} ({})\n", budget.category, budget.id));
    output.push_str(&format!("  Owner:      {}\n", budget.owner));
    output.push_str(&format!("  Period:     {}\n", budget.period));
    output.push_str(&format!(
        "  Window:     {} to {}\n",
        budget.window_start.format(date_format),
        budget.window_end.format(date_format)
    ));
    output.push_str(&format!("  Limit:      {}\n", budget.limit));
    output.push_str(&format!("  Spent:      {}\n", budget.spent));
    output.push_str(&format!("  Remaining:  {}\n", budget.remaining()));
    output.push_str(&format!(
        "  Usage:      {} {:.1}%\n",
        usage_bar(budget.percent_used()),
        budget.percent_used()
    ));
    output.push_str(&format!(
        "  Alert at:   {}%{}\n",
        budget.alert_threshold,
        if budget.alert_sent { " (sent)" } else { "" }
    ));
    output.push_str(&format!(
        "  Rollover:   {}\n",
        if budget.rollover { "Yes" } else { "No" }
    ));
    if let Some(reset) = budget.last_reset {
        output.push_str(&format!("  Last reset: {}\n", reset.format(date_format)));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BudgetOwner, Money, RecurrencePattern, UserId};
    use chrono::{TimeZone, Utc};

    fn budget(limit: i64, spent: i64) -> Budget {
        let mut budget = Budget::new(
            BudgetOwner::User(UserId::new()),
            "Dining",
            Money::from_cents(limit),
            RecurrencePattern::Monthly,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        budget.spent = Money::from_cents(spent);
        budget
    }

    #[test]
    fn test_usage_bar_caps_at_full() {
        assert_eq!(usage_bar(50.0), format!("[{}{}]", "#".repeat(10), ".".repeat(10)));
        assert_eq!(usage_bar(250.0), format!("[{}]", "#".repeat(20)));
    }

    #[test]
    fn test_list_flags_over_budget() {
        let output = format_budget_list(&[budget(10_000, 12_000)]);
        assert!(output.contains("OVER"));
        assert!(output.contains("120.0%"));
    }

    #[test]
    fn test_details_show_window() {
        let output = format_budget_details(&budget(10_000, 0), "%Y-%m-%d");
        assert!(output.contains("2025-01-01 to 2025-02-01"));
    }
}
