//! Recurring expense display formatting

use crate::models::RecurringTemplate;
use crate::services::{ProcessOutcome, RecurringStats, UpcomingOccurrence};

use super::fit;

pub fn format_template_list(templates: &[RecurringTemplate], date_format: &str) -> String {
    if templates.is_empty() {
        return "No recurring expenses found.".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<12}  {:<16}  {:>10}  {:<8}  {:<10}  {:>5}  {}\n",
        "ID", "Category", "Amount", "Every", "Next", "Done", "Status"
    ));
    output.push_str(&format!(
        "{:-<12}  {:-<16}  {:->10}  {:-<8}  {:-<10}  {:->5}  {:-<8}\n",
        "", "", "", "", "", "", ""
    ));

    for template in templates {
        let done = match template.max_occurrences {
            Some(max) => format!("{}/{}", template.occurrence_count, max),
            None => template.occurrence_count.to_string(),
        };
        let status = if template.is_active {
            ""
        } else if template.is_exhausted() {
            "Finished"
        } else {
            "Paused"
        };
        output.push_str(&format!(
            "{:<12}  {}  {:>10}  {:<8}  {:<10}  {:>5}  {}\n",
            template.id.to_string(),
            fit(&template.category, 16),
            template.amount.to_string(),
            template.pattern.as_str(),
            template.next_occurrence.format(date_format).to_string(),
            done,
            status,
        ));
    }

    output
}

/// One line per processed template plus a tally
pub fn format_outcomes(outcomes: &[ProcessOutcome], date_format: &str) -> String {
    if outcomes.is_empty() {
        return "Nothing due.".to_string();
    }

    let mut output = String::new();
    let mut materialized = 0;
    for outcome in outcomes {
        let line = match outcome {
            ProcessOutcome::Materialized {
                template_id,
                expense_id,
                scheduled_for,
                recovered,
            } => {
                materialized += 1;
                format!(
                    "  {}  created {} for {}{}",
                    template_id,
                    expense_id,
                    scheduled_for.format(date_format),
                    if *recovered { " (recovered)" } else { "" }
                )
            }
            ProcessOutcome::Skipped {
                template_id,
                reason,
            } => format!("  {}  skipped: {}", template_id, reason),
            ProcessOutcome::Missing { template_id } => {
                format!("  {}  skipped: no longer exists", template_id)
            }
            ProcessOutcome::Failed { template_id, error } => {
                format!("  {}  FAILED: {}", template_id, error)
            }
        };
        output.push_str(&line);
        output.push('\n');
    }
    output.push_str(&format!(
        "Processed {} recurring expense(s), {} created.\n",
        outcomes.len(),
        materialized
    ));

    output
}

pub fn format_upcoming(upcoming: &[UpcomingOccurrence], date_format: &str) -> String {
    if upcoming.is_empty() {
        return "No upcoming recurring expenses.".to_string();
    }

    let mut output = String::new();
    for item in upcoming {
        let when = match item.days_until {
            d if d <= 0 => "due now".to_string(),
            1 => "in 1 day".to_string(),
            d => format!("in {} days", d),
        };
        output.push_str(&format!(
            "  {}  {}  {:>10}  {}\n",
            item.due.format(date_format),
            fit(&item.template.category, 16),
            item.template.amount.to_string(),
            when,
        ));
    }
    output
}

pub fn format_stats(stats: &RecurringStats) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Active: {}  Inactive: {}\n",
        stats.active_count, stats.inactive_count
    ));
    output.push_str(&format!("Monthly equivalent: {}\n", stats.monthly_total));
    for (category, total) in &stats.by_category {
        output.push_str(&format!("  {}  {:>10}\n", fit(category, 16), total.to_string()));
    }
    output
}
