//! Expense display formatting

use std::collections::HashMap;

use crate::models::{ApprovalStatus, Expense, UserId};
use crate::services::ExpenseSummary;

use super::fit;

/// Format expenses as a table, newest first as given
pub fn format_expense_list(expenses: &[Expense], date_format: &str) -> String {
    if expenses.is_empty() {
        return "No expenses found.".to_string();
    }

    let category_width = expenses
        .iter()
        .map(|e| e.category.chars().count())
        .max()
        .unwrap_or(8)
        .clamp(8, 20);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<12}  {:<10}  {:<category_width$}  {:>12}  {:<8}  {}\n",
        "ID",
        "Date",
        "Category",
        "Amount",
        "Status",
        "Description",
        category_width = category_width,
    ));
    output.push_str(&format!(
        "{:-<12}  {:-<10}  {:-<category_width$}  {:->12}  {:-<8}  {:-<20}\n",
        "",
        "",
        "",
        "",
        "",
        "",
        category_width = category_width,
    ));

    for expense in expenses {
        let mut description = expense.description.clone();
        if expense.is_recurring() {
            description = format!("(recurring) {}", description);
        }
        output.push_str(&format!(
            "{:<12}  {:<10}  {}  {:>12}  {:<8}  {}\n",
            expense.id.to_string(),
            expense.date.format(date_format).to_string(),
            fit(&expense.category, category_width),
            expense.amount.to_string(),
            status_label(expense),
            description.trim_end(),
        ));
    }

    output
}

fn status_label(expense: &Expense) -> &'static str {
    if expense.is_deleted {
        return "Deleted";
    }
    match expense.approval {
        ApprovalStatus::Approved => "",
        ApprovalStatus::Pending => "Pending",
        ApprovalStatus::Rejected => "Rejected",
    }
}

/// Format a single expense's details
pub fn format_expense_details(expense: &Expense, date_format: &str) -> String {
    let mut output = String::new();

    output.push_str(&format!("Expense: {}\n", expense.id));
    output.push_str(&format!("  Date:      {}\n", expense.date.format(date_format)));
    output.push_str(&format!("  Category:  {}\n", expense.category));
    output.push_str(&format!("  Amount:    {}\n", expense.amount));
    if let Some(original) = &expense.original {
        output.push_str(&format!(
            "  Entered:   {} {}\n",
            original.amount, original.currency
        ));
    }
    output.push_str(&format!("  Kind:      {}\n", expense.kind));
    output.push_str(&format!("  Status:    {}\n", expense.approval));
    if let Some(reason) = &expense.rejection_reason {
        output.push_str(&format!("  Reason:    {}\n", reason));
    }
    if !expense.description.is_empty() {
        output.push_str(&format!("  Note:      {}\n", expense.description));
    }
    if !expense.split.shares.is_empty() {
        output.push_str(&format!("  Split ({}):\n", expense.split.split_type));
        for share in &expense.split.shares {
            output.push_str(&format!(
                "    {}  {:>10}{}\n",
                share.user_id,
                share.amount.to_string(),
                if share.is_paid { "  paid" } else { "" }
            ));
        }
    }
    if let Some(scheduled) = expense.scheduled_for {
        output.push_str(&format!(
            "  Occurrence: {}\n",
            scheduled.format(&format!("{} %H:%M UTC", date_format))
        ));
    }

    output
}

/// Format the dashboard summary; `names` maps payers to display names
pub fn format_summary(summary: &ExpenseSummary, names: &HashMap<UserId, String>) -> String {
    if summary.count == 0 && summary.pending_count == 0 {
        return "No expenses to summarize.".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Total: {} across {} expense(s)\n",
        summary.total, summary.count
    ));
    if summary.pending_count > 0 {
        output.push_str(&format!(
            "{} expense(s) awaiting approval\n",
            summary.pending_count
        ));
    }

    if !summary.by_category.is_empty() {
        output.push_str(&format!(
            "\n{:<20}  {:>12}  {:>5}  {:>10}  {:>6}\n",
            "Category", "Total", "Count", "Average", "Share"
        ));
        output.push_str(&format!(
            "{:-<20}  {:->12}  {:->5}  {:->10}  {:->6}\n",
            "", "", "", "", ""
        ));
        for row in &summary.by_category {
            output.push_str(&format!(
                "{}  {:>12}  {:>5}  {:>10}  {:>5.1}%\n",
                fit(&row.category, 20),
                row.total.to_string(),
                row.count,
                row.average.to_string(),
                row.total.percent_of(summary.total),
            ));
        }
    }

    if !summary.by_payer.is_empty() {
        output.push_str("\nBy payer:\n");
        for (user_id, total) in &summary.by_payer {
            let name = names
                .get(user_id)
                .cloned()
                .unwrap_or_else(|| user_id.to_string());
            output.push_str(&format!("  {}  {:>12}\n", fit(&name, 20), total.to_string()));
        }
    }

    output
}
