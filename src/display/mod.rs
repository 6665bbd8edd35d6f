//! Display formatting for terminal output
//!
//! Plain-text tables and detail views. Every formatter returns a `String`;
//! printing is left to the CLI handlers.

pub mod budget;
pub mod expense;
pub mod family;
pub mod recurring;

pub use budget::{format_budget_details, format_budget_list};
pub use expense::{format_expense_details, format_expense_list, format_summary};
pub use family::{format_family, format_user_list};
pub use recurring::{format_outcomes, format_stats, format_template_list, format_upcoming};

/// Pad or cut `text` to exactly `width` characters
pub(crate) fn fit(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        format!("{}{}", text, " ".repeat(width - count))
    } else if width > 3 {
        let head: String = text.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        text.chars().take(width).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit() {
        assert_eq!(fit("Rent", 6), "Rent  ");
        assert_eq!(fit("Groceries and more", 10), "Groceri...");
        assert_eq!(fit("Café", 4), "Café");
    }
}
