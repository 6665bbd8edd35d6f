//! Budget model
//!
//! A budget caps spending in one category for a user or a family over a
//! rolling window. The counters here are pure; persisting them is the
//! caller's job.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{BudgetId, FamilyId, UserId};
use super::money::Money;
use super::recurrence::RecurrencePattern;
use crate::error::LedgerError;

/// Who a budget belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum BudgetOwner {
    User(UserId),
    Family(FamilyId),
}

impl fmt::Display for BudgetOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "{}", id),
            Self::Family(id) => write!(f, "{}", id),
        }
    }
}

/// What changed when an expense was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BudgetSignal {
    /// The alert threshold was crossed and no alert had been sent yet
    pub alert_triggered: bool,
    /// Spending is over the limit after this expense
    pub exceeded: bool,
    /// Spending went over the limit with this expense
    pub newly_exceeded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub owner: BudgetOwner,
    pub category: String,
    pub limit: Money,
    #[serde(default)]
    pub spent: Money,
    pub period: RecurrencePattern,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(default)]
    pub last_reset: Option<DateTime<Utc>>,
    /// Percent of the limit at which an alert is raised
    pub alert_threshold: u8,
    #[serde(default)]
    pub alert_sent: bool,
    #[serde(default)]
    pub rollover: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Budget {
    /// Create a budget whose first window starts at `start`
    pub fn new(
        owner: BudgetOwner,
        category: impl Into<String>,
        limit: Money,
        period: RecurrencePattern,
        start: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let now = Utc::now();
        Ok(Self {
            id: BudgetId::new(),
            owner,
            category: category.into(),
            limit,
            spent: Money::zero(),
            period,
            window_start: start,
            window_end: period.advance(start)?,
            last_reset: None,
            alert_threshold: 80,
            alert_sent: false,
            rollover: false,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn percent_used(&self) -> f64 {
        self.spent.percent_of(self.limit)
    }

    /// Strictly over the limit; spending exactly the limit is not exceeded
    pub fn is_exceeded(&self) -> bool {
        self.spent > self.limit
    }

    pub fn remaining(&self) -> Money {
        (self.limit - self.spent).non_negative()
    }

    /// Whether an alert is due but has not been sent
    pub fn should_alert(&self) -> bool {
        !self.alert_sent && self.percent_used() >= f64::from(self.alert_threshold)
    }

    /// Whether a date falls inside the current window
    pub fn window_contains(&self, date: NaiveDate) -> bool {
        date >= self.window_start.date_naive() && date < self.window_end.date_naive()
    }

    /// Add spending and report newly raised flags
    ///
    /// Leaves the budget untouched when the new total would overflow.
    pub fn apply_expense(&mut self, amount: Money) -> Result<BudgetSignal, LedgerError> {
        let spent = self.spent.checked_add(amount).ok_or_else(|| {
            LedgerError::Validation(format!(
                "Adding {} to budget {} would overflow its spent total",
                amount, self.id
            ))
        })?;
        let was_exceeded = self.is_exceeded();
        self.spent = spent;

        let alert_triggered = self.should_alert();
        if alert_triggered {
            self.alert_sent = true;
        }

        let exceeded = self.is_exceeded();
        self.updated_at = Utc::now();

        Ok(BudgetSignal {
            alert_triggered,
            exceeded,
            newly_exceeded: exceeded && !was_exceeded,
        })
    }

    /// Start a new window if the current one has ended at `as_of`
    ///
    /// With rollover, the unspent remainder is added to the limit first.
    /// Returns whether a reset happened.
    pub fn reset_if_due(&mut self, as_of: DateTime<Utc>) -> Result<bool, LedgerError> {
        if as_of < self.window_end {
            return Ok(false);
        }

        let window_end = self.period.advance(as_of)?;
        if self.rollover {
            self.limit = self.limit.checked_add(self.remaining()).ok_or_else(|| {
                LedgerError::Validation(format!(
                    "Rolling over budget {} would overflow its limit",
                    self.id
                ))
            })?;
        }
        self.spent = Money::zero();
        self.alert_sent = false;
        self.last_reset = Some(as_of);
        self.window_start = as_of;
        self.window_end = window_end;
        self.updated_at = as_of;
        Ok(true)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.limit.is_negative() {
            return Err(LedgerError::Validation(
                "Budget limit must be non-negative".into(),
            ));
        }
        if self.alert_threshold > 100 {
            return Err(LedgerError::Validation(
                "Alert threshold must be between 0 and 100".into(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(LedgerError::Validation("Category is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn budget(limit: i64, spent: i64, threshold: u8) -> Budget {
        let mut budget = Budget::new(
            BudgetOwner::User(UserId::new()),
            "Dining",
            Money::from_units(limit),
            RecurrencePattern::Monthly,
            at(2025, 1, 1),
        )
        .unwrap();
        budget.spent = Money::from_units(spent);
        budget.alert_threshold = threshold;
        budget
    }

    #[test]
    fn test_window_follows_period() {
        let budget = budget(100, 0, 80);
        assert_eq!(budget.window_end, at(2025, 2, 1));
        assert!(budget.window_contains(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()));
        assert!(!budget.window_contains(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
    }

    #[test]
    fn test_alert_reported_once() {
        let mut budget = budget(100, 70, 75);

        let signal = budget.apply_expense(Money::from_units(10)).unwrap();
        assert!(signal.alert_triggered);
        assert!(budget.alert_sent);
        assert_eq!(budget.spent, Money::from_units(80));

        let signal = budget.apply_expense(Money::from_units(5)).unwrap();
        assert!(!signal.alert_triggered);
        assert!(budget.alert_sent);
    }

    #[test]
    fn test_below_threshold_no_alert() {
        let mut budget = budget(100, 10, 75);
        let signal = budget.apply_expense(Money::from_units(10)).unwrap();
        assert_eq!(signal, BudgetSignal::default());
        assert!(!budget.alert_sent);
    }

    #[test]
    fn test_exceeded_is_strict() {
        let mut budget = budget(100, 90, 100);
        let signal = budget.apply_expense(Money::from_units(10)).unwrap();
        assert!(!budget.is_exceeded());
        assert!(!signal.exceeded);

        let signal = budget.apply_expense(Money::from_cents(1)).unwrap();
        assert!(signal.exceeded);
        assert!(signal.newly_exceeded);

        let signal = budget.apply_expense(Money::from_cents(1)).unwrap();
        assert!(signal.exceeded);
        assert!(!signal.newly_exceeded);
    }

    #[test]
    fn test_overflowing_spend_is_rejected() {
        let mut budget = budget(100, 0, 80);
        budget.apply_expense(Money::from_cents(i64::MAX)).unwrap();
        let before = budget.clone();

        let err = budget.apply_expense(Money::from_cents(1)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(budget.spent, before.spent);
        assert_eq!(budget.alert_sent, before.alert_sent);
    }

    #[test]
    fn test_percent_used_zero_limit() {
        let budget = budget(0, 50, 80);
        assert_eq!(budget.percent_used(), 0.0);
        assert!(budget.is_exceeded());
        assert_eq!(budget.remaining(), Money::zero());
    }

    #[test]
    fn test_reset_with_rollover() {
        let mut budget = budget(100, 40, 80);
        budget.rollover = true;
        budget.alert_sent = true;

        let reset = budget.reset_if_due(at(2025, 2, 1)).unwrap();
        assert!(reset);
        assert_eq!(budget.limit, Money::from_units(160));
        assert_eq!(budget.spent, Money::zero());
        assert!(!budget.alert_sent);
        assert_eq!(budget.window_start, at(2025, 2, 1));
        assert_eq!(budget.window_end, at(2025, 3, 1));
        assert_eq!(budget.last_reset, Some(at(2025, 2, 1)));
    }

    #[test]
    fn test_reset_without_rollover_keeps_limit() {
        let mut budget = budget(100, 130, 80);
        assert!(budget.reset_if_due(at(2025, 2, 10)).unwrap());
        assert_eq!(budget.limit, Money::from_units(100));
        assert_eq!(budget.window_end, at(2025, 3, 10));
    }

    #[test]
    fn test_overspent_rollover_adds_nothing() {
        let mut budget = budget(100, 130, 80);
        budget.rollover = true;
        budget.reset_if_due(at(2025, 2, 1)).unwrap();
        assert_eq!(budget.limit, Money::from_units(100));
    }

    #[test]
    fn test_reset_not_due() {
        let mut budget = budget(100, 40, 80);
        assert!(!budget.reset_if_due(at(2025, 1, 31)).unwrap());
        assert_eq!(budget.spent, Money::from_units(40));
    }

    #[test]
    fn test_validate_negative_limit() {
        let mut budget = budget(100, 0, 80);
        budget.limit = Money::from_cents(-1);
        assert!(budget.validate().unwrap_err().is_validation());

        budget.limit = Money::from_units(1);
        budget.alert_threshold = 101;
        assert!(budget.validate().is_err());
    }
}
