//! Recurring expense template model
//!
//! A template describes an obligation that repeats on a [`RecurrencePattern`].
//! The engine turns each due occurrence into a concrete [`Expense`] and then
//! advances the template. Deactivation by the engine is terminal; the record
//! stays around for history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::expense::{ApprovalStatus, Expense, ExpenseKind};
use super::ids::{FamilyId, RecurringId, UserId};
use super::money::Money;
use super::recurrence::RecurrencePattern;
use super::split::SplitConfig;
use crate::error::LedgerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub id: RecurringId,
    pub user_id: UserId,
    #[serde(default)]
    pub family_id: Option<FamilyId>,
    pub paid_by: UserId,
    #[serde(default)]
    pub kind: ExpenseKind,
    pub amount: Money,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub pattern: RecurrencePattern,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub next_occurrence: DateTime<Utc>,
    #[serde(default)]
    pub last_processed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default = "default_true")]
    pub auto_approve: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub occurrence_count: u32,
    #[serde(default)]
    pub max_occurrences: Option<u32>,
    /// Bumped on every stored update; conditional updates compare it
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl RecurringTemplate {
    /// Create a personal template whose first occurrence is `start_date`
    pub fn new(
        user_id: UserId,
        amount: Money,
        category: impl Into<String>,
        pattern: RecurrencePattern,
        start_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecurringId::new(),
            user_id,
            family_id: None,
            paid_by: user_id,
            kind: ExpenseKind::Personal,
            amount,
            category: category.into(),
            description: String::new(),
            pattern,
            start_date,
            end_date: None,
            next_occurrence: start_date,
            last_processed: None,
            split: SplitConfig::default(),
            auto_approve: true,
            is_active: true,
            occurrence_count: 0,
            max_occurrences: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The occurrence after the current one
    ///
    /// Applies the pattern to the later of `start_date` and `next_occurrence`.
    pub fn compute_next_occurrence(&self) -> Result<DateTime<Utc>, LedgerError> {
        let current = self.next_occurrence.max(self.start_date);
        self.pattern.advance(current)
    }

    /// Active and due at `as_of`
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.is_active && self.next_occurrence <= as_of
    }

    /// Whether the occurrence cap or end date has been reached
    pub fn is_exhausted(&self) -> bool {
        let capped = self
            .max_occurrences
            .is_some_and(|max| self.occurrence_count >= max);
        let ended = self.end_date.is_some_and(|end| self.next_occurrence > end);
        capped || ended
    }

    /// Build the expense for the current occurrence, processed at `as_of`
    ///
    /// The expense is dated at processing time; `scheduled_for` records which
    /// occurrence it fulfils.
    pub fn materialize(&self, as_of: DateTime<Utc>) -> Result<Expense, LedgerError> {
        let split = self.split.normalized(self.amount)?;

        let mut expense = Expense::new(self.user_id, self.amount, self.category.clone(), as_of.date_naive());
        expense.family_id = self.family_id;
        expense.paid_by = self.paid_by;
        expense.kind = self.kind;
        expense.description = self.description.clone();
        expense.split = split;
        expense.recurring_id = Some(self.id);
        expense.recurrence_pattern = Some(self.pattern);
        expense.scheduled_for = Some(self.next_occurrence);
        expense.approval = if self.auto_approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        };
        expense.created_at = as_of;
        expense.updated_at = as_of;

        expense.validate()?;
        Ok(expense)
    }

    /// Record one processed occurrence and move to the next one
    pub fn advance(&mut self, as_of: DateTime<Utc>) -> Result<(), LedgerError> {
        let next = self.compute_next_occurrence()?;
        self.last_processed = Some(as_of);
        self.occurrence_count += 1;
        self.next_occurrence = next;
        if self.is_exhausted() {
            self.is_active = false;
        }
        self.updated_at = as_of;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::Validation(
                "Recurring amount must be greater than zero".into(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(LedgerError::Validation("Category is required".into()));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(LedgerError::Validation(
                    "End date cannot be before the start date".into(),
                ));
            }
        }
        if self.max_occurrences == Some(0) {
            return Err(LedgerError::Validation(
                "Maximum occurrences must be at least 1".into(),
            ));
        }
        if self.kind == ExpenseKind::Family && self.family_id.is_none() {
            return Err(LedgerError::Validation(
                "A family recurring expense needs a family".into(),
            ));
        }
        self.split.normalized(self.amount)?;
        Ok(())
    }
}
