//! Expense model
//!
//! An expense is either entered directly or materialized from a recurring
//! template. Materialized expenses carry the template's amount, category and
//! split by value, so later template edits never rewrite history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ExpenseId, FamilyId, RecurringId, UserId};
use super::money::Money;
use super::recurrence::RecurrencePattern;
use super::split::SplitConfig;
use crate::error::LedgerError;

/// Whether an expense belongs to one person or to the family pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseKind {
    #[default]
    Personal,
    Family,
}

impl fmt::Display for ExpenseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Personal => write!(f, "personal"),
            Self::Family => write!(f, "family"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    #[default]
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// The amount as entered, when it was not in the base currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalAmount {
    pub currency: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub user_id: UserId,
    #[serde(default)]
    pub family_id: Option<FamilyId>,
    pub paid_by: UserId,
    #[serde(default)]
    pub kind: ExpenseKind,

    /// Amount in the base currency
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<OriginalAmount>,

    pub category: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub tags: Vec<String>,

    /// Template this expense was materialized from
    #[serde(default)]
    pub recurring_id: Option<RecurringId>,
    #[serde(default)]
    pub recurrence_pattern: Option<RecurrencePattern>,
    /// The template's due time this expense fulfils
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,

    #[serde(default)]
    pub approval: ApprovalStatus,
    #[serde(default)]
    pub approved_by: Option<UserId>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,

    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: Option<UserId>,

    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Create a personal, approved expense paid by `user_id`
    pub fn new(user_id: UserId, amount: Money, category: impl Into<String>, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: ExpenseId::new(),
            user_id,
            family_id: None,
            paid_by: user_id,
            kind: ExpenseKind::Personal,
            amount,
            original: None,
            category: category.into(),
            date,
            description: String::new(),
            split: SplitConfig::default(),
            tags: Vec::new(),
            recurring_id: None,
            recurrence_pattern: None,
            scheduled_for: None,
            approval: ApprovalStatus::Approved,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this expense counts toward totals and budgets
    pub fn counts_toward_spending(&self) -> bool {
        self.approval == ApprovalStatus::Approved && !self.is_deleted
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring_id.is_some()
    }

    pub fn approve(&mut self, approver: UserId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_pending()?;
        self.approval = ApprovalStatus::Approved;
        self.approved_by = Some(approver);
        self.approved_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn reject(
        &mut self,
        approver: UserId,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.ensure_pending()?;
        self.approval = ApprovalStatus::Rejected;
        self.approved_by = Some(approver);
        self.approved_at = Some(at);
        self.rejection_reason = Some(reason.into());
        self.updated_at = at;
        Ok(())
    }

    pub fn soft_delete(&mut self, by: UserId, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(by);
        self.updated_at = at;
    }

    fn ensure_pending(&self) -> Result<(), LedgerError> {
        if self.is_deleted {
            return Err(LedgerError::Validation(format!(
                "Expense {} has been deleted",
                self.id
            )));
        }
        if self.approval != ApprovalStatus::Pending {
            return Err(LedgerError::Validation(format!(
                "Expense {} is already {}",
                self.id,
                self.approval.to_string().to_lowercase()
            )));
        }
        Ok(())
    }

    /// Validate the record before it is stored
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::Validation(
                "Expense amount must be greater than zero".into(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(LedgerError::Validation("Category is required".into()));
        }
        if self.kind == ExpenseKind::Family && self.family_id.is_none() {
            return Err(LedgerError::Validation(
                "A family expense needs a family".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Expense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.date, self.category, self.amount)
    }
}
