//! Core data models for famledger
//!
//! This module contains the data structures of the expense domain: users,
//! families, expenses, recurring templates and budgets.

pub mod budget;
pub mod expense;
pub mod family;
pub mod ids;
pub mod money;
pub mod recurrence;
pub mod recurring;
pub mod split;
pub mod user;

pub use budget::{Budget, BudgetOwner, BudgetSignal};
pub use expense::{ApprovalStatus, Expense, ExpenseKind, OriginalAmount};
pub use family::{Family, FamilyMember};
pub use ids::{BudgetId, ExpenseId, FamilyId, RecurringId, UserId};
pub use money::Money;
pub use recurrence::RecurrencePattern;
pub use recurring::RecurringTemplate;
pub use split::{Share, SplitConfig, SplitType};
pub use user::User;
