//! Service layer for famledger
//!
//! Services hold the business rules on top of the storage layer: validation,
//! membership checks, cross-entity updates and notifications.

pub mod budget;
pub mod expense;
pub mod family;
pub mod recurring;

pub use budget::{BudgetApplication, BudgetService, NewBudget, ResetReport};
pub use expense::{CategoryTotal, ExpenseFilter, ExpenseService, ExpenseSummary, NewExpense};
pub use family::FamilyService;
pub use recurring::{
    NewRecurring, ProcessOutcome, RecurringChanges, RecurringService, RecurringStats,
    UpcomingOccurrence,
};
