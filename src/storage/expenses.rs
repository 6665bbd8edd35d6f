//! Expense repository for JSON storage

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::LedgerError;
use crate::models::{Expense, ExpenseId, RecurringId};

use super::file_io::{read_json, write_json_atomic};
use super::matches_short_id;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct ExpenseData {
    #[serde(default)]
    expenses: Vec<Expense>,
}

pub struct ExpenseRepository {
    path: PathBuf,
    expenses: RwLock<HashMap<ExpenseId, Expense>>,
}

impl ExpenseRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            expenses: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> Result<(), LedgerError> {
        let file_data: ExpenseData = read_json(&self.path)?;

        let mut expenses = self.write_guard()?;
        expenses.clear();
        for expense in file_data.expenses {
            expenses.insert(expense.id, expense);
        }

        Ok(())
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let expenses = self
            .expenses
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut expense_list: Vec<_> = expenses.values().cloned().collect();
        expense_list.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));

        write_json_atomic(
            &self.path,
            &ExpenseData {
                expenses: expense_list,
            },
        )
    }

    /// Exclusive access for multi-collection commits in [`super::Storage`]
    pub(crate) fn write_guard(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<ExpenseId, Expense>>, LedgerError> {
        self.expenses
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))
    }

    pub fn get(&self, id: ExpenseId) -> Result<Option<Expense>, LedgerError> {
        let expenses = self
            .expenses
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(expenses.get(&id).cloned())
    }

    /// Look an expense up by full or short id
    pub fn resolve(&self, query: &str) -> Result<Option<Expense>, LedgerError> {
        let expenses = self
            .expenses
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        if let Ok(id) = ExpenseId::parse(query) {
            return Ok(expenses.get(&id).cloned());
        }

        Ok(expenses
            .values()
            .find(|e| matches_short_id(&e.id.to_string(), query))
            .cloned())
    }

    /// The expense materialized for one occurrence of a template
    pub fn find_occurrence(
        &self,
        recurring_id: RecurringId,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<Expense>, LedgerError> {
        let expenses = self
            .expenses
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(expenses
            .values()
            .find(|e| is_occurrence(e, recurring_id, scheduled_for))
            .cloned())
    }

    /// Expenses matching a predicate, newest first
    pub fn query<F>(&self, predicate: F) -> Result<Vec<Expense>, LedgerError>
    where
        F: Fn(&Expense) -> bool,
    {
        let expenses = self
            .expenses
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut list: Vec<_> = expenses.values().filter(|e| predicate(e)).cloned().collect();
        list.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(list)
    }

    pub fn count(&self) -> Result<usize, LedgerError> {
        let expenses = self
            .expenses
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(expenses.len())
    }

    pub fn insert(&self, expense: Expense) -> Result<(), LedgerError> {
        let mut expenses = self.write_guard()?;

        if expenses.contains_key(&expense.id) {
            return Err(LedgerError::Duplicate {
                entity_type: "Expense",
                identifier: expense.id.to_string(),
            });
        }

        expenses.insert(expense.id, expense);
        Ok(())
    }

    /// Replace an expense if nobody changed it since `expected` was read
    pub fn update_if_version(
        &self,
        mut expense: Expense,
        expected: u64,
    ) -> Result<Expense, LedgerError> {
        let mut expenses = self.write_guard()?;

        let found = expenses
            .get(&expense.id)
            .map(|e| e.version)
            .ok_or_else(|| LedgerError::expense_not_found(expense.id.to_string()))?;
        if found != expected {
            return Err(LedgerError::Conflict {
                entity_type: "Expense",
                identifier: expense.id.to_string(),
                expected,
                found,
            });
        }

        expense.version = expected + 1;
        expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }
}

pub(crate) fn is_occurrence(
    expense: &Expense,
    recurring_id: RecurringId,
    scheduled_for: DateTime<Utc>,
) -> bool {
    expense.recurring_id == Some(recurring_id) && expense.scheduled_for == Some(scheduled_for)
}
