//! Budget repository for JSON storage
//!
//! Spending is only ever added through [`BudgetRepository::increment_spent`],
//! which does the read-modify-write under the write lock. Resets and edits
//! use the version-checked [`BudgetRepository::update_if_version`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::LedgerError;
use crate::models::{Budget, BudgetId, BudgetOwner, BudgetSignal, Money};

use super::file_io::{read_json, write_json_atomic};
use super::matches_short_id;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct BudgetData {
    #[serde(default)]
    budgets: Vec<Budget>,
}

pub struct BudgetRepository {
    path: PathBuf,
    budgets: RwLock<HashMap<BudgetId, Budget>>,
}

impl BudgetRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            budgets: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> Result<(), LedgerError> {
        let file_data: BudgetData = read_json(&self.path)?;

        let mut budgets = self
            .budgets
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        budgets.clear();
        for budget in file_data.budgets {
            budgets.insert(budget.id, budget);
        }

        Ok(())
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let budgets = self
            .budgets
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut budget_list: Vec<_> = budgets.values().cloned().collect();
        budget_list.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        write_json_atomic(
            &self.path,
            &BudgetData {
                budgets: budget_list,
            },
        )
    }

    pub fn get(&self, id: BudgetId) -> Result<Option<Budget>, LedgerError> {
        let budgets = self
            .budgets
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(budgets.get(&id).cloned())
    }

    /// Look a budget up by full or short id
    pub fn resolve(&self, query: &str) -> Result<Option<Budget>, LedgerError> {
        let budgets = self
            .budgets
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        if let Ok(id) = BudgetId::parse(query) {
            return Ok(budgets.get(&id).cloned());
        }

        Ok(budgets
            .values()
            .find(|b| matches_short_id(&b.id.to_string(), query))
            .cloned())
    }

    /// The active budget for an owner and category
    pub fn active_for(
        &self,
        owner: &BudgetOwner,
        category: &str,
    ) -> Result<Option<Budget>, LedgerError> {
        let budgets = self
            .budgets
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(budgets
            .values()
            .find(|b| b.is_active && &b.owner == owner && same_category(&b.category, category))
            .cloned())
    }

    /// Active budgets an expense on `date` in `category` counts against
    pub fn matching(
        &self,
        owner: &BudgetOwner,
        category: &str,
        date: NaiveDate,
    ) -> Result<Vec<Budget>, LedgerError> {
        let budgets = self
            .budgets
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(budgets
            .values()
            .filter(|b| {
                b.is_active
                    && &b.owner == owner
                    && same_category(&b.category, category)
                    && b.window_contains(date)
            })
            .cloned()
            .collect())
    }

    pub fn for_owner(&self, owner: &BudgetOwner) -> Result<Vec<Budget>, LedgerError> {
        let budgets = self
            .budgets
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut list: Vec<_> = budgets
            .values()
            .filter(|b| b.is_active && &b.owner == owner)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(list)
    }

    /// Active budgets whose window has ended at `as_of`
    pub fn needing_reset(&self, as_of: DateTime<Utc>) -> Result<Vec<Budget>, LedgerError> {
        let budgets = self
            .budgets
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut list: Vec<_> = budgets
            .values()
            .filter(|b| b.is_active && as_of >= b.window_end)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.window_end.cmp(&b.window_end));
        Ok(list)
    }

    pub fn insert(&self, budget: Budget) -> Result<(), LedgerError> {
        let mut budgets = self
            .budgets
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        if budgets.contains_key(&budget.id) {
            return Err(LedgerError::Duplicate {
                entity_type: "Budget",
                identifier: budget.id.to_string(),
            });
        }

        budgets.insert(budget.id, budget);
        Ok(())
    }

    /// Replace a budget if nobody changed it since `expected` was read
    pub fn update_if_version(&self, mut budget: Budget, expected: u64) -> Result<Budget, LedgerError> {
        let mut budgets = self
            .budgets
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        let found = budgets
            .get(&budget.id)
            .map(|b| b.version)
            .ok_or_else(|| LedgerError::budget_not_found(budget.id.to_string()))?;
        if found != expected {
            return Err(LedgerError::Conflict {
                entity_type: "Budget",
                identifier: budget.id.to_string(),
                expected,
                found,
            });
        }

        budget.version = expected + 1;
        budgets.insert(budget.id, budget.clone());
        Ok(budget)
    }

    /// Add spending atomically and return the updated budget with its signal
    pub fn increment_spent(
        &self,
        id: BudgetId,
        amount: Money,
    ) -> Result<(Budget, BudgetSignal), LedgerError> {
        let mut budgets = self
            .budgets
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        let budget = budgets
            .get_mut(&id)
            .ok_or_else(|| LedgerError::budget_not_found(id.to_string()))?;

        let signal = budget.apply_expense(amount)?;
        budget.version += 1;
        Ok((budget.clone(), signal))
    }
}

/// Categories compare case-insensitively
pub(crate) fn same_category(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
