//! Budget service
//!
//! Creates budgets, feeds approved spending into them and rolls their
//! windows over. The counters themselves live on [`Budget`]; this layer
//! persists them and turns newly raised flags into notifications.

use chrono::{DateTime, Utc};

use crate::audit::EntityType;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Budget, BudgetId, BudgetOwner, BudgetSignal, Expense, ExpenseKind, Money, RecurrencePattern,
};
use crate::notify::{dispatch, Notification, Notifier};
use crate::storage::Storage;

/// Input for a new budget
#[derive(Debug, Clone)]
pub struct NewBudget {
    pub owner: BudgetOwner,
    pub category: String,
    pub limit: Money,
    pub period: RecurrencePattern,
    /// Start of the first window
    pub start: DateTime<Utc>,
    pub alert_threshold: u8,
    pub rollover: bool,
}

/// A budget after spending was applied to it
#[derive(Debug, Clone)]
pub struct BudgetApplication {
    pub budget: Budget,
    pub signal: BudgetSignal,
}

/// What a reset pass did
#[derive(Debug, Clone, Default)]
pub struct ResetReport {
    pub reset: Vec<Budget>,
    /// Changed by someone else during the pass
    pub skipped: Vec<BudgetId>,
    pub failed: Vec<(BudgetId, String)>,
}

pub struct BudgetService<'a> {
    storage: &'a Storage,
    notifier: &'a dyn Notifier,
}

impl<'a> BudgetService<'a> {
    pub fn new(storage: &'a Storage, notifier: &'a dyn Notifier) -> Self {
        Self { storage, notifier }
    }

    /// Create a budget, superseding any active one for the same owner and category
    pub fn create(&self, input: NewBudget) -> LedgerResult<Budget> {
        self.ensure_owner_exists(&input.owner)?;

        let category = input.category.trim().to_string();
        let mut budget = Budget::new(input.owner, category, input.limit, input.period, input.start)?;
        budget.alert_threshold = input.alert_threshold;
        budget.rollover = input.rollover;
        budget.validate()?;

        if let Some(previous) = self.storage.budgets.active_for(&budget.owner, &budget.category)? {
            let mut retired = previous.clone();
            retired.is_active = false;
            retired.updated_at = Utc::now();
            let retired = self
                .storage
                .budgets
                .update_if_version(retired, previous.version)?;
            self.storage.log_update(
                EntityType::Budget,
                retired.id.to_string(),
                Some(retired.category.clone()),
                &previous,
                &retired,
            )?;
            tracing::info!(old = %previous.id, new = %budget.id, "budget superseded");
        }

        self.storage.budgets.insert(budget.clone())?;
        self.storage.budgets.save()?;

        self.storage.log_create(
            EntityType::Budget,
            budget.id.to_string(),
            Some(budget.category.clone()),
            &budget,
        )?;

        Ok(budget)
    }

    pub fn get(&self, id: BudgetId) -> LedgerResult<Budget> {
        self.storage
            .budgets
            .get(id)?
            .ok_or_else(|| LedgerError::budget_not_found(id.to_string()))
    }

    /// Find a budget by full or short id
    pub fn find(&self, query: &str) -> LedgerResult<Budget> {
        self.storage
            .budgets
            .resolve(query)?
            .ok_or_else(|| LedgerError::budget_not_found(query))
    }

    pub fn list(&self, owner: &BudgetOwner) -> LedgerResult<Vec<Budget>> {
        self.storage.budgets.for_owner(owner)
    }

    /// Add spending to one budget and notify on newly raised flags
    pub fn apply_expense(&self, budget_id: BudgetId, amount: Money) -> LedgerResult<BudgetApplication> {
        if amount.is_negative() {
            return Err(LedgerError::Validation(
                "Cannot apply a negative amount to a budget".into(),
            ));
        }

        let (budget, signal) = self.storage.budgets.increment_spent(budget_id, amount)?;
        self.storage.budgets.save()?;

        tracing::debug!(
            budget = %budget.id,
            spent = %budget.spent,
            limit = %budget.limit,
            "applied spending"
        );
        self.notify_signal(&budget, signal)?;

        Ok(BudgetApplication { budget, signal })
    }

    /// Apply an expense to every budget it counts against
    ///
    /// Only approved, non-deleted expenses count. A personal expense matches
    /// its user's budgets and a family expense its family's, in the same
    /// category, with a window containing the expense date.
    pub fn apply_to_matching(&self, expense: &Expense) -> LedgerResult<Vec<BudgetApplication>> {
        if !expense.counts_toward_spending() {
            return Ok(Vec::new());
        }

        let owner = match (expense.kind, expense.family_id) {
            (ExpenseKind::Family, Some(family_id)) => BudgetOwner::Family(family_id),
            _ => BudgetOwner::User(expense.user_id),
        };

        let mut applied = Vec::new();
        for budget in self
            .storage
            .budgets
            .matching(&owner, &expense.category, expense.date)?
        {
            match self.apply_expense(budget.id, expense.amount) {
                Ok(application) => applied.push(application),
                Err(e) if e.is_not_found() => {
                    tracing::warn!(budget = %budget.id, expense = %expense.id, "budget vanished, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(applied)
    }

    /// Start a new window for every active budget whose window has ended
    pub fn reset_due(&self, as_of: DateTime<Utc>) -> LedgerResult<ResetReport> {
        let mut report = ResetReport::default();

        for before in self.storage.budgets.needing_reset(as_of)? {
            let mut budget = before.clone();
            if let Err(e) = budget.reset_if_due(as_of) {
                report.failed.push((before.id, e.to_string()));
                continue;
            }

            match self.storage.budgets.update_if_version(budget, before.version) {
                Ok(budget) => {
                    self.storage.log_update(
                        EntityType::Budget,
                        budget.id.to_string(),
                        Some(budget.category.clone()),
                        &before,
                        &budget,
                    )?;
                    report.reset.push(budget);
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    tracing::info!(budget = %before.id, "budget changed during reset, skipping");
                    report.skipped.push(before.id);
                }
                Err(e) => report.failed.push((before.id, e.to_string())),
            }
        }

        if !report.reset.is_empty() {
            self.storage.budgets.save()?;
        }
        tracing::info!(
            reset = report.reset.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "budget reset pass finished"
        );
        Ok(report)
    }

    /// Active budgets of an owner, most used first
    pub fn utilization(&self, owner: &BudgetOwner) -> LedgerResult<Vec<Budget>> {
        let mut budgets = self.storage.budgets.for_owner(owner)?;
        budgets.sort_by(|a, b| b.percent_used().total_cmp(&a.percent_used()));
        Ok(budgets)
    }

    pub fn deactivate(&self, id: BudgetId) -> LedgerResult<Budget> {
        let before = self.get(id)?;
        if !before.is_active {
            return Ok(before);
        }

        let mut budget = before.clone();
        budget.is_active = false;
        budget.updated_at = Utc::now();
        let budget = self.storage.budgets.update_if_version(budget, before.version)?;
        self.storage.budgets.save()?;

        self.storage.log_update(
            EntityType::Budget,
            budget.id.to_string(),
            Some(budget.category.clone()),
            &before,
            &budget,
        )?;

        Ok(budget)
    }

    fn ensure_owner_exists(&self, owner: &BudgetOwner) -> LedgerResult<()> {
        match owner {
            BudgetOwner::User(id) => {
                self.storage
                    .users
                    .get(*id)?
                    .ok_or_else(|| LedgerError::user_not_found(id.to_string()))?;
            }
            BudgetOwner::Family(id) => {
                self.storage
                    .families
                    .get(*id)?
                    .ok_or_else(|| LedgerError::family_not_found(id.to_string()))?;
            }
        }
        Ok(())
    }

    fn notify_signal(&self, budget: &Budget, signal: BudgetSignal) -> LedgerResult<()> {
        if !signal.alert_triggered && !signal.newly_exceeded {
            return Ok(());
        }

        // Personal budgets honour the owner's alert preference
        if let BudgetOwner::User(user_id) = budget.owner {
            if let Some(user) = self.storage.users.get(user_id)? {
                if !user.budget_alerts {
                    return Ok(());
                }
            }
        }

        if signal.alert_triggered {
            dispatch(
                self.notifier,
                Notification::BudgetAlert {
                    budget_id: budget.id,
                    owner: budget.owner,
                    category: budget.category.clone(),
                    percent_used: budget.percent_used(),
                    threshold: budget.alert_threshold,
                },
            );
        }
        if signal.newly_exceeded {
            dispatch(
                self.notifier,
                Notification::BudgetExceeded {
                    budget_id: budget.id,
                    owner: budget.owner,
                    category: budget.category.clone(),
                    spent: budget.spent,
                    limit: budget.limit,
                },
            );
        }
        Ok(())
    }
}
