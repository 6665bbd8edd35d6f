//! Expense service
//!
//! Entry, approval and querying of expenses. Currency conversion happens
//! here, once, on the way in: stored amounts are always in the base
//! currency.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};

use crate::audit::EntityType;
use crate::config::Settings;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    ApprovalStatus, Expense, ExpenseId, ExpenseKind, FamilyId, Money, OriginalAmount, Share,
    SplitConfig, SplitType, UserId,
};
use crate::notify::{dispatch, Notification, Notifier};
use crate::storage::budgets::same_category;
use crate::storage::Storage;

use super::budget::BudgetService;
use super::family::FamilyService;

/// Input for a new expense
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub user_id: UserId,
    pub kind: ExpenseKind,
    /// Defaults to the user's family for family expenses
    pub family_id: Option<FamilyId>,
    /// Defaults to `user_id`
    pub paid_by: Option<UserId>,
    pub amount: Money,
    /// Currency the amount was entered in; `None` means the base currency
    pub currency: Option<String>,
    pub category: String,
    pub date: NaiveDate,
    pub description: String,
    pub split: SplitConfig,
    pub tags: Vec<String>,
    /// Family expenses wait for another member's approval
    pub requires_approval: bool,
}

impl NewExpense {
    /// A personal expense in the base currency with no split
    pub fn personal(user_id: UserId, amount: Money, category: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id,
            kind: ExpenseKind::Personal,
            family_id: None,
            paid_by: None,
            amount,
            currency: None,
            category: category.into(),
            date,
            description: String::new(),
            split: SplitConfig::full(),
            tags: Vec::new(),
            requires_approval: false,
        }
    }
}

/// Criteria for listing and summarizing expenses
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub user_id: Option<UserId>,
    pub family_id: Option<FamilyId>,
    pub category: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub approval: Option<ApprovalStatus>,
    pub include_deleted: bool,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        if expense.is_deleted && !self.include_deleted {
            return false;
        }
        if self.user_id.is_some_and(|u| expense.user_id != u) {
            return false;
        }
        if self.family_id.is_some() && expense.family_id != self.family_id {
            return false;
        }
        if let Some(category) = &self.category {
            if !same_category(&expense.category, category) {
                return false;
            }
        }
        if self.from.is_some_and(|from| expense.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| expense.date > to) {
            return false;
        }
        if self.approval.is_some_and(|a| expense.approval != a) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Money,
    pub count: usize,
    pub average: Money,
}

/// Dashboard aggregate over approved, non-deleted expenses
#[derive(Debug, Clone, Default)]
pub struct ExpenseSummary {
    pub total: Money,
    pub count: usize,
    /// Sorted by total, largest first
    pub by_category: Vec<CategoryTotal>,
    /// Sorted by total, largest first
    pub by_payer: Vec<(UserId, Money)>,
    pub pending_count: usize,
}

pub struct ExpenseService<'a> {
    storage: &'a Storage,
    settings: &'a Settings,
    notifier: &'a dyn Notifier,
}

impl<'a> ExpenseService<'a> {
    pub fn new(storage: &'a Storage, settings: &'a Settings, notifier: &'a dyn Notifier) -> Self {
        Self {
            storage,
            settings,
            notifier,
        }
    }

    fn budgets(&self) -> BudgetService<'a> {
        BudgetService::new(self.storage, self.notifier)
    }

    fn families(&self) -> FamilyService<'a> {
        FamilyService::new(self.storage)
    }

    /// Record an expense and apply it to budgets if it is approved
    pub fn create(&self, input: NewExpense) -> LedgerResult<Expense> {
        let user = self.families().get_user(input.user_id)?;

        if !input.amount.is_positive() {
            return Err(LedgerError::Validation(
                "Expense amount must be greater than zero".into(),
            ));
        }

        let (amount, original, split) = match input.currency.as_deref() {
            Some(code) if !self.settings.currency.is_base(code) => {
                let amount = self.settings.currency.to_base(input.amount, code)?;
                let split = self.convert_split(&input.split, code, amount)?;
                let original = OriginalAmount {
                    currency: code.trim().to_uppercase(),
                    amount: input.amount,
                };
                (amount, Some(original), split)
            }
            _ => (input.amount, None, input.split.clone()),
        };
        let split = split.normalized(amount)?;

        let paid_by = input.paid_by.unwrap_or(user.id);
        let family_id = match input.kind {
            ExpenseKind::Personal => None,
            ExpenseKind::Family => {
                let family_id = input.family_id.or(user.family_id).ok_or_else(|| {
                    LedgerError::Validation("A family expense needs a family".into())
                })?;
                let families = self.families();
                families.require_member(family_id, user.id)?;
                families.require_member(family_id, paid_by)?;
                for share in &split.shares {
                    families.require_member(family_id, share.user_id)?;
                }
                Some(family_id)
            }
        };

        let mut expense = Expense::new(user.id, amount, input.category.trim(), input.date);
        expense.kind = input.kind;
        expense.family_id = family_id;
        expense.paid_by = paid_by;
        expense.original = original;
        expense.description = input.description.trim().to_string();
        expense.split = split;
        expense.tags = input.tags;
        if input.requires_approval && input.kind == ExpenseKind::Family {
            expense.approval = ApprovalStatus::Pending;
        }
        expense.validate()?;

        self.storage.expenses.insert(expense.clone())?;
        self.storage.expenses.save()?;

        self.storage.log_create(
            EntityType::Expense,
            expense.id.to_string(),
            Some(expense.category.clone()),
            &expense,
        )?;

        self.after_recorded(&expense)?;
        Ok(expense)
    }

    /// Apply a freshly recorded expense to budgets, or ask for approval
    fn after_recorded(&self, expense: &Expense) -> LedgerResult<()> {
        match expense.approval {
            ApprovalStatus::Approved => {
                self.budgets().apply_to_matching(expense)?;
            }
            ApprovalStatus::Pending => dispatch(
                self.notifier,
                Notification::PendingApproval {
                    expense_id: expense.id,
                    family_id: expense.family_id,
                    user_id: expense.user_id,
                    category: expense.category.clone(),
                    amount: expense.amount,
                },
            ),
            ApprovalStatus::Rejected => {}
        }
        Ok(())
    }

    pub fn get(&self, id: ExpenseId) -> LedgerResult<Expense> {
        self.storage
            .expenses
            .get(id)?
            .ok_or_else(|| LedgerError::expense_not_found(id.to_string()))
    }

    /// Find an expense by full or short id
    pub fn find(&self, query: &str) -> LedgerResult<Expense> {
        self.storage
            .expenses
            .resolve(query)?
            .ok_or_else(|| LedgerError::expense_not_found(query))
    }

    /// Approve a pending expense and count it against budgets
    pub fn approve(&self, id: ExpenseId, approver: UserId) -> LedgerResult<Expense> {
        let before = self.get(id)?;
        self.ensure_can_act(&before, approver)?;

        let mut expense = before.clone();
        expense.approve(approver, Utc::now())?;
        let expense = self.store_change(&before, expense)?;

        self.budgets().apply_to_matching(&expense)?;
        Ok(expense)
    }

    pub fn reject(&self, id: ExpenseId, approver: UserId, reason: &str) -> LedgerResult<Expense> {
        let before = self.get(id)?;
        self.ensure_can_act(&before, approver)?;

        let mut expense = before.clone();
        expense.reject(approver, reason.trim(), Utc::now())?;
        self.store_change(&before, expense)
    }

    /// Mark an expense deleted; it drops out of lists and summaries
    ///
    /// Budget counters are not rolled back.
    pub fn soft_delete(&self, id: ExpenseId, by: UserId) -> LedgerResult<Expense> {
        let before = self.get(id)?;
        if before.is_deleted {
            return Err(LedgerError::Validation(format!(
                "Expense {} is already deleted",
                before.id
            )));
        }
        self.ensure_can_act(&before, by)?;

        let mut expense = before.clone();
        expense.soft_delete(by, Utc::now());
        let expense = self
            .storage
            .expenses
            .update_if_version(expense, before.version)?;
        self.storage.expenses.save()?;

        self.storage.log_soft_delete(
            EntityType::Expense,
            expense.id.to_string(),
            Some(expense.category.clone()),
            &before,
            &expense,
        )?;

        Ok(expense)
    }

    /// Settle one participant's share of a split expense
    pub fn mark_split_paid(&self, id: ExpenseId, user_id: UserId) -> LedgerResult<Expense> {
        let before = self.get(id)?;
        let mut expense = before.clone();
        if !expense.split.mark_paid(user_id) {
            return Err(LedgerError::Validation(format!(
                "{} has no share in expense {}",
                user_id, expense.id
            )));
        }
        expense.updated_at = Utc::now();
        self.store_change(&before, expense)
    }

    /// Expenses matching the filter, newest first
    pub fn list(&self, filter: &ExpenseFilter) -> LedgerResult<Vec<Expense>> {
        self.storage.expenses.query(|e| filter.matches(e))
    }

    /// Totals by category and by payer
    pub fn summary(&self, filter: &ExpenseFilter) -> LedgerResult<ExpenseSummary> {
        let expenses = self.list(filter)?;
        let pending_count = expenses
            .iter()
            .filter(|e| e.approval == ApprovalStatus::Pending && !e.is_deleted)
            .count();

        let mut by_category: HashMap<String, (Money, usize)> = HashMap::new();
        let mut by_payer: HashMap<UserId, Money> = HashMap::new();
        let mut summary = ExpenseSummary {
            pending_count,
            ..ExpenseSummary::default()
        };

        for expense in expenses.iter().filter(|e| e.counts_toward_spending()) {
            let entry = by_category
                .entry(expense.category.clone())
                .or_insert((Money::zero(), 0));
            entry.0 += expense.amount;
            entry.1 += 1;
            *by_payer.entry(expense.paid_by).or_insert_with(Money::zero) += expense.amount;
            summary.total += expense.amount;
            summary.count += 1;
        }

        summary.by_category = by_category
            .into_iter()
            .map(|(category, (total, count))| CategoryTotal {
                category,
                total,
                count,
                average: Money::from_cents((total.cents() as f64 / count as f64).round() as i64),
            })
            .collect();
        summary
            .by_category
            .sort_by(|a, b| b.total.cmp(&a.total).then(a.category.cmp(&b.category)));

        summary.by_payer = by_payer.into_iter().collect();
        summary
            .by_payer
            .sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(summary)
    }

    /// Owners act on personal expenses; any member on family ones
    fn ensure_can_act(&self, expense: &Expense, user_id: UserId) -> LedgerResult<()> {
        match (expense.kind, expense.family_id) {
            (ExpenseKind::Family, Some(family_id)) => {
                self.families().require_member(family_id, user_id)
            }
            _ if expense.user_id == user_id => Ok(()),
            _ => Err(LedgerError::Membership(format!(
                "{} cannot change another user's personal expense",
                user_id
            ))),
        }
    }

    fn store_change(&self, before: &Expense, after: Expense) -> LedgerResult<Expense> {
        let expense = self
            .storage
            .expenses
            .update_if_version(after, before.version)?;
        self.storage.expenses.save()?;

        self.storage.log_update(
            EntityType::Expense,
            expense.id.to_string(),
            Some(expense.category.clone()),
            before,
            &expense,
        )?;
        Ok(expense)
    }

    /// Convert custom share amounts so they still sum to the converted total
    fn convert_split(&self, split: &SplitConfig, code: &str, total: Money) -> LedgerResult<SplitConfig> {
        if split.split_type != SplitType::Custom || split.shares.is_empty() {
            return Ok(split.clone());
        }

        let mut shares = split
            .shares
            .iter()
            .map(|share| {
                Ok(Share {
                    amount: self.settings.currency.to_base(share.amount, code)?,
                    ..share.clone()
                })
            })
            .collect::<LedgerResult<Vec<Share>>>()?;

        // Rounding drift goes to the first share
        let converted: Money = shares.iter().map(|s| s.amount).sum();
        shares[0].amount += total - converted;

        Ok(SplitConfig::custom(shares))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::LedgerPaths;
    use crate::models::{BudgetOwner, RecurrencePattern};
    use crate::notify::CollectingNotifier;
    use crate::services::budget::NewBudget;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        storage: Storage,
        settings: Settings,
        notifier: CollectingNotifier,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp.path().to_path_buf());
        Fixture {
            storage: Storage::new(paths).unwrap(),
            settings: Settings::default(),
            notifier: CollectingNotifier::new(),
            _temp: temp,
        }
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn test_create_converts_currency() {
        let fx = fixture();
        let service = ExpenseService::new(&fx.storage, &fx.settings, &fx.notifier);
        let ana = FamilyService::new(&fx.storage)
            .register_user("Ana", "ana@example.com")
            .unwrap();

        let mut input = NewExpense::personal(ana.id, Money::from_cents(9_200), "Travel", date(3, 1));
        input.currency = Some("eur".into());
        let expense = service.create(input).unwrap();

        assert_eq!(expense.amount, Money::from_cents(10_000));
        let original = expense.original.unwrap();
        assert_eq!(original.currency, "EUR");
        assert_eq!(original.amount, Money::from_cents(9_200));
    }

    #[test]
    fn test_unknown_currency_rejected() {
        let fx = fixture();
        let service = ExpenseService::new(&fx.storage, &fx.settings, &fx.notifier);
        let ana = FamilyService::new(&fx.storage)
            .register_user("Ana", "ana@example.com")
            .unwrap();

        let mut input = NewExpense::personal(ana.id, Money::from_cents(100), "Travel", date(3, 1));
        input.currency = Some("XYZ".into());
        assert!(matches!(service.create(input), Err(LedgerError::Currency(_))));
        assert!(service.list(&ExpenseFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_family_expense_requires_membership() {
        let fx = fixture();
        let families = FamilyService::new(&fx.storage);
        let service = ExpenseService::new(&fx.storage, &fx.settings, &fx.notifier);
        let ana = families.register_user("Ana", "ana@example.com").unwrap();
        let ben = families.register_user("Ben", "ben@example.com").unwrap();
        let family = families.create_family("Silva", ana.id).unwrap();

        let mut input = NewExpense::personal(ben.id, Money::from_cents(100), "Food", date(3, 1));
        input.kind = ExpenseKind::Family;
        input.family_id = Some(family.id);
        assert!(matches!(service.create(input), Err(LedgerError::Membership(_))));
    }

    #[test]
    fn test_pending_family_expense_counts_after_approval() {
        let fx = fixture();
        let families = FamilyService::new(&fx.storage);
        let service = ExpenseService::new(&fx.storage, &fx.settings, &fx.notifier);
        let ana = families.register_user("Ana", "ana@example.com").unwrap();
        let ben = families.register_user("Ben", "ben@example.com").unwrap();
        let family = families.create_family("Silva", ana.id).unwrap();
        families.join_family(&family.invite_code, ben.id).unwrap();

        let budget = BudgetService::new(&fx.storage, &fx.notifier)
            .create(NewBudget {
                owner: BudgetOwner::Family(family.id),
                category: "Groceries".into(),
                limit: Money::from_cents(50_000),
                period: RecurrencePattern::Monthly,
                start: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
                alert_threshold: 80,
                rollover: false,
            })
            .unwrap();

        let mut input = NewExpense::personal(ana.id, Money::from_cents(6_000), "Groceries", date(3, 5));
        input.kind = ExpenseKind::Family;
        input.split = SplitConfig::equal(&[ana.id, ben.id]);
        input.requires_approval = true;
        let expense = service.create(input).unwrap();

        assert_eq!(expense.approval, ApprovalStatus::Pending);
        assert_eq!(expense.family_id, Some(family.id));
        assert_eq!(expense.split.shares[1].amount, Money::from_cents(3_000));
        assert!(matches!(
            fx.notifier.take()[0],
            Notification::PendingApproval { .. }
        ));

        let summary = service.summary(&ExpenseFilter::default()).unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.pending_count, 1);

        service.approve(expense.id, ben.id).unwrap();
        let budget = fx.storage.budgets.get(budget.id).unwrap().unwrap();
        assert_eq!(budget.spent, Money::from_cents(6_000));

        // Approving twice is rejected
        assert!(service.approve(expense.id, ben.id).unwrap_err().is_validation());
    }

    #[test]
    fn test_soft_deleted_excluded_from_summary() {
        let fx = fixture();
        let service = ExpenseService::new(&fx.storage, &fx.settings, &fx.notifier);
        let ana = FamilyService::new(&fx.storage)
            .register_user("Ana", "ana@example.com")
            .unwrap();

        let keep = service
            .create(NewExpense::personal(ana.id, Money::from_cents(3_000), "Food", date(3, 1)))
            .unwrap();
        let drop = service
            .create(NewExpense::personal(ana.id, Money::from_cents(5_000), "Food", date(3, 2)))
            .unwrap();
        service
            .create(NewExpense::personal(ana.id, Money::from_cents(1_000), "Fuel", date(3, 3)))
            .unwrap();

        service.soft_delete(drop.id, ana.id).unwrap();

        let summary = service.summary(&ExpenseFilter::default()).unwrap();
        assert_eq!(summary.total, Money::from_cents(4_000));
        assert_eq!(summary.by_category[0].category, "Food");
        assert_eq!(summary.by_category[0].count, 1);
        assert_eq!(summary.by_payer, vec![(ana.id, Money::from_cents(4_000))]);

        let listed = service.list(&ExpenseFilter::default()).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.id != drop.id));
        assert_eq!(listed[1].id, keep.id);
    }

    #[test]
    fn test_other_user_cannot_delete_personal_expense() {
        let fx = fixture();
        let families = FamilyService::new(&fx.storage);
        let service = ExpenseService::new(&fx.storage, &fx.settings, &fx.notifier);
        let ana = families.register_user("Ana", "ana@example.com").unwrap();
        let ben = families.register_user("Ben", "ben@example.com").unwrap();

        let expense = service
            .create(NewExpense::personal(ana.id, Money::from_cents(3_000), "Food", date(3, 1)))
            .unwrap();
        assert!(matches!(
            service.soft_delete(expense.id, ben.id),
            Err(LedgerError::Membership(_))
        ));
    }

    #[test]
    fn test_mark_split_paid() {
        let fx = fixture();
        let service = ExpenseService::new(&fx.storage, &fx.settings, &fx.notifier);
        let ana = FamilyService::new(&fx.storage)
            .register_user("Ana", "ana@example.com")
            .unwrap();
        let friend = UserId::new();

        let mut input = NewExpense::personal(ana.id, Money::from_cents(1_000), "Food", date(3, 1));
        input.split = SplitConfig::custom(vec![
            Share::new(ana.id, Money::from_cents(400)),
            Share::new(friend, Money::from_cents(600)),
        ]);
        let expense = service.create(input).unwrap();

        let paid = service.mark_split_paid(expense.id, friend).unwrap();
        assert_eq!(paid.split.pending_amount(), Money::from_cents(400));
        assert!(service.mark_split_paid(expense.id, UserId::new()).is_err());
    }
}
