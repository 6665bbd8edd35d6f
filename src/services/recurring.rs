//! Recurring expense engine
//!
//! Templates describe expenses that repeat on a daily, weekly, monthly or
//! yearly cadence. [`RecurringService::process_due`] is what a scheduler
//! runs: every template due at the given instant produces exactly one
//! expense for its current occurrence and moves on to the next one.
//!
//! Each occurrence is identified by `(recurring_id, scheduled_for)`. The
//! expense and the advanced template are committed together through
//! [`Storage::commit_occurrence`], which refuses stale template versions, so
//! overlapping passes cannot materialize the same occurrence twice.

use chrono::{DateTime, Duration, Utc};

use crate::audit::EntityType;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    ApprovalStatus, Expense, ExpenseId, ExpenseKind, FamilyId, Money, RecurrencePattern,
    RecurringId, RecurringTemplate, SplitConfig, UserId,
};
use crate::notify::{dispatch, Notification, Notifier};
use crate::storage::{OccurrenceCommit, Storage};

use super::budget::BudgetService;
use super::family::FamilyService;

/// Input for a new recurring template
#[derive(Debug, Clone)]
pub struct NewRecurring {
    pub user_id: UserId,
    pub kind: ExpenseKind,
    /// Defaults to the user's family for family templates
    pub family_id: Option<FamilyId>,
    pub paid_by: Option<UserId>,
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub pattern: RecurrencePattern,
    /// First occurrence
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_occurrences: Option<u32>,
    pub split: SplitConfig,
    pub auto_approve: bool,
}

impl NewRecurring {
    pub fn personal(
        user_id: UserId,
        amount: Money,
        category: impl Into<String>,
        pattern: RecurrencePattern,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            kind: ExpenseKind::Personal,
            family_id: None,
            paid_by: None,
            amount,
            category: category.into(),
            description: String::new(),
            pattern,
            start_date,
            end_date: None,
            max_occurrences: None,
            split: SplitConfig::full(),
            auto_approve: true,
        }
    }
}

/// Edits to a template; `None` leaves a field alone
///
/// Expenses already materialized keep their own copies and are unaffected.
#[derive(Debug, Clone, Default)]
pub struct RecurringChanges {
    pub amount: Option<Money>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub pattern: Option<RecurrencePattern>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub max_occurrences: Option<Option<u32>>,
    pub split: Option<SplitConfig>,
    pub auto_approve: Option<bool>,
}

/// What happened to one template during a processing pass
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Materialized {
        template_id: RecurringId,
        expense_id: ExpenseId,
        scheduled_for: DateTime<Utc>,
        /// The expense already existed from an interrupted pass
        recovered: bool,
    },
    /// Already handled by a concurrent pass
    Skipped {
        template_id: RecurringId,
        reason: String,
    },
    /// The template disappeared between listing and processing
    Missing { template_id: RecurringId },
    Failed {
        template_id: RecurringId,
        error: String,
    },
}

impl ProcessOutcome {
    pub fn template_id(&self) -> RecurringId {
        match self {
            Self::Materialized { template_id, .. }
            | Self::Skipped { template_id, .. }
            | Self::Missing { template_id }
            | Self::Failed { template_id, .. } => *template_id,
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized { .. })
    }
}

/// The next occurrence of an active template within a preview horizon
#[derive(Debug, Clone)]
pub struct UpcomingOccurrence {
    pub template: RecurringTemplate,
    pub due: DateTime<Utc>,
    /// Whole days from the reference time, rounded up; zero or less if overdue
    pub days_until: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RecurringStats {
    pub active_count: usize,
    pub inactive_count: usize,
    /// Sum of active templates normalized to one month
    pub monthly_total: Money,
    /// Monthly equivalents by category, largest first
    pub by_category: Vec<(String, Money)>,
}

pub struct RecurringService<'a> {
    storage: &'a Storage,
    notifier: &'a dyn Notifier,
}

impl<'a> RecurringService<'a> {
    pub fn new(storage: &'a Storage, notifier: &'a dyn Notifier) -> Self {
        Self { storage, notifier }
    }

    /// Validate and store a new template; its first occurrence is `start_date`
    pub fn create(&self, input: NewRecurring) -> LedgerResult<RecurringTemplate> {
        let families = FamilyService::new(self.storage);
        let user = families.get_user(input.user_id)?;

        let mut template = RecurringTemplate::new(
            user.id,
            input.amount,
            input.category.trim(),
            input.pattern,
            input.start_date,
        );
        template.kind = input.kind;
        template.paid_by = input.paid_by.unwrap_or(user.id);
        template.description = input.description.trim().to_string();
        template.end_date = input.end_date;
        template.max_occurrences = input.max_occurrences;
        template.split = input.split;
        template.auto_approve = input.auto_approve;

        if input.kind == ExpenseKind::Family {
            let family_id = input.family_id.or(user.family_id).ok_or_else(|| {
                LedgerError::Validation("A family recurring expense needs a family".into())
            })?;
            families.require_member(family_id, user.id)?;
            families.require_member(family_id, template.paid_by)?;
            template.family_id = Some(family_id);
        }

        template.validate()?;

        self.storage.recurring.insert(template.clone())?;
        self.storage.recurring.save()?;

        self.storage.log_create(
            EntityType::RecurringExpense,
            template.id.to_string(),
            Some(template.category.clone()),
            &template,
        )?;

        tracing::info!(
            template = %template.id,
            pattern = %template.pattern,
            first = %template.next_occurrence,
            "created recurring expense"
        );
        Ok(template)
    }

    pub fn get(&self, id: RecurringId) -> LedgerResult<RecurringTemplate> {
        self.storage
            .recurring
            .get(id)?
            .ok_or_else(|| LedgerError::template_not_found(id.to_string()))
    }

    /// Find a template by full or short id
    pub fn find(&self, query: &str) -> LedgerResult<RecurringTemplate> {
        self.storage
            .recurring
            .resolve(query)?
            .ok_or_else(|| LedgerError::template_not_found(query))
    }

    pub fn list(&self, user_id: UserId) -> LedgerResult<Vec<RecurringTemplate>> {
        self.storage.recurring.for_user(user_id)
    }

    /// The occurrence following the template's current one
    pub fn compute_next_occurrence(
        &self,
        template: &RecurringTemplate,
    ) -> LedgerResult<DateTime<Utc>> {
        template.compute_next_occurrence()
    }

    /// Active templates due at `as_of`, earliest first
    pub fn find_due(&self, as_of: DateTime<Utc>) -> LedgerResult<Vec<RecurringTemplate>> {
        self.storage.recurring.due(as_of)
    }

    /// Build the expense for a template's current occurrence
    pub fn materialize(
        &self,
        template: &RecurringTemplate,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Expense> {
        template.materialize(as_of)
    }

    /// Record one processed occurrence on the template
    pub fn advance(&self, template: &mut RecurringTemplate, as_of: DateTime<Utc>) -> LedgerResult<()> {
        template.advance(as_of)
    }

    /// Materialize every template due at `as_of`
    ///
    /// Each template yields one outcome; a failure on one template never
    /// stops the others. A template that is still due afterwards (it was
    /// several periods behind) is picked up again by the next pass.
    pub fn process_due(&self, as_of: DateTime<Utc>) -> LedgerResult<Vec<ProcessOutcome>> {
        let due = self.find_due(as_of)?;
        tracing::debug!(count = due.len(), %as_of, "processing due recurring expenses");

        let outcomes: Vec<ProcessOutcome> = due
            .iter()
            .map(|template| self.process_one(template.id, as_of))
            .collect();

        let materialized = outcomes.iter().filter(|o| o.is_materialized()).count();
        tracing::info!(
            due = due.len(),
            materialized,
            "recurring pass finished"
        );
        Ok(outcomes)
    }

    fn process_one(&self, template_id: RecurringId, as_of: DateTime<Utc>) -> ProcessOutcome {
        let template = match self.storage.recurring.get(template_id) {
            Ok(Some(template)) => template,
            Ok(None) => {
                tracing::warn!(template = %template_id, "recurring expense vanished before processing");
                return ProcessOutcome::Missing { template_id };
            }
            Err(e) => return failed(template_id, e),
        };

        // Re-read state decides: another pass may have advanced it already
        if !template.is_due(as_of) {
            return ProcessOutcome::Skipped {
                template_id,
                reason: "no longer due".into(),
            };
        }

        let expense = match template.materialize(as_of) {
            Ok(expense) => expense,
            Err(e) => return failed(template_id, e),
        };
        let mut advanced = template.clone();
        if let Err(e) = advanced.advance(as_of) {
            return failed(template_id, e);
        }

        match self
            .storage
            .commit_occurrence(expense, advanced, template.version)
        {
            Ok(commit) => {
                self.after_commit(&template, &commit);
                ProcessOutcome::Materialized {
                    template_id,
                    expense_id: commit.expense.id,
                    scheduled_for: template.next_occurrence,
                    recovered: commit.recovered,
                }
            }
            Err(e) if e.is_conflict() => {
                tracing::info!(template = %template_id, "occurrence already handled by another pass");
                ProcessOutcome::Skipped {
                    template_id,
                    reason: e.to_string(),
                }
            }
            Err(e) if e.is_not_found() => ProcessOutcome::Missing { template_id },
            Err(e) => failed(template_id, e),
        }
    }

    /// Audit, budget and notification work once an occurrence is stored
    ///
    /// The occurrence is already durable here, so problems are logged only.
    fn after_commit(&self, before: &RecurringTemplate, commit: &OccurrenceCommit) {
        let expense = &commit.expense;
        let template = &commit.template;

        if let Err(e) = self.storage.log_update(
            EntityType::RecurringExpense,
            template.id.to_string(),
            Some(template.category.clone()),
            before,
            template,
        ) {
            tracing::warn!(error = %e, template = %template.id, "failed to audit template advance");
        }

        if !template.is_active {
            tracing::info!(
                template = %template.id,
                occurrences = template.occurrence_count,
                "recurring expense finished"
            );
        }

        // A recovered expense was handled by the pass that created it
        if commit.recovered {
            return;
        }

        if let Err(e) = self.storage.log_create(
            EntityType::Expense,
            expense.id.to_string(),
            Some(expense.category.clone()),
            expense,
        ) {
            tracing::warn!(error = %e, expense = %expense.id, "failed to audit materialized expense");
        }

        match expense.approval {
            ApprovalStatus::Approved => {
                if let Err(e) = BudgetService::new(self.storage, self.notifier).apply_to_matching(expense) {
                    tracing::warn!(error = %e, expense = %expense.id, "failed to apply expense to budgets");
                }
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
    }

    /// Edit a template without touching expenses already materialized
    pub fn update(&self, id: RecurringId, changes: RecurringChanges) -> LedgerResult<RecurringTemplate> {
        let before = self.get(id)?;
        let mut template = before.clone();

        if let Some(amount) = changes.amount {
            template.amount = amount;
        }
        if let Some(category) = changes.category {
            template.category = category.trim().to_string();
        }
        if let Some(description) = changes.description {
            template.description = description.trim().to_string();
        }
        if let Some(pattern) = changes.pattern {
            template.pattern = pattern;
        }
        if let Some(end_date) = changes.end_date {
            template.end_date = end_date;
        }
        if let Some(max_occurrences) = changes.max_occurrences {
            template.max_occurrences = max_occurrences;
        }
        if let Some(split) = changes.split {
            template.split = split;
        }
        if let Some(auto_approve) = changes.auto_approve {
            template.auto_approve = auto_approve;
        }

        template.validate()?;
        if template.is_exhausted() {
            template.is_active = false;
        }
        template.updated_at = Utc::now();

        self.store_change(&before, template)
    }

    pub fn deactivate(&self, id: RecurringId) -> LedgerResult<RecurringTemplate> {
        let before = self.get(id)?;
        let mut template = before.clone();
        template.is_active = false;
        template.updated_at = Utc::now();
        self.store_change(&before, template)
    }

    /// Resume a paused template; finished ones stay finished
    pub fn activate(&self, id: RecurringId) -> LedgerResult<RecurringTemplate> {
        let before = self.get(id)?;
        if before.is_exhausted() {
            return Err(LedgerError::Validation(format!(
                "{} has reached its end and cannot be reactivated",
                before.id
            )));
        }
        let mut template = before.clone();
        template.is_active = true;
        template.updated_at = Utc::now();
        self.store_change(&before, template)
    }

    /// Next occurrence of each active template due within `days` of `as_of`
    pub fn preview_upcoming(
        &self,
        user_id: UserId,
        days: u32,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Vec<UpcomingOccurrence>> {
        let horizon = as_of + Duration::days(i64::from(days));

        let mut upcoming: Vec<_> = self
            .list(user_id)?
            .into_iter()
            .filter(|t| t.is_active && t.next_occurrence <= horizon)
            .map(|template| UpcomingOccurrence {
                due: template.next_occurrence,
                days_until: days_until(as_of, template.next_occurrence),
                template,
            })
            .collect();
        upcoming.sort_by(|a, b| a.due.cmp(&b.due));
        Ok(upcoming)
    }

    /// Counts and monthly-equivalent totals of a user's templates
    pub fn statistics(&self, user_id: UserId) -> LedgerResult<RecurringStats> {
        let templates = self.list(user_id)?;
        let mut stats = RecurringStats::default();
        let mut by_category: Vec<(String, Money)> = Vec::new();

        for template in &templates {
            if !template.is_active {
                stats.inactive_count += 1;
                continue;
            }
            stats.active_count += 1;

            let monthly = Money::from_cents(
                (template.amount.cents() as f64 * template.pattern.monthly_factor()).round() as i64,
            );
            stats.monthly_total += monthly;
            match by_category
                .iter_mut()
                .find(|(category, _)| category.eq_ignore_ascii_case(&template.category))
            {
                Some((_, total)) => *total += monthly,
                None => by_category.push((template.category.clone(), monthly)),
            }
        }

        by_category.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        stats.by_category = by_category;
        Ok(stats)
    }

    fn store_change(
        &self,
        before: &RecurringTemplate,
        after: RecurringTemplate,
    ) -> LedgerResult<RecurringTemplate> {
        let template = self
            .storage
            .recurring
            .update_if_version(after, before.version)?;
        self.storage.recurring.save()?;

        self.storage.log_update(
            EntityType::RecurringExpense,
            template.id.to_string(),
            Some(template.category.clone()),
            before,
            &template,
        )?;
        Ok(template)
    }
}

fn failed(template_id: RecurringId, error: LedgerError) -> ProcessOutcome {
    tracing::warn!(template = %template_id, %error, "failed to process recurring expense");
    ProcessOutcome::Failed {
        template_id,
        error: error.to_string(),
    }
}

/// Whole days from `from` until `to`, rounded up
fn days_until(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    const DAY: i64 = 24 * 60 * 60;
    let seconds = (to - from).num_seconds();
    seconds.div_euclid(DAY) + i64::from(seconds.rem_euclid(DAY) > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::LedgerPaths;
    use crate::models::{BudgetOwner, Share};
    use crate::notify::CollectingNotifier;
    use crate::services::budget::NewBudget;
    use crate::services::expense::{ExpenseFilter, ExpenseService};
    use crate::config::Settings;
    use chrono::{NaiveDate, TimeZone};
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, Storage) {
        let temp_dir = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp_dir.path().to_path_buf());
        let storage = Storage::new(paths).unwrap();
        (temp_dir, storage)
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn add_user(storage: &Storage) -> UserId {
        FamilyService::new(storage)
            .register_user("Ana", "ana@example.com")
            .unwrap()
            .id
    }

    fn expenses_of(storage: &Storage, template_id: RecurringId) -> Vec<Expense> {
        storage
            .expenses
            .query(|e| e.recurring_id == Some(template_id))
            .unwrap()
    }

    #[test]
    fn test_max_occurrences_stops_after_three() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let mut input = NewRecurring::personal(
            user,
            Money::from_cents(500),
            "Coffee",
            RecurrencePattern::Daily,
            at(2025, 1, 1),
        );
        input.max_occurrences = Some(3);
        let template = service.create(input).unwrap();

        for day in 1..=6 {
            service.process_due(at(2025, 1, day)).unwrap();
        }

        let stored = service.get(template.id).unwrap();
        assert_eq!(stored.occurrence_count, 3);
        assert!(!stored.is_active);
        assert_eq!(expenses_of(&storage, template.id).len(), 3);

        // Finished templates cannot be revived
        assert!(service.activate(template.id).unwrap_err().is_validation());
    }

    #[test]
    fn test_processing_twice_materializes_once() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let template = service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(120_000),
                "Rent",
                RecurrencePattern::Monthly,
                at(2025, 1, 1),
            ))
            .unwrap();

        let as_of = at(2025, 1, 1) + Duration::hours(6);
        let first = service.process_due(as_of).unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].is_materialized());

        let second = service.process_due(as_of).unwrap();
        assert!(second.is_empty());

        let expenses = expenses_of(&storage, template.id);
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].scheduled_for, Some(at(2025, 1, 1)));
        assert_eq!(expenses[0].date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(service.get(template.id).unwrap().next_occurrence, at(2025, 2, 1));
    }

    #[test]
    fn test_concurrent_passes_materialize_once() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let user = add_user(&storage);
        let template = RecurringService::new(&storage, &notifier)
            .create(NewRecurring::personal(
                user,
                Money::from_cents(4_999),
                "Internet",
                RecurrencePattern::Monthly,
                at(2025, 1, 1),
            ))
            .unwrap();

        let as_of = at(2025, 1, 1);
        let outcomes: Vec<Vec<ProcessOutcome>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        RecurringService::new(&storage, &notifier)
                            .process_due(as_of)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let materialized = outcomes
            .iter()
            .flatten()
            .filter(|o| o.is_materialized())
            .count();
        assert_eq!(materialized, 1);
        assert_eq!(expenses_of(&storage, template.id).len(), 1);
        assert_eq!(storage.recurring.get(template.id).unwrap().unwrap().occurrence_count, 1);
    }

    #[test]
    fn test_template_edit_leaves_materialized_expenses_alone() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);
        let template = service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(120_000),
                "Rent",
                RecurrencePattern::Monthly,
                at(2025, 1, 1),
            ))
            .unwrap();

        service.process_due(at(2025, 1, 1)).unwrap();
        service
            .update(
                template.id,
                RecurringChanges {
                    amount: Some(Money::from_cents(125_000)),
                    ..RecurringChanges::default()
                },
            )
            .unwrap();
        service.process_due(at(2025, 2, 1)).unwrap();

        let mut amounts: Vec<(DateTime<Utc>, Money)> = expenses_of(&storage, template.id)
            .into_iter()
            .map(|e| (e.scheduled_for.unwrap(), e.amount))
            .collect();
        amounts.sort();
        assert_eq!(
            amounts,
            vec![
                (at(2025, 1, 1), Money::from_cents(120_000)),
                (at(2025, 2, 1), Money::from_cents(125_000)),
            ]
        );
    }

    #[test]
    fn test_month_end_clamps_from_previous_occurrence() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);
        let template = service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(1_000),
                "Gym",
                RecurrencePattern::Monthly,
                at(2025, 1, 31),
            ))
            .unwrap();

        service.process_due(at(2025, 1, 31)).unwrap();
        assert_eq!(service.get(template.id).unwrap().next_occurrence, at(2025, 2, 28));

        service.process_due(at(2025, 2, 28)).unwrap();
        assert_eq!(service.get(template.id).unwrap().next_occurrence, at(2025, 3, 28));
    }

    #[test]
    fn test_catch_up_one_occurrence_per_pass() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);
        let template = service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(2_000),
                "Cleaning",
                RecurrencePattern::Weekly,
                at(2025, 1, 1),
            ))
            .unwrap();

        // Three weeks behind: Jan 1, Jan 8 and Jan 15 are owed
        let as_of = at(2025, 1, 16);
        let mut passes = 0;
        while !service.process_due(as_of).unwrap().is_empty() {
            passes += 1;
        }

        assert_eq!(passes, 3);
        let mut scheduled: Vec<_> = expenses_of(&storage, template.id)
            .into_iter()
            .filter_map(|e| e.scheduled_for)
            .collect();
        scheduled.sort();
        assert_eq!(scheduled, vec![at(2025, 1, 1), at(2025, 1, 8), at(2025, 1, 15)]);
    }

    #[test]
    fn test_end_date_deactivates() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let mut input = NewRecurring::personal(
            user,
            Money::from_cents(1_000),
            "Lessons",
            RecurrencePattern::Weekly,
            at(2025, 1, 1),
        );
        input.end_date = Some(at(2025, 1, 10));
        let template = service.create(input).unwrap();

        service.process_due(at(2025, 1, 1)).unwrap();
        assert!(service.get(template.id).unwrap().is_active);
        service.process_due(at(2025, 1, 8)).unwrap();

        let stored = service.get(template.id).unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.occurrence_count, 2);
        assert!(service.process_due(at(2025, 1, 20)).unwrap().is_empty());
    }

    #[test]
    fn test_bad_split_fails_only_its_template() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let good = service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(1_000),
                "Phone",
                RecurrencePattern::Monthly,
                at(2025, 1, 1),
            ))
            .unwrap();

        // Corrupted after creation: shares no longer match the amount
        let mut broken = RecurringTemplate::new(
            user,
            Money::from_cents(1_000),
            "Streaming",
            RecurrencePattern::Monthly,
            at(2025, 1, 1),
        );
        broken.split = SplitConfig::custom(vec![Share::new(user, Money::from_cents(10))]);
        storage.recurring.insert(broken.clone()).unwrap();

        let outcomes = service.process_due(at(2025, 1, 1)).unwrap();
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            if outcome.template_id() == good.id {
                assert!(outcome.is_materialized());
            } else {
                assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
            }
        }
        assert_eq!(service.get(broken.id).unwrap().occurrence_count, 0);
    }

    #[test]
    fn test_materialized_expense_feeds_budget_and_alerts_once() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let budget = BudgetService::new(&storage, &notifier)
            .create(NewBudget {
                owner: BudgetOwner::User(user),
                category: "Subscriptions".into(),
                limit: Money::from_cents(10_000),
                period: RecurrencePattern::Monthly,
                start: at(2025, 1, 1),
                alert_threshold: 75,
                rollover: false,
            })
            .unwrap();

        for (category, cents) in [("Subscriptions", 7_000), ("Subscriptions", 1_000), ("Subscriptions", 500)] {
            service
                .create(NewRecurring::personal(
                    user,
                    Money::from_cents(cents),
                    category,
                    RecurrencePattern::Monthly,
                    at(2025, 1, 2),
                ))
                .unwrap();
        }
        service.process_due(at(2025, 1, 2)).unwrap();

        let budget = storage.budgets.get(budget.id).unwrap().unwrap();
        assert_eq!(budget.spent, Money::from_cents(8_500));
        assert!(budget.alert_sent);
        let alerts = notifier
            .take()
            .into_iter()
            .filter(|n| matches!(n, Notification::BudgetAlert { .. }))
            .count();
        assert_eq!(alerts, 1);
    }

    #[test]
    fn test_pending_occurrence_waits_for_approval() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let settings = Settings::default();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let mut input = NewRecurring::personal(
            user,
            Money::from_cents(3_000),
            "Allowance",
            RecurrencePattern::Weekly,
            at(2025, 1, 1),
        );
        input.auto_approve = false;
        service.create(input).unwrap();
        service.process_due(at(2025, 1, 1)).unwrap();

        assert!(matches!(
            notifier.take().as_slice(),
            [Notification::PendingApproval { .. }]
        ));
        let pending = ExpenseService::new(&storage, &settings, &notifier)
            .list(&ExpenseFilter {
                approval: Some(ApprovalStatus::Pending),
                ..ExpenseFilter::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_preview_and_statistics() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let rent = service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(120_000),
                "Rent",
                RecurrencePattern::Monthly,
                at(2025, 2, 1),
            ))
            .unwrap();
        service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(1_000),
                "Coffee",
                RecurrencePattern::Weekly,
                at(2025, 1, 20),
            ))
            .unwrap();
        service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(12_000),
                "Insurance",
                RecurrencePattern::Yearly,
                at(2025, 6, 1),
            ))
            .unwrap();

        let as_of = at(2025, 1, 15) + Duration::hours(12);
        let upcoming = service.preview_upcoming(user, 30, as_of).unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].template.category, "Coffee");
        assert_eq!(upcoming[0].days_until, 5);
        assert_eq!(upcoming[1].template.id, rent.id);
        assert_eq!(upcoming[1].days_until, 17);

        let stats = service.statistics(user).unwrap();
        assert_eq!(stats.active_count, 3);
        // 1200.00 + 4 x 10.00 + 120.00 / 12
        assert_eq!(stats.monthly_total, Money::from_cents(125_000));
        assert_eq!(stats.by_category[0].0, "Rent");
    }

    #[test]
    fn test_create_validation() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let zero = NewRecurring::personal(user, Money::zero(), "Rent", RecurrencePattern::Monthly, at(2025, 1, 1));
        assert!(service.create(zero).unwrap_err().is_validation());

        let mut backwards =
            NewRecurring::personal(user, Money::from_cents(100), "Rent", RecurrencePattern::Monthly, at(2025, 1, 1));
        backwards.end_date = Some(at(2024, 12, 1));
        assert!(service.create(backwards).unwrap_err().is_validation());

        let mut family = NewRecurring::personal(user, Money::from_cents(100), "Rent", RecurrencePattern::Monthly, at(2025, 1, 1));
        family.kind = ExpenseKind::Family;
        assert!(service.create(family).unwrap_err().is_validation());

        assert!(storage.recurring.for_user(user).unwrap().is_empty());
    }

    #[test]
    fn test_vanished_template_reported_missing_while_others_run() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);
        for category in ["Rent", "Internet"] {
            service
                .create(NewRecurring::personal(
                    user,
                    Money::from_cents(5_000),
                    category,
                    RecurrencePattern::Monthly,
                    at(2025, 1, 1),
                ))
                .unwrap();
        }

        let as_of = at(2025, 1, 1);
        let due = service.find_due(as_of).unwrap();
        assert_eq!(due.len(), 2);

        // Removed after the due list was taken
        storage.recurring.write_guard().unwrap().remove(&due[0].id);

        let outcomes: Vec<ProcessOutcome> = due
            .iter()
            .map(|template| service.process_one(template.id, as_of))
            .collect();
        assert!(matches!(
            &outcomes[0],
            ProcessOutcome::Missing { template_id } if *template_id == due[0].id
        ));
        assert!(outcomes[1].is_materialized());
        assert_eq!(expenses_of(&storage, due[1].id).len(), 1);
        assert!(expenses_of(&storage, due[0].id).is_empty());

        let unknown = RecurringId::new();
        assert!(matches!(
            service.process_one(unknown, as_of),
            ProcessOutcome::Missing { template_id } if template_id == unknown
        ));
    }

    #[test]
    fn test_failed_save_is_retried_on_next_pass() {
        let (_temp, storage) = create_test_storage();
        let notifier = CollectingNotifier::new();
        let service = RecurringService::new(&storage, &notifier);
        let user = add_user(&storage);

        let budget = BudgetService::new(&storage, &notifier)
            .create(NewBudget {
                owner: BudgetOwner::User(user),
                category: "Rent".into(),
                limit: Money::from_cents(200_000),
                period: RecurrencePattern::Monthly,
                start: at(2025, 1, 1),
                alert_threshold: 80,
                rollover: false,
            })
            .unwrap();
        let template = service
            .create(NewRecurring::personal(
                user,
                Money::from_cents(120_000),
                "Rent",
                RecurrencePattern::Monthly,
                at(2025, 1, 1),
            ))
            .unwrap();

        let blocker = storage.paths().expenses_file();
        if blocker.exists() {
            std::fs::remove_file(&blocker).unwrap();
        }
        std::fs::create_dir(&blocker).unwrap();

        let outcomes = service.process_due(at(2025, 1, 1)).unwrap();
        assert!(matches!(outcomes.as_slice(), [ProcessOutcome::Failed { .. }]));
        let stored = service.get(template.id).unwrap();
        assert_eq!(stored.occurrence_count, 0);
        assert_eq!(stored.next_occurrence, at(2025, 1, 1));
        assert!(expenses_of(&storage, template.id).is_empty());

        std::fs::remove_dir(&blocker).unwrap();
        let outcomes = service.process_due(at(2025, 1, 1)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_materialized());
        assert_eq!(expenses_of(&storage, template.id).len(), 1);
        assert_eq!(
            storage.budgets.get(budget.id).unwrap().unwrap().spent,
            Money::from_cents(120_000)
        );
    }
}
