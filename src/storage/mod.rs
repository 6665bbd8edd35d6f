//! Storage layer for famledger
//!
//! Each collection is a JSON file held in memory behind an `RwLock` and
//! written back atomically. [`Storage`] ties the repositories together and
//! owns the audit trail.

pub mod budgets;
pub mod expenses;
pub mod families;
pub mod file_io;
pub mod recurring;
pub mod users;

pub use budgets::BudgetRepository;
pub use expenses::ExpenseRepository;
pub use families::FamilyRepository;
pub use file_io::{read_json, write_json_atomic};
pub use recurring::RecurringRepository;
pub use users::UserRepository;

use serde::Serialize;

use crate::audit::{generate_diff, AuditEntry, AuditLogger, EntityType, Operation};
use crate::config::paths::LedgerPaths;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Expense, RecurringTemplate};

/// Result of committing one recurring occurrence
#[derive(Debug, Clone)]
pub struct OccurrenceCommit {
    pub expense: Expense,
    pub template: RecurringTemplate,
    /// The expense was already stored by an earlier, interrupted pass and
    /// only the template was advanced
    pub recovered: bool,
}

/// Main storage coordinator that provides access to all repositories
pub struct Storage {
    paths: LedgerPaths,
    audit: AuditLogger,
    pub users: UserRepository,
    pub families: FamilyRepository,
    pub expenses: ExpenseRepository,
    pub budgets: BudgetRepository,
    pub recurring: RecurringRepository,
}

impl Storage {
    pub fn new(paths: LedgerPaths) -> Result<Self, LedgerError> {
        paths.ensure_directories()?;

        Ok(Self {
            audit: AuditLogger::new(paths.audit_log()),
            users: UserRepository::new(paths.users_file()),
            families: FamilyRepository::new(paths.families_file()),
            expenses: ExpenseRepository::new(paths.expenses_file()),
            budgets: BudgetRepository::new(paths.budgets_file()),
            recurring: RecurringRepository::new(paths.recurring_file()),
            paths,
        })
    }

    pub fn paths(&self) -> &LedgerPaths {
        &self.paths
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Load all data from disk
    pub fn load_all(&self) -> Result<(), LedgerError> {
        self.users.load()?;
        self.families.load()?;
        self.expenses.load()?;
        self.budgets.load()?;
        self.recurring.load()?;
        Ok(())
    }

    /// Save all data to disk
    pub fn save_all(&self) -> Result<(), LedgerError> {
        self.users.save()?;
        self.families.save()?;
        self.expenses.save()?;
        self.budgets.save()?;
        self.recurring.save()?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.paths.is_initialized()
    }

    /// Store a materialized occurrence and its advanced template together
    ///
    /// Locks the templates and then the expenses. The commit goes through only
    /// if the stored template still has version `expected_version`. If an
    /// expense for the same `(recurring_id, scheduled_for)` already exists, it
    /// is kept and only the template is written.
    pub fn commit_occurrence(
        &self,
        expense: Expense,
        template: RecurringTemplate,
        expected_version: u64,
    ) -> LedgerResult<OccurrenceCommit> {
        let scheduled_for = expense.scheduled_for.ok_or_else(|| {
            LedgerError::Validation("A recurring occurrence needs a scheduled time".into())
        })?;
        if expense.recurring_id != Some(template.id) {
            return Err(LedgerError::Validation(format!(
                "Expense {} does not belong to {}",
                expense.id, template.id
            )));
        }

        let previous: Option<RecurringTemplate>;
        let commit = {
            let mut template_map = self.recurring.write_guard()?;
            let mut expense_map = self.expenses.write_guard()?;

            let found = template_map
                .get(&template.id)
                .map(|t| t.version)
                .ok_or_else(|| LedgerError::template_not_found(template.id.to_string()))?;
            if found != expected_version {
                return Err(LedgerError::Conflict {
                    entity_type: "Recurring expense",
                    identifier: template.id.to_string(),
                    expected: expected_version,
                    found,
                });
            }

            let existing = expense_map
                .values()
                .find(|e| expenses::is_occurrence(e, template.id, scheduled_for))
                .cloned();

            let mut template = template;
            template.version = expected_version + 1;
            previous = template_map.insert(template.id, template.clone());

            match existing {
                Some(expense) => OccurrenceCommit {
                    expense,
                    template,
                    recovered: true,
                },
                None => {
                    expense_map.insert(expense.id, expense.clone());
                    OccurrenceCommit {
                        expense,
                        template,
                        recovered: false,
                    }
                }
            }
        };

        // Expenses first: a crash in between leaves a stale template, which
        // the next pass repairs through the branch above.
        if let Err(e) = self.expenses.save() {
            self.rollback_occurrence(&commit, previous)?;
            return Err(e);
        }
        if let Err(e) = self.recurring.save() {
            self.rollback_occurrence(&commit, previous)?;
            if !commit.recovered {
                // Take the expense back off disk so the retry is a fresh commit
                if let Err(resave) = self.expenses.save() {
                    tracing::warn!(
                        error = %resave,
                        expense = %commit.expense.id,
                        "occurrence left on disk; the next pass will recover it"
                    );
                }
            }
            return Err(e);
        }

        Ok(commit)
    }

    /// Undo the in-memory half of an occurrence whose save failed
    ///
    /// The template is restored only while it still carries this commit's
    /// version, so a later writer is never overwritten.
    fn rollback_occurrence(
        &self,
        commit: &OccurrenceCommit,
        previous: Option<RecurringTemplate>,
    ) -> LedgerResult<()> {
        let mut template_map = self.recurring.write_guard()?;
        let mut expense_map = self.expenses.write_guard()?;

        let still_ours = template_map
            .get(&commit.template.id)
            .is_some_and(|t| t.version == commit.template.version);
        if still_ours {
            if let Some(previous) = previous {
                template_map.insert(previous.id, previous);
            }
            if !commit.recovered {
                expense_map.remove(&commit.expense.id);
            }
        }

        tracing::warn!(
            template = %commit.template.id,
            restored = still_ours,
            "occurrence not saved; rolled back in memory"
        );
        Ok(())
    }

    pub fn log_create<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        entity: &T,
    ) -> LedgerResult<()> {
        self.audit
            .log(&AuditEntry::create(entity_type, entity_id, entity_name, entity))
    }

    pub fn log_update<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        before: &T,
        after: &T,
    ) -> LedgerResult<()> {
        self.log_change(Operation::Update, entity_type, entity_id, entity_name, before, after)
    }

    pub fn log_soft_delete<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        before: &T,
        after: &T,
    ) -> LedgerResult<()> {
        self.log_change(Operation::SoftDelete, entity_type, entity_id, entity_name, before, after)
    }

    fn log_change<T: Serialize>(
        &self,
        operation: Operation,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        before: &T,
        after: &T,
    ) -> LedgerResult<()> {
        let before_json = serde_json::to_value(before)?;
        let after_json = serde_json::to_value(after)?;
        let diff = generate_diff(&before_json, &after_json);

        self.audit.log(&AuditEntry::change(
            operation,
            entity_type,
            entity_id,
            entity_name,
            before,
            after,
            diff,
        ))
    }
}

/// Whether `query` names the id displayed as `display` (`rec-1a2b3c4d`),
/// with or without its prefix
pub(crate) fn matches_short_id(display: &str, query: &str) -> bool {
    let query = query.trim().to_ascii_lowercase();
    if query.is_empty() {
        return false;
    }
    display == query || display.split_once('-').is_some_and(|(_, hex)| hex == query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Money, RecurrencePattern, UserId};
    use chrono::{DateTime, TimeZone, Utc};
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

    fn stored_template(storage: &Storage) -> RecurringTemplate {
        let template = RecurringTemplate::new(
            UserId::new(),
            Money::from_cents(120_000),
            "Rent",
            RecurrencePattern::Monthly,
            at(2025, 1, 1),
        );
        storage.recurring.insert(template.clone()).unwrap();
        template
    }

    fn prepare(template: &RecurringTemplate, as_of: DateTime<Utc>) -> (Expense, RecurringTemplate) {
        let expense = template.materialize(as_of).unwrap();
        let mut next = template.clone();
        next.advance(as_of).unwrap();
        (expense, next)
    }

    #[test]
    fn test_storage_creation() {
        let (temp_dir, storage) = create_test_storage();
        assert!(temp_dir.path().join("data").exists());
        assert!(!storage.is_initialized());
    }

    #[test]
    fn test_commit_occurrence_writes_both_records() {
        let (_temp, storage) = create_test_storage();
        let template = stored_template(&storage);
        let (expense, next) = prepare(&template, at(2025, 1, 1));

        let commit = storage.commit_occurrence(expense, next, 0).unwrap();
        assert!(!commit.recovered);
        assert_eq!(commit.template.version, 1);
        assert_eq!(commit.template.next_occurrence, at(2025, 2, 1));

        // Persisted and reloadable
        storage.load_all().unwrap();
        assert_eq!(storage.expenses.count().unwrap(), 1);
        let reloaded = storage.recurring.get(template.id).unwrap().unwrap();
        assert_eq!(reloaded.occurrence_count, 1);
    }

    #[test]
    fn test_commit_with_stale_version_conflicts() {
        let (_temp, storage) = create_test_storage();
        let template = stored_template(&storage);

        let (first, next) = prepare(&template, at(2025, 1, 1));
        storage.commit_occurrence(first, next, 0).unwrap();

        // A second pass that read version 0 loses
        let (second, next) = prepare(&template, at(2025, 1, 1));
        let err = storage.commit_occurrence(second, next, 0).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(storage.expenses.count().unwrap(), 1);
    }

    #[test]
    fn test_failed_expense_save_leaves_nothing_committed() {
        let (_temp, storage) = create_test_storage();
        let template = stored_template(&storage);
        let blocker = storage.paths().expenses_file();
        std::fs::create_dir(&blocker).unwrap();

        let (expense, next) = prepare(&template, at(2025, 1, 1));
        assert!(storage.commit_occurrence(expense, next, 0).is_err());

        let current = storage.recurring.get(template.id).unwrap().unwrap();
        assert_eq!(current.version, 0);
        assert_eq!(current.occurrence_count, 0);
        assert_eq!(current.next_occurrence, at(2025, 1, 1));
        assert_eq!(storage.expenses.count().unwrap(), 0);

        // Once the file is writable the same occurrence commits normally
        std::fs::remove_dir(&blocker).unwrap();
        let (expense, next) = prepare(&current, at(2025, 1, 1));
        let commit = storage.commit_occurrence(expense, next, 0).unwrap();
        assert!(!commit.recovered);
        assert_eq!(commit.template.occurrence_count, 1);
        assert_eq!(storage.expenses.count().unwrap(), 1);
    }

    #[test]
    fn test_failed_template_save_takes_expense_back() {
        let (_temp, storage) = create_test_storage();
        let template = stored_template(&storage);
        let blocker = storage.paths().recurring_file();
        std::fs::create_dir(&blocker).unwrap();

        let (expense, next) = prepare(&template, at(2025, 1, 1));
        assert!(storage.commit_occurrence(expense, next, 0).is_err());

        let current = storage.recurring.get(template.id).unwrap().unwrap();
        assert_eq!(current.version, 0);
        assert_eq!(current.next_occurrence, at(2025, 1, 1));
        assert_eq!(storage.expenses.count().unwrap(), 0);

        // Nothing was left behind on disk either
        storage.expenses.load().unwrap();
        assert_eq!(storage.expenses.count().unwrap(), 0);
    }

    #[test]
    fn test_commit_for_unknown_template_is_not_found() {
        let (_temp, storage) = create_test_storage();
        let template = RecurringTemplate::new(
            UserId::new(),
            Money::from_cents(500),
            "Coffee",
            RecurrencePattern::Daily,
            at(2025, 1, 1),
        );

        let (expense, next) = prepare(&template, at(2025, 1, 1));
        let err = storage.commit_occurrence(expense, next, 0).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(storage.expenses.count().unwrap(), 0);
    }

    #[test]
    fn test_commit_repairs_template_behind_its_expense() {
        let (_temp, storage) = create_test_storage();
        let template = stored_template(&storage);

        // Expense saved by an interrupted pass; template never advanced
        let orphan = template.materialize(at(2025, 1, 1)).unwrap();
        storage.expenses.insert(orphan.clone()).unwrap();

        let (expense, next) = prepare(&template, at(2025, 1, 2));
        let commit = storage.commit_occurrence(expense, next, 0).unwrap();

        assert!(commit.recovered);
        assert_eq!(commit.expense.id, orphan.id);
        assert_eq!(storage.expenses.count().unwrap(), 1);
        assert_eq!(commit.template.occurrence_count, 1);
    }

    #[test]
    fn test_update_is_audited_with_diff() {
        let (_temp, storage) = create_test_storage();
        let before = stored_template(&storage);
        let mut after = before.clone();
        after.amount = Money::from_cents(125_000);

        storage
            .log_update(
                EntityType::RecurringExpense,
                before.id.to_string(),
                Some(before.category.clone()),
                &before,
                &after,
            )
            .unwrap();

        let entries = storage.audit().read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Update);
        assert_eq!(
            entries[0].diff_summary.as_deref(),
            Some("amount: 120000 -> 125000")
        );
    }

    #[test]
    fn test_matches_short_id() {
        assert!(matches_short_id("rec-1a2b3c4d", "rec-1a2b3c4d"));
        assert!(matches_short_id("rec-1a2b3c4d", "1A2B3C4D"));
        assert!(!matches_short_id("rec-1a2b3c4d", "1a2b"));
        assert!(!matches_short_id("rec-1a2b3c4d", ""));
    }
}
