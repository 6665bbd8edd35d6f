//! Recurring template repository for JSON storage

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::LedgerError;
use crate::models::{RecurringId, RecurringTemplate, UserId};

use super::file_io::{read_json, write_json_atomic};
use super::matches_short_id;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct RecurringData {
    #[serde(default)]
    templates: Vec<RecurringTemplate>,
}

pub struct RecurringRepository {
    path: PathBuf,
    templates: RwLock<HashMap<RecurringId, RecurringTemplate>>,
}

impl RecurringRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> Result<(), LedgerError> {
        let file_data: RecurringData = read_json(&self.path)?;

        let mut templates = self.write_guard()?;
        templates.clear();
        for template in file_data.templates {
            templates.insert(template.id, template);
        }

        Ok(())
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let templates = self
            .templates
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut template_list: Vec<_> = templates.values().cloned().collect();
        template_list.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        write_json_atomic(
            &self.path,
            &RecurringData {
                templates: template_list,
            },
        )
    }

    /// Exclusive access for multi-collection commits in [`super::Storage`]
    pub(crate) fn write_guard(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<RecurringId, RecurringTemplate>>, LedgerError> {
        self.templates
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))
    }

    pub fn get(&self, id: RecurringId) -> Result<Option<RecurringTemplate>, LedgerError> {
        let templates = self
            .templates
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(templates.get(&id).cloned())
    }

    /// Look a template up by full or short id
    pub fn resolve(&self, query: &str) -> Result<Option<RecurringTemplate>, LedgerError> {
        let templates = self
            .templates
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        if let Ok(id) = RecurringId::parse(query) {
            return Ok(templates.get(&id).cloned());
        }

        Ok(templates
            .values()
            .find(|t| matches_short_id(&t.id.to_string(), query))
            .cloned())
    }

    /// Active templates due at `as_of`, earliest occurrence first
    pub fn due(&self, as_of: DateTime<Utc>) -> Result<Vec<RecurringTemplate>, LedgerError> {
        let templates = self
            .templates
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut list: Vec<_> = templates
            .values()
            .filter(|t| t.is_due(as_of))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.next_occurrence
                .cmp(&b.next_occurrence)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(list)
    }

    /// A user's templates, soonest first
    pub fn for_user(&self, user_id: UserId) -> Result<Vec<RecurringTemplate>, LedgerError> {
        let templates = self
            .templates
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut list: Vec<_> = templates
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.next_occurrence.cmp(&b.next_occurrence));
        Ok(list)
    }

    pub fn insert(&self, template: RecurringTemplate) -> Result<(), LedgerError> {
        let mut templates = self.write_guard()?;

        if templates.contains_key(&template.id) {
            return Err(LedgerError::Duplicate {
                entity_type: "Recurring expense",
                identifier: template.id.to_string(),
            });
        }

        templates.insert(template.id, template);
        Ok(())
    }

    /// Replace a template if nobody changed it since `expected` was read
    pub fn update_if_version(
        &self,
        mut template: RecurringTemplate,
        expected: u64,
    ) -> Result<RecurringTemplate, LedgerError> {
        let mut templates = self.write_guard()?;

        let found = templates
            .get(&template.id)
            .map(|t| t.version)
            .ok_or_else(|| LedgerError::template_not_found(template.id.to_string()))?;
        if found != expected {
            return Err(LedgerError::Conflict {
                entity_type: "Recurring expense",
                identifier: template.id.to_string(),
                expected,
                found,
            });
        }

        template.version = expected + 1;
        templates.insert(template.id, template.clone());
        Ok(template)
    }
}
