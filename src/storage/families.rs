//! Family repository for JSON storage

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::LedgerError;
use crate::models::{Family, FamilyId, UserId};

use super::file_io::{read_json, write_json_atomic};
use super::matches_short_id;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct FamilyData {
    #[serde(default)]
    families: Vec<Family>,
}

pub struct FamilyRepository {
    path: PathBuf,
    families: RwLock<HashMap<FamilyId, Family>>,
}

impl FamilyRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            families: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> Result<(), LedgerError> {
        let file_data: FamilyData = read_json(&self.path)?;

        let mut families = self
            .families
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        families.clear();
        for family in file_data.families {
            families.insert(family.id, family);
        }

        Ok(())
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let families = self
            .families
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut family_list: Vec<_> = families.values().cloned().collect();
        family_list.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        write_json_atomic(
            &self.path,
            &FamilyData {
                families: family_list,
            },
        )
    }

    pub fn get(&self, id: FamilyId) -> Result<Option<Family>, LedgerError> {
        let families = self
            .families
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(families.get(&id).cloned())
    }

    /// Look a family up by id, short id or invite code
    pub fn resolve(&self, query: &str) -> Result<Option<Family>, LedgerError> {
        let families = self
            .families
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        if let Ok(id) = FamilyId::parse(query) {
            if let Some(family) = families.get(&id) {
                return Ok(Some(family.clone()));
            }
        }

        Ok(families
            .values()
            .find(|f| {
                f.invite_code.eq_ignore_ascii_case(query.trim())
                    || matches_short_id(&f.id.to_string(), query)
            })
            .cloned())
    }

    pub fn find_by_invite_code(&self, code: &str) -> Result<Option<Family>, LedgerError> {
        let families = self
            .families
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let code = code.trim();
        Ok(families
            .values()
            .find(|f| f.invite_code.eq_ignore_ascii_case(code))
            .cloned())
    }

    /// The family a user is an active member of, if any
    pub fn find_for_member(&self, user_id: UserId) -> Result<Option<Family>, LedgerError> {
        let families = self
            .families
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(families.values().find(|f| f.is_member(user_id)).cloned())
    }

    pub fn upsert(&self, family: Family) -> Result<(), LedgerError> {
        let mut families = self
            .families
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        families.insert(family.id, family);
        Ok(())
    }
}
