//! User repository for JSON storage

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::LedgerError;
use crate::models::{User, UserId};

use super::file_io::{read_json, write_json_atomic};
use super::matches_short_id;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct UserData {
    #[serde(default)]
    users: Vec<User>,
}

pub struct UserRepository {
    path: PathBuf,
    users: RwLock<HashMap<UserId, User>>,
}

impl UserRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> Result<(), LedgerError> {
        let file_data: UserData = read_json(&self.path)?;

        let mut users = self
            .users
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        users.clear();
        for user in file_data.users {
            users.insert(user.id, user);
        }

        Ok(())
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let users = self
            .users
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut user_list: Vec<_> = users.values().cloned().collect();
        user_list.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        write_json_atomic(&self.path, &UserData { users: user_list })
    }

    pub fn get(&self, id: UserId) -> Result<Option<User>, LedgerError> {
        let users = self
            .users
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(users.get(&id).cloned())
    }

    /// Look a user up by id, short id or email
    pub fn resolve(&self, query: &str) -> Result<Option<User>, LedgerError> {
        let users = self
            .users
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        if let Ok(id) = UserId::parse(query) {
            if let Some(user) = users.get(&id) {
                return Ok(Some(user.clone()));
            }
        }

        let email = query.trim().to_lowercase();
        Ok(users
            .values()
            .find(|u| u.email == email || matches_short_id(&u.id.to_string(), query))
            .cloned())
    }

    pub fn get_all(&self) -> Result<Vec<User>, LedgerError> {
        let users = self
            .users
            .read()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut list: Vec<_> = users.values().cloned().collect();
        list.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(list)
    }

    /// Insert a new user; emails are unique
    pub fn insert(&self, user: User) -> Result<(), LedgerError> {
        let mut users = self
            .users
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        if users.values().any(|u| u.email == user.email) {
            return Err(LedgerError::Duplicate {
                entity_type: "User",
                identifier: user.email,
            });
        }

        users.insert(user.id, user);
        Ok(())
    }

    pub fn upsert(&self, user: User) -> Result<(), LedgerError> {
        let mut users = self
            .users
            .write()
            .map_err(|e| LedgerError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        users.insert(user.id, user);
        Ok(())
    }
}
