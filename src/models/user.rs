//! User model
//!
//! Only identity and preferences live here; credentials are handled outside
//! this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{FamilyId, UserId};
use crate::error::LedgerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub family_id: Option<FamilyId>,
    /// Preferred display currency code
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Receive budget alert notifications
    #[serde(default = "default_true")]
    pub budget_alerts: bool,
    pub created_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into().trim().to_string(),
            email: email.into().trim().to_lowercase(),
            family_id: None,
            currency: default_currency(),
            budget_alerts: true,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.is_empty() {
            return Err(LedgerError::Validation("User name is required".into()));
        }
        let valid_email = self
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(LedgerError::Validation(format!(
                "Invalid email address: {}",
                self.email
            )));
        }
        Ok(())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
