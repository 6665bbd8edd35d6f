//! Family model
//!
//! A family is a group of users sharing expenses and budgets. Membership is
//! the only permission: every active member may record family expenses and
//! approve pending ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{FamilyId, UserId};
use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub id: FamilyId,
    pub name: String,
    /// Code other users join with
    pub invite_code: String,
    pub created_by: UserId,
    #[serde(default)]
    pub members: Vec<FamilyMember>,
    pub created_at: DateTime<Utc>,
}

impl Family {
    /// Create a family with `creator` as its first member
    pub fn new(name: impl Into<String>, creator: UserId) -> Self {
        let now = Utc::now();
        let id = FamilyId::new();
        Self {
            invite_code: invite_code_for(&id),
            id,
            name: name.into().trim().to_string(),
            created_by: creator,
            members: vec![FamilyMember {
                user_id: creator,
                joined_at: now,
                is_active: true,
            }],
            created_at: now,
        }
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members
            .iter()
            .any(|m| m.user_id == user_id && m.is_active)
    }

    pub fn active_members(&self) -> impl Iterator<Item = &FamilyMember> {
        self.members.iter().filter(|m| m.is_active)
    }

    /// Add or reactivate a member
    pub fn add_member(&mut self, user_id: UserId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.is_member(user_id) {
            return Err(LedgerError::Membership(format!(
                "{} is already a member of {}",
                user_id, self.name
            )));
        }
        match self.members.iter_mut().find(|m| m.user_id == user_id) {
            Some(member) => {
                member.is_active = true;
                member.joined_at = at;
            }
            None => self.members.push(FamilyMember {
                user_id,
                joined_at: at,
                is_active: true,
            }),
        }
        Ok(())
    }

    /// Deactivate a member; the entry stays for history
    pub fn remove_member(&mut self, user_id: UserId) -> Result<(), LedgerError> {
        let member = self
            .members
            .iter_mut()
            .find(|m| m.user_id == user_id && m.is_active)
            .ok_or_else(|| {
                LedgerError::Membership(format!("{} is not a member of {}", user_id, self.name))
            })?;
        member.is_active = false;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.is_empty() {
            return Err(LedgerError::Validation("Family name is required".into()));
        }
        Ok(())
    }
}

/// Eight uppercase hex characters derived from the family id
fn invite_code_for(id: &FamilyId) -> String {
    id.as_uuid().simple().to_string()[..8].to_uppercase()
}
