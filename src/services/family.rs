//! Family service
//!
//! Users and the family groups they share expenses with. A user belongs to
//! at most one family at a time; membership is the only permission.

use chrono::Utc;

use crate::audit::EntityType;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Family, FamilyId, User, UserId};
use crate::storage::Storage;

pub struct FamilyService<'a> {
    storage: &'a Storage,
}

impl<'a> FamilyService<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Register a user; emails are unique
    pub fn register_user(&self, name: &str, email: &str) -> LedgerResult<User> {
        let user = User::new(name, email);
        user.validate()?;

        self.storage.users.insert(user.clone())?;
        self.storage.users.save()?;

        self.storage.log_create(
            EntityType::User,
            user.id.to_string(),
            Some(user.name.clone()),
            &user,
        )?;

        tracing::info!(user = %user.id, "registered user");
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> LedgerResult<User> {
        self.storage
            .users
            .get(id)?
            .ok_or_else(|| LedgerError::user_not_found(id.to_string()))
    }

    /// Find a user by id, short id or email
    pub fn find_user(&self, query: &str) -> LedgerResult<User> {
        self.storage
            .users
            .resolve(query)?
            .ok_or_else(|| LedgerError::user_not_found(query))
    }

    pub fn list_users(&self) -> LedgerResult<Vec<User>> {
        self.storage.users.get_all()
    }

    pub fn get_family(&self, id: FamilyId) -> LedgerResult<Family> {
        self.storage
            .families
            .get(id)?
            .ok_or_else(|| LedgerError::family_not_found(id.to_string()))
    }

    /// The family a user currently belongs to
    pub fn family_of(&self, user_id: UserId) -> LedgerResult<Option<Family>> {
        self.storage.families.find_for_member(user_id)
    }

    /// Create a family with `creator` as its first member
    pub fn create_family(&self, name: &str, creator: UserId) -> LedgerResult<Family> {
        let mut user = self.get_user(creator)?;
        self.ensure_no_family(&user)?;

        let family = Family::new(name, creator);
        family.validate()?;

        self.storage.families.upsert(family.clone())?;
        user.family_id = Some(family.id);
        self.storage.users.upsert(user)?;
        self.storage.families.save()?;
        self.storage.users.save()?;

        self.storage.log_create(
            EntityType::Family,
            family.id.to_string(),
            Some(family.name.clone()),
            &family,
        )?;

        tracing::info!(family = %family.id, creator = %creator, "created family");
        Ok(family)
    }

    /// Join the family with the given invite code
    pub fn join_family(&self, invite_code: &str, user_id: UserId) -> LedgerResult<Family> {
        let mut user = self.get_user(user_id)?;
        self.ensure_no_family(&user)?;

        let before = self
            .storage
            .families
            .find_by_invite_code(invite_code)?
            .ok_or_else(|| LedgerError::NotFound {
                entity_type: "Family invite code",
                identifier: invite_code.trim().to_string(),
            })?;

        let mut family = before.clone();
        family.add_member(user_id, Utc::now())?;

        self.storage.families.upsert(family.clone())?;
        user.family_id = Some(family.id);
        self.storage.users.upsert(user)?;
        self.storage.families.save()?;
        self.storage.users.save()?;

        self.storage.log_update(
            EntityType::Family,
            family.id.to_string(),
            Some(family.name.clone()),
            &before,
            &family,
        )?;

        Ok(family)
    }

    /// Leave the user's current family
    pub fn leave_family(&self, user_id: UserId) -> LedgerResult<Family> {
        let mut user = self.get_user(user_id)?;
        let before = self.family_of(user_id)?.ok_or_else(|| {
            LedgerError::Membership(format!("{} is not in a family", user.name))
        })?;

        let mut family = before.clone();
        family.remove_member(user_id)?;

        self.storage.families.upsert(family.clone())?;
        user.family_id = None;
        self.storage.users.upsert(user)?;
        self.storage.families.save()?;
        self.storage.users.save()?;

        self.storage.log_update(
            EntityType::Family,
            family.id.to_string(),
            Some(family.name.clone()),
            &before,
            &family,
        )?;

        Ok(family)
    }

    /// Active members of a family, as users
    pub fn members(&self, family_id: FamilyId) -> LedgerResult<Vec<User>> {
        let family = self.get_family(family_id)?;
        let mut users = Vec::new();
        for member in family.active_members() {
            match self.storage.users.get(member.user_id)? {
                Some(user) => users.push(user),
                None => tracing::warn!(user = %member.user_id, family = %family_id, "member has no user record"),
            }
        }
        Ok(users)
    }

    pub fn is_member(&self, family_id: FamilyId, user_id: UserId) -> LedgerResult<bool> {
        Ok(self
            .storage
            .families
            .get(family_id)?
            .is_some_and(|f| f.is_member(user_id)))
    }

    /// Fail unless `user_id` is an active member of `family_id`
    pub fn require_member(&self, family_id: FamilyId, user_id: UserId) -> LedgerResult<()> {
        if self.is_member(family_id, user_id)? {
            Ok(())
        } else {
            Err(LedgerError::Membership(format!(
                "{} is not a member of {}",
                user_id, family_id
            )))
        }
    }

    fn ensure_no_family(&self, user: &User) -> LedgerResult<()> {
        if let Some(family) = self.family_of(user.id)? {
            return Err(LedgerError::Membership(format!(
                "{} already belongs to {}",
                user.name, family.name
            )));
        }
        Ok(())
    }
}
