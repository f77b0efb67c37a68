//! Record store contract and the in-memory implementation.
//!
//! The store owns the uniqueness constraint on `(owner, key, scope)`; every
//! check-then-write happens under one write lock, so a lost race surfaces as
//! `Conflict` instead of a duplicate row.

use std::sync::RwLock;

use chrono::Utc;

use crate::error::{
    StoreError, StoreResult, EMAIL_TAKEN, KEY_TAKEN, OWNER_NOT_FOUND, RECORD_NOT_FOUND,
    USER_NOT_PENDING,
};
use crate::model::{
    Label, LabelFilter, LabelScope, LabelUpdate, NewLabel, UpsertOutcome, User, UserState,
};
use crate::validation::{require_present, FieldViolations};

/// Lookup and activation of users.
pub trait UserDirectory: Send + Sync {
    /// Fails with `Conflict` if the email or uid is already registered.
    fn insert_user(&self, user: User) -> StoreResult<()>;

    fn find_user(&self, uid: &str) -> StoreResult<Option<User>>;

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Move the pending user `uid` registered under `email` to active.
    ///
    /// The state check and the transition happen atomically; an unknown,
    /// mismatched or already active user fails with `Conflict`.
    fn activate_pending(&self, uid: &str, email: &str) -> StoreResult<User>;
}

/// Keyed labels addressed by `(owner, key)`, narrowed by scope when given.
pub trait LabelStore: Send + Sync {
    fn create_label(&self, label: NewLabel) -> StoreResult<Label>;

    /// Update in place, or create when absent and `replace` is set.
    fn update_label(&self, update: LabelUpdate) -> StoreResult<UpsertOutcome>;

    fn delete_label(
        &self,
        owner: &str,
        key: &str,
        scope: Option<LabelScope>,
    ) -> StoreResult<Label>;

    fn labels_for(&self, owner: &str) -> StoreResult<Vec<Label>>;

    /// Distinct owner uids with at least one matching label, in first-match order.
    fn matching_owners(&self, filter: &LabelFilter) -> StoreResult<Vec<String>>;
}

#[derive(Default)]
struct StoreInner {
    users: Vec<User>,
    labels: Vec<Label>,
}

impl StoreInner {
    fn user_exists(&self, uid: &str) -> bool {
        self.users.iter().any(|u| u.uid == uid)
    }

    /// First label for `(owner, key)`, restricted to `scope` when given.
    fn position(&self, owner: &str, key: &str, scope: Option<LabelScope>) -> Option<usize> {
        self.labels.iter().position(|l| {
            l.owner == owner && l.key == key && scope.is_none_or(|s| s == l.scope)
        })
    }

    fn insert_label(&mut self, label: NewLabel) -> StoreResult<Label> {
        if !self.user_exists(&label.owner) {
            return Err(StoreError::NotFound(OWNER_NOT_FOUND.to_string()));
        }
        let taken = self
            .labels
            .iter()
            .any(|l| l.owner == label.owner && l.key == label.key && l.scope == label.scope);
        if taken {
            return Err(StoreError::Conflict(KEY_TAKEN.to_string()));
        }

        let now = Utc::now();
        let label = Label {
            owner: label.owner,
            key: label.key,
            value: label.value,
            scope: label.scope,
            description: label.description,
            created_at: now,
            updated_at: now,
        };
        self.labels.push(label.clone());
        Ok(label)
    }
}

/// Thread-safe in-memory store for users and labels.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_count(&self) -> StoreResult<usize> {
        let inner = self.inner.read().map_err(|_| StoreError::lock_poisoned())?;
        Ok(inner.labels.len())
    }
}

impl UserDirectory for MemoryStore {
    fn insert_user(&self, user: User) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::lock_poisoned())?;
        if inner.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
        }
        if inner.users.iter().any(|u| u.uid == user.uid) {
            return Err(StoreError::Conflict(format!(
                "user {} already exists",
                user.uid
            )));
        }
        inner.users.push(user);
        Ok(())
    }

    fn find_user(&self, uid: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().map_err(|_| StoreError::lock_poisoned())?;
        Ok(inner.users.iter().find(|u| u.uid == uid).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().map_err(|_| StoreError::lock_poisoned())?;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    fn activate_pending(&self, uid: &str, email: &str) -> StoreResult<User> {
        let mut inner = self.inner.write().map_err(|_| StoreError::lock_poisoned())?;
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.uid == uid && u.email == email && !u.is_active())
            .ok_or_else(|| StoreError::Conflict(USER_NOT_PENDING.to_string()))?;
        user.state = UserState::Active;
        Ok(user.clone())
    }
}

impl LabelStore for MemoryStore {
    fn create_label(&self, label: NewLabel) -> StoreResult<Label> {
        let mut violations = FieldViolations::new();
        require_present(&mut violations, "owner", Some(&label.owner));
        require_present(&mut violations, "key", Some(&label.key));
        require_present(&mut violations, "value", Some(&label.value));
        violations.into_result().map_err(StoreError::Validation)?;

        let mut inner = self.inner.write().map_err(|_| StoreError::lock_poisoned())?;
        inner.insert_label(label)
    }

    fn update_label(&self, update: LabelUpdate) -> StoreResult<UpsertOutcome> {
        let mut violations = FieldViolations::new();
        require_present(&mut violations, "owner", Some(&update.owner));
        require_present(&mut violations, "key", Some(&update.key));
        require_present(&mut violations, "value", Some(&update.value));
        violations.into_result().map_err(StoreError::Validation)?;

        let mut inner = self.inner.write().map_err(|_| StoreError::lock_poisoned())?;
        if !inner.user_exists(&update.owner) {
            return Err(StoreError::NotFound(OWNER_NOT_FOUND.to_string()));
        }

        match inner.position(&update.owner, &update.key, update.scope) {
            Some(i) => {
                let label = &mut inner.labels[i];
                label.value = update.value;
                if update.description.is_some() {
                    label.description = update.description;
                }
                label.updated_at = Utc::now();
                Ok(UpsertOutcome::Updated(label.clone()))
            }
            None if update.replace => {
                let created = inner.insert_label(NewLabel {
                    owner: update.owner,
                    key: update.key,
                    value: update.value,
                    scope: update.scope.unwrap_or_default(),
                    description: update.description,
                })?;
                Ok(UpsertOutcome::Created(created))
            }
            None => Err(StoreError::NotFound(RECORD_NOT_FOUND.to_string())),
        }
    }

    fn delete_label(
        &self,
        owner: &str,
        key: &str,
        scope: Option<LabelScope>,
    ) -> StoreResult<Label> {
        let mut inner = self.inner.write().map_err(|_| StoreError::lock_poisoned())?;
        if !inner.user_exists(owner) {
            return Err(StoreError::NotFound(OWNER_NOT_FOUND.to_string()));
        }
        let i = inner
            .position(owner, key, scope)
            .ok_or_else(|| StoreError::NotFound(RECORD_NOT_FOUND.to_string()))?;
        Ok(inner.labels.remove(i))
    }

    fn labels_for(&self, owner: &str) -> StoreResult<Vec<Label>> {
        let inner = self.inner.read().map_err(|_| StoreError::lock_poisoned())?;
        if !inner.user_exists(owner) {
            return Err(StoreError::NotFound(OWNER_NOT_FOUND.to_string()));
        }
        Ok(inner
            .labels
            .iter()
            .filter(|l| l.owner == owner)
            .cloned()
            .collect())
    }

    fn matching_owners(&self, filter: &LabelFilter) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().map_err(|_| StoreError::lock_poisoned())?;
        let mut owners: Vec<String> = Vec::new();
        for label in inner.labels.iter().filter(|l| filter.matches(l)) {
            if !owners.contains(&label.owner) {
                owners.push(label.owner.clone());
            }
        }
        Ok(owners)
    }
}
