//! Group membership: the `groups` table.
//!
//! A group is keyed by its caller-chosen `group_id`. Membership changes are
//! read → compute → compare-and-swap on `version`, retried a bounded number of
//! times, so two sessions adding members at once cannot silently drop each
//! other's change.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendError};
use crate::db::GroupRow;

/// How many read/compare-and-swap cycles a membership change gets.
pub const MAX_MEMBERSHIP_ATTEMPTS: usize = 5;

/// Insert payload. `users` is optional so that a payload missing the field
/// can be represented and rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGroup {
    pub group_id: String,
    pub users: Option<Vec<String>>,
}

impl NewGroup {
    pub fn new(group_id: impl Into<String>, users: Vec<String>) -> Self {
        Self {
            group_id: group_id.into(),
            users: Some(users),
        }
    }

    /// Checks the payload and returns the de-duplicated member list.
    pub fn validate(&self) -> Result<Vec<String>, BackendError> {
        if self.group_id.trim().is_empty() {
            return Err(BackendError::Validation("group_id must not be empty".into()));
        }
        let users = self
            .users
            .as_ref()
            .ok_or_else(|| BackendError::Validation("users is required".into()))?;
        validate_members(users)?;
        Ok(dedup_members(users.iter().cloned()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPatch {
    pub users: Option<Vec<String>>,
}

fn validate_members(users: &[String]) -> Result<(), BackendError> {
    if users.iter().any(|u| u.trim().is_empty()) {
        return Err(BackendError::Validation("member ids must not be empty".into()));
    }
    Ok(())
}

/// Drop repeats, keeping the first occurrence's position.
pub fn dedup_members(users: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    users.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

#[derive(Clone)]
pub struct GroupsService {
    backend: Arc<dyn Backend>,
}

impl GroupsService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn create(&self, group: NewGroup) -> Result<GroupRow, BackendError> {
        let users = group.validate()?;
        let row = self.backend.insert_group(&group.group_id, &users).await?;
        log::info!("[groups] created {} with {} members", row.group_id, row.users.len());
        Ok(row)
    }

    /// Overwrite fields of an existing group.
    ///
    /// `expected_version = None` is a blind last-write-wins overwrite; pass the
    /// version you read to make it a compare-and-swap.
    pub async fn update(
        &self,
        group_id: &str,
        patch: GroupPatch,
        expected_version: Option<i64>,
    ) -> Result<GroupRow, BackendError> {
        let Some(users) = patch.users else {
            return self.get_by_id(group_id).await;
        };
        validate_members(&users)?;
        let users = dedup_members(users);
        self.backend.update_group_users(group_id, &users, expected_version).await
    }

    /// Removes only the group row. Prefer [`Self::delete_with_conversations`]
    /// when the group's history should go too.
    pub async fn delete(&self, group_id: &str) -> Result<bool, BackendError> {
        let removed = self.backend.delete_group(group_id).await?;
        if !removed {
            log::debug!("[groups] delete {group_id}: no such group");
        }
        Ok(removed)
    }

    pub async fn delete_with_conversations(&self, group_id: &str) -> Result<(bool, u64), BackendError> {
        let (removed, links) = self.backend.delete_group_cascade(group_id).await?;
        log::info!("[groups] deleted {group_id} (removed={removed}, links={links})");
        Ok((removed, links))
    }

    pub async fn get_by_id(&self, group_id: &str) -> Result<GroupRow, BackendError> {
        self.backend
            .get_group(group_id)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("group {group_id}")))
    }

    pub async fn get_by_user_id(&self, user: &str) -> Result<Vec<GroupRow>, BackendError> {
        self.backend.list_groups_for_user(user).await
    }

    /// Idempotent: adding a present member leaves the list unchanged.
    pub async fn add_member(&self, group_id: &str, user: &str) -> Result<GroupRow, BackendError> {
        if user.trim().is_empty() {
            return Err(BackendError::Validation("member id must not be empty".into()));
        }
        self.modify_members(group_id, |users| {
            dedup_members(users.iter().cloned().chain(std::iter::once(user.to_string())))
        })
        .await
    }

    /// No-op when `user` is not a member.
    pub async fn remove_member(&self, group_id: &str, user: &str) -> Result<GroupRow, BackendError> {
        self.modify_members(group_id, |users| {
            users.iter().filter(|u| u.as_str() != user).cloned().collect()
        })
        .await
    }

    async fn modify_members<F>(&self, group_id: &str, compute: F) -> Result<GroupRow, BackendError>
    where
        F: Fn(&[String]) -> Vec<String>,
    {
        let mut attempt = 1;
        loop {
            let current = self.get_by_id(group_id).await?;
            let next = compute(&current.users);
            if next == current.users {
                return Ok(current);
            }

            match self
                .backend
                .update_group_users(group_id, &next, Some(current.version))
                .await
            {
                Err(BackendError::Conflict { found, .. }) if attempt < MAX_MEMBERSHIP_ATTEMPTS => {
                    log::debug!(
                        "[groups] {group_id}: version moved {} -> {found}, retrying ({attempt})",
                        current.version
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
