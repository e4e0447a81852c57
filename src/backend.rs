//! Storage seam behind the two data-access services.
//!
//! Both the hosted REST backend and the embedded SQLite backend expose the
//! same point operations. Neither caches: every call is one round trip.

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::{self, ConversationRow, DbError, GroupRow};

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BackendError {
    /// Payload rejected before any backend call was made.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// A version-checked write lost the race.
    #[error("version conflict on {group_id}: expected {expected}, found {found}")]
    Conflict {
        group_id: String,
        expected: i64,
        found: i64,
    },
    #[error("backend request failed: {0}")]
    Request(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Backend: Send + Sync {
    async fn insert_group(&self, group_id: &str, users: &[String]) -> Result<GroupRow, BackendError>;

    async fn get_group(&self, group_id: &str) -> Result<Option<GroupRow>, BackendError>;

    async fn list_groups_for_user(&self, user: &str) -> Result<Vec<GroupRow>, BackendError>;

    /// Overwrite `users`. `expected_version = None` is last-write-wins.
    /// Fails with `NotFound` or `Conflict` when nothing was written.
    async fn update_group_users(
        &self,
        group_id: &str,
        users: &[String],
        expected_version: Option<i64>,
    ) -> Result<GroupRow, BackendError>;

    /// Returns whether a row was removed.
    async fn delete_group(&self, group_id: &str) -> Result<bool, BackendError>;

    /// Atomically remove the group and its conversation links.
    /// Returns `(group_removed, links_removed)`.
    async fn delete_group_cascade(&self, group_id: &str) -> Result<(bool, u64), BackendError>;

    async fn insert_conversation(
        &self,
        group_id: &str,
        message_id: &str,
        sender: &str,
    ) -> Result<ConversationRow, BackendError>;

    /// Links for a group ordered by `seq` ascending.
    async fn list_conversations(&self, group_id: &str) -> Result<Vec<ConversationRow>, BackendError>;

    async fn delete_conversations(&self, group_id: &str) -> Result<u64, BackendError>;
}

// ─── SQLite ──────────────────────────────────────────────────────────────────

/// [`Backend`] over a local SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Wraps an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn insert_group(&self, group_id: &str, users: &[String]) -> Result<GroupRow, BackendError> {
        Ok(db::insert_group(&self.pool, group_id, users).await?)
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<GroupRow>, BackendError> {
        Ok(db::get_group(&self.pool, group_id).await?)
    }

    async fn list_groups_for_user(&self, user: &str) -> Result<Vec<GroupRow>, BackendError> {
        Ok(db::list_groups_for_user(&self.pool, user).await?)
    }

    async fn update_group_users(
        &self,
        group_id: &str,
        users: &[String],
        expected_version: Option<i64>,
    ) -> Result<GroupRow, BackendError> {
        if let Some(row) = db::update_group_users(&self.pool, group_id, users, expected_version).await? {
            return Ok(row);
        }

        // Nothing matched: either the row is gone or someone else wrote first.
        match (db::get_group(&self.pool, group_id).await?, expected_version) {
            (Some(current), Some(expected)) => Err(BackendError::Conflict {
                group_id: group_id.to_string(),
                expected,
                found: current.version,
            }),
            _ => Err(BackendError::NotFound(format!("group {group_id}"))),
        }
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, BackendError> {
        Ok(db::delete_group(&self.pool, group_id).await? > 0)
    }

    async fn delete_group_cascade(&self, group_id: &str) -> Result<(bool, u64), BackendError> {
        Ok(db::delete_group_cascade(&self.pool, group_id).await?)
    }

    async fn insert_conversation(
        &self,
        group_id: &str,
        message_id: &str,
        sender: &str,
    ) -> Result<ConversationRow, BackendError> {
        Ok(db::insert_conversation(&self.pool, group_id, message_id, sender).await?)
    }

    async fn list_conversations(&self, group_id: &str) -> Result<Vec<ConversationRow>, BackendError> {
        Ok(db::list_conversations(&self.pool, group_id).await?)
    }

    async fn delete_conversations(&self, group_id: &str) -> Result<u64, BackendError> {
        Ok(db::delete_conversations(&self.pool, group_id).await?)
    }
}
