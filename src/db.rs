//! Embedded SQLite store for the `groups` and `conversations` tables.
//!
//! Mirrors the hosted schema in `sql/hosted_schema.sql` closely enough that
//! the [`SqliteBackend`](crate::backend::SqliteBackend) and the REST backend
//! are interchangeable behind [`Backend`](crate::backend::Backend).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("malformed users column: {0}")]
    Users(#[from] serde_json::Error),
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Create both tables if they don't already exist.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::query(
        r#"
        PRAGMA journal_mode=WAL;

        CREATE TABLE IF NOT EXISTS groups (
            id              TEXT NOT NULL UNIQUE,
            group_id        TEXT PRIMARY KEY,
            users           TEXT NOT NULL,
            version         INTEGER NOT NULL DEFAULT 1,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        -- seq is the only ordering guarantee for a group's history.
        CREATE TABLE IF NOT EXISTS conversations (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            group_id        TEXT NOT NULL,
            message_id      TEXT NOT NULL,
            sender          TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS conversations_group_id ON conversations (group_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// One row of `groups`. `users` is stored as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: String,
    pub group_id: String,
    pub users: Vec<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub group_id: String,
    pub message_id: String,
    pub sender: String,
    pub seq: i64,
    pub created_at: i64,
}

const GROUP_COLUMNS: &str = "id, group_id, users, version, created_at, updated_at";
const CONVERSATION_COLUMNS: &str = "id, group_id, message_id, sender, seq, created_at";

pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

/// 32 hex chars, used for the generated `id` column.
pub(crate) fn new_row_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn group_from_row(r: &SqliteRow) -> Result<GroupRow, DbError> {
    let users_json: String = r.get("users");
    Ok(GroupRow {
        id: r.get("id"),
        group_id: r.get("group_id"),
        users: serde_json::from_str(&users_json)?,
        version: r.get("version"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn conversation_from_row(r: &SqliteRow) -> ConversationRow {
    ConversationRow {
        id: r.get("id"),
        group_id: r.get("group_id"),
        message_id: r.get("message_id"),
        sender: r.get("sender"),
        seq: r.get("seq"),
        created_at: r.get("created_at"),
    }
}

// ─── Groups ──────────────────────────────────────────────────────────────────

pub async fn insert_group(
    pool: &SqlitePool,
    group_id: &str,
    users: &[String],
) -> Result<GroupRow, DbError> {
    let now = now_micros();
    let row = GroupRow {
        id: new_row_id(),
        group_id: group_id.to_string(),
        users: users.to_vec(),
        version: 1,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"INSERT INTO groups (id, group_id, users, version, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.group_id)
    .bind(serde_json::to_string(&row.users)?)
    .bind(row.version)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(row)
}

pub async fn get_group(pool: &SqlitePool, group_id: &str) -> Result<Option<GroupRow>, DbError> {
    let row = sqlx::query(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE group_id = ?"))
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(group_from_row).transpose()
}

/// Groups whose member list contains `user`, oldest first.
pub async fn list_groups_for_user(pool: &SqlitePool, user: &str) -> Result<Vec<GroupRow>, DbError> {
    let rows = sqlx::query(&format!(
        r#"SELECT {GROUP_COLUMNS} FROM groups
           WHERE EXISTS (SELECT 1 FROM json_each(groups.users) WHERE json_each.value = ?)
           ORDER BY created_at ASC"#
    ))
    .bind(user)
    .fetch_all(pool)
    .await?;

    rows.iter().map(group_from_row).collect()
}

/// Overwrite the member list.
///
/// With `expected_version = Some(v)` the write only lands if the stored row is
/// still at version `v`. Returns `None` when no row matched, which callers must
/// disambiguate (absent vs. version moved on).
pub async fn update_group_users(
    pool: &SqlitePool,
    group_id: &str,
    users: &[String],
    expected_version: Option<i64>,
) -> Result<Option<GroupRow>, DbError> {
    let row = sqlx::query(&format!(
        r#"UPDATE groups
           SET users = ?, version = version + 1, updated_at = ?
           WHERE group_id = ? AND (? IS NULL OR version = ?)
           RETURNING {GROUP_COLUMNS}"#
    ))
    .bind(serde_json::to_string(users)?)
    .bind(now_micros())
    .bind(group_id)
    .bind(expected_version)
    .bind(expected_version)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(group_from_row).transpose()
}

pub async fn delete_group(pool: &SqlitePool, group_id: &str) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM groups WHERE group_id = ?")
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete a group and every conversation link pointing at it in one
/// transaction. Returns `(group_removed, links_removed)`.
pub async fn delete_group_cascade(pool: &SqlitePool, group_id: &str) -> Result<(bool, u64), DbError> {
    let mut tx = pool.begin().await?;

    let links = sqlx::query("DELETE FROM conversations WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let groups = sqlx::query("DELETE FROM groups WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok((groups > 0, links))
}

// ─── Conversations ───────────────────────────────────────────────────────────

pub async fn insert_conversation(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
    sender: &str,
) -> Result<ConversationRow, DbError> {
    let id = new_row_id();
    let created_at = now_micros();

    let seq: i64 = sqlx::query_scalar(
        r#"INSERT INTO conversations (id, group_id, message_id, sender, created_at)
           VALUES (?, ?, ?, ?, ?)
           RETURNING seq"#,
    )
    .bind(&id)
    .bind(group_id)
    .bind(message_id)
    .bind(sender)
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(ConversationRow {
        id,
        group_id: group_id.to_string(),
        message_id: message_id.to_string(),
        sender: sender.to_string(),
        seq,
        created_at,
    })
}

pub async fn list_conversations(
    pool: &SqlitePool,
    group_id: &str,
) -> Result<Vec<ConversationRow>, DbError> {
    let rows = sqlx::query(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE group_id = ? ORDER BY seq ASC"
    ))
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(conversation_from_row).collect())
}

pub async fn delete_conversations(pool: &SqlitePool, group_id: &str) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM conversations WHERE group_id = ?")
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
