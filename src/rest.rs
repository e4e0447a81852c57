//! Hosted backend: PostgREST dialect over HTTPS.
//!
//! Every operation is one request against `{base}/rest/v1/{table}`. Version
//! bumps and timestamps are maintained server-side by the trigger in
//! `sql/hosted_schema.sql`, and the cascade delete is the
//! `delete_group_cascade` RPC so it runs inside one transaction.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::backend::{Backend, BackendError};
use crate::db::{ConversationRow, GroupRow};

const GROUPS: &str = "groups";
const CONVERSATIONS: &str = "conversations";

#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base: Url,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct CascadeOutcome {
    group_removed: bool,
    links_removed: u64,
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// `cs.{"value"}`: array containment with one quoted element.
fn contains_one(value: &str) -> String {
    let quoted = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("cs.{{\"{quoted}\"}}")
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, BackendError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| BackendError::Validation(format!("backend url {base_url:?}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let base = base
            .join("rest/v1/")
            .map_err(|e| BackendError::Validation(e.to_string()))?;

        Ok(Self {
            client: Client::new(),
            base,
            anon_key: anon_key.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        // `path` is one of our own constants, so joining cannot fail in practice;
        // fall back to the base rather than panic.
        let url = self.base.join(path).unwrap_or_else(|_| self.base.clone());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    fn representation(builder: RequestBuilder) -> RequestBuilder {
        builder.header("Prefer", "return=representation")
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[rest] {status}: {body}");
            return Err(BackendError::Request(format!("{status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Request(format!("decode: {e}")))
    }

    fn select_group(&self, group_id: &str) -> RequestBuilder {
        self.request(Method::GET, GROUPS)
            .query(&[("select", "*".to_string()), ("group_id", eq(group_id))])
    }

    fn select_groups_for_user(&self, user: &str) -> RequestBuilder {
        self.request(Method::GET, GROUPS).query(&[
            ("select", "*".to_string()),
            ("users", contains_one(user)),
            ("order", "created_at.asc".to_string()),
        ])
    }

    fn patch_users(&self, group_id: &str, users: &[String], expected_version: Option<i64>) -> RequestBuilder {
        let mut filters = vec![("group_id", eq(group_id))];
        if let Some(v) = expected_version {
            filters.push(("version", eq(&v.to_string())));
        }
        Self::representation(self.request(Method::PATCH, GROUPS))
            .query(&filters)
            .json(&json!({ "users": users }))
    }

    fn select_conversations(&self, group_id: &str) -> RequestBuilder {
        self.request(Method::GET, CONVERSATIONS).query(&[
            ("select", "*".to_string()),
            ("group_id", eq(group_id)),
            ("order", "seq.asc".to_string()),
        ])
    }
}

fn first<T>(mut rows: Vec<T>, what: &str) -> Result<T, BackendError> {
    if rows.is_empty() {
        return Err(BackendError::Request(format!("{what}: empty representation")));
    }
    Ok(rows.swap_remove(0))
}

#[async_trait]
impl Backend for RestBackend {
    async fn insert_group(&self, group_id: &str, users: &[String]) -> Result<GroupRow, BackendError> {
        let builder = Self::representation(self.request(Method::POST, GROUPS))
            .json(&json!([{ "group_id": group_id, "users": users }]));
        first(Self::send::<Vec<GroupRow>>(builder).await?, "insert group")
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<GroupRow>, BackendError> {
        let rows = Self::send::<Vec<GroupRow>>(self.select_group(group_id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_groups_for_user(&self, user: &str) -> Result<Vec<GroupRow>, BackendError> {
        Self::send(self.select_groups_for_user(user)).await
    }

    async fn update_group_users(
        &self,
        group_id: &str,
        users: &[String],
        expected_version: Option<i64>,
    ) -> Result<GroupRow, BackendError> {
        let rows = Self::send::<Vec<GroupRow>>(self.patch_users(group_id, users, expected_version)).await?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(row);
        }

        match (self.get_group(group_id).await?, expected_version) {
            (Some(current), Some(expected)) => Err(BackendError::Conflict {
                group_id: group_id.to_string(),
                expected,
                found: current.version,
            }),
            _ => Err(BackendError::NotFound(format!("group {group_id}"))),
        }
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, BackendError> {
        let builder = Self::representation(self.request(Method::DELETE, GROUPS))
            .query(&[("group_id", eq(group_id))]);
        let rows = Self::send::<Vec<GroupRow>>(builder).await?;
        Ok(!rows.is_empty())
    }

    async fn delete_group_cascade(&self, group_id: &str) -> Result<(bool, u64), BackendError> {
        let builder = self
            .request(Method::POST, "rpc/delete_group_cascade")
            .json(&json!({ "p_group_id": group_id }));
        let outcome = Self::send::<CascadeOutcome>(builder).await?;
        Ok((outcome.group_removed, outcome.links_removed))
    }

    async fn insert_conversation(
        &self,
        group_id: &str,
        message_id: &str,
        sender: &str,
    ) -> Result<ConversationRow, BackendError> {
        let builder = Self::representation(self.request(Method::POST, CONVERSATIONS)).json(&json!([{
            "group_id": group_id,
            "message_id": message_id,
            "sender": sender,
        }]));
        first(Self::send::<Vec<ConversationRow>>(builder).await?, "insert conversation")
    }

    async fn list_conversations(&self, group_id: &str) -> Result<Vec<ConversationRow>, BackendError> {
        Self::send(self.select_conversations(group_id)).await
    }

    async fn delete_conversations(&self, group_id: &str) -> Result<u64, BackendError> {
        let builder = Self::representation(self.request(Method::DELETE, CONVERSATIONS))
            .query(&[("group_id", eq(group_id))]);
        let rows = Self::send::<Vec<ConversationRow>>(builder).await?;
        Ok(rows.len() as u64)
    }
}
