//! Narrow interfaces to the external messaging SDK and the wallet.
//!
//! Encryption, transport, ordering and consent storage all live on the far
//! side of these traits; this crate only consumes them as async capabilities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consent::ConsentState;

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum MessagingError {
    #[error("messaging client is not connected")]
    NotConnected,
    #[error("messaging client error: {0}")]
    Client(String),
    #[error("wallet error: {0}")]
    Wallet(String),
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// A peer-to-peer conversation as the SDK reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub topic: String,
    pub peer_address: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    /// A message that quotes `reference` (an SDK message id).
    Reply {
        reference: String,
        content: Box<MessageContent>,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    /// Innermost text, following replies.
    pub fn body(&self) -> &str {
        match self {
            MessageContent::Text { text } => text,
            MessageContent::Reply { content, .. } => content.body(),
        }
    }
}

/// A message held in the SDK's local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub id: String,
    pub conversation_topic: String,
    pub sender_address: String,
    pub content: MessageContent,
    pub sent_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub sent_at: i64,
}

/// Wraps `text` as a reply when a message is being replied to.
pub fn outgoing_content(text: &str, replying_to: Option<&CachedMessage>) -> MessageContent {
    match replying_to {
        Some(parent) => MessageContent::Reply {
            reference: parent.id.clone(),
            content: Box::new(MessageContent::text(text)),
        },
        None => MessageContent::text(text),
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Per-peer consent lookups.
#[async_trait]
pub trait ConsentSource: Send + Sync {
    async fn consent_state(&self, peer_address: &str) -> Result<ConsentState, MessagingError>;
}

#[async_trait]
pub trait MessagingClient: ConsentSource {
    /// Address of the connected identity.
    fn address(&self) -> Option<String>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>, MessagingError>;

    async fn set_consent(&self, peer_address: &str, state: ConsentState) -> Result<(), MessagingError>;

    async fn send_message(
        &self,
        conversation: &Conversation,
        content: MessageContent,
    ) -> Result<SentMessage, MessagingError>;

    /// `Ok(None)` when the id is not in the local message cache.
    async fn get_message(&self, message_id: &str) -> Result<Option<CachedMessage>, MessagingError>;

    async fn disconnect(&self) -> Result<(), MessagingError>;
}

/// The wallet connection; treated as an opaque signer.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn address(&self) -> Option<String>;

    async fn disconnect(&self) -> Result<(), MessagingError>;
}
