//! Conversation links: which externally stored messages belong to which group.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendError};
use crate::db::ConversationRow;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConversation {
    pub group_id: String,
    pub message_id: String,
    pub sender: String,
}

impl NewConversation {
    pub fn validate(&self) -> Result<(), BackendError> {
        for (field, value) in [
            ("group_id", &self.group_id),
            ("message_id", &self.message_id),
            ("sender", &self.sender),
        ] {
            if value.trim().is_empty() {
                return Err(BackendError::Validation(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ConversationsService {
    backend: Arc<dyn Backend>,
}

impl ConversationsService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Inserts one link. Saving the same `message_id` twice stores two rows.
    pub async fn save_conversation(&self, link: NewConversation) -> Result<ConversationRow, BackendError> {
        link.validate()?;
        let row = self
            .backend
            .insert_conversation(&link.group_id, &link.message_id, &link.sender)
            .await?;
        log::debug!("[conversations] {} <- {} (seq {})", row.group_id, row.message_id, row.seq);
        Ok(row)
    }

    /// All links for `group_id`, oldest first.
    pub async fn get_conversation(&self, group_id: &str) -> Result<Vec<ConversationRow>, BackendError> {
        self.backend.list_conversations(group_id).await
    }

    pub async fn delete_conversation(&self, group_id: &str) -> Result<u64, BackendError> {
        self.backend.delete_conversations(group_id).await
    }
}
