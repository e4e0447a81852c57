//! Consent tabs: splitting conversations into messages / requests / blocked.

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::messaging::{ConsentSource, Conversation, MessagingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    Allowed,
    Denied,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTab {
    #[default]
    Messages,
    Requests,
    Blocked,
}

impl ActiveTab {
    /// The tab a conversation with this consent state is shown under.
    pub fn for_consent(state: ConsentState) -> Self {
        match state {
            ConsentState::Allowed => ActiveTab::Messages,
            ConsentState::Denied => ActiveTab::Blocked,
            ConsentState::Unknown => ActiveTab::Requests,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveTab::Messages => "messages",
            ActiveTab::Requests => "requests",
            ActiveTab::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentBuckets {
    pub messages: Vec<Conversation>,
    pub requests: Vec<Conversation>,
    pub blocked: Vec<Conversation>,
}

impl ConsentBuckets {
    pub fn tab(&self, tab: ActiveTab) -> &[Conversation] {
        match tab {
            ActiveTab::Messages => &self.messages,
            ActiveTab::Requests => &self.requests,
            ActiveTab::Blocked => &self.blocked,
        }
    }
}

/// Looks up consent for every conversation concurrently. Nothing is returned
/// until all lookups finish; the first failure fails the whole batch.
async fn consent_states<S>(source: &S, conversations: &[Conversation]) -> Result<Vec<ConsentState>, MessagingError>
where
    S: ConsentSource + ?Sized,
{
    try_join_all(conversations.iter().map(|c| source.consent_state(&c.peer_address))).await
}

/// Conversations belonging to `tab`, in input order.
pub async fn partition_for_tab<S>(
    source: &S,
    conversations: &[Conversation],
    tab: ActiveTab,
) -> Result<Vec<Conversation>, MessagingError>
where
    S: ConsentSource + ?Sized,
{
    let states = consent_states(source, conversations).await?;
    Ok(conversations
        .iter()
        .zip(states)
        .filter(|(_, state)| ActiveTab::for_consent(*state) == tab)
        .map(|(c, _)| c.clone())
        .collect())
}

pub async fn partition_all<S>(source: &S, conversations: &[Conversation]) -> Result<ConsentBuckets, MessagingError>
where
    S: ConsentSource + ?Sized,
{
    let states = consent_states(source, conversations).await?;
    let mut buckets = ConsentBuckets::default();
    for (conversation, state) in conversations.iter().zip(states) {
        let bucket = match ActiveTab::for_consent(state) {
            ActiveTab::Messages => &mut buckets.messages,
            ActiveTab::Requests => &mut buckets.requests,
            ActiveTab::Blocked => &mut buckets.blocked,
        };
        bucket.push(conversation.clone());
    }
    Ok(buckets)
}
