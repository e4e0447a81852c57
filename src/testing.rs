//! Test fakes shared across module tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::backend::{Backend, BackendError, SqliteBackend};
use crate::consent::ConsentState;
use crate::db::{tests::test_pool, ConversationRow, GroupRow};
use crate::messaging::{
    CachedMessage, ConsentSource, Conversation, MessageContent, MessagingClient, MessagingError,
    SentMessage, Wallet,
};
use crate::recipient::NameResolver;

/// SQLite backend that counts every call reaching it.
pub(crate) struct CountingBackend {
    inner: SqliteBackend,
    calls: AtomicUsize,
}

impl CountingBackend {
    pub(crate) async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteBackend::new(test_pool().await),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for CountingBackend {
    async fn insert_group(&self, group_id: &str, users: &[String]) -> Result<GroupRow, BackendError> {
        self.hit();
        self.inner.insert_group(group_id, users).await
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<GroupRow>, BackendError> {
        self.hit();
        self.inner.get_group(group_id).await
    }

    async fn list_groups_for_user(&self, user: &str) -> Result<Vec<GroupRow>, BackendError> {
        self.hit();
        self.inner.list_groups_for_user(user).await
    }

    async fn update_group_users(
        &self,
        group_id: &str,
        users: &[String],
        expected_version: Option<i64>,
    ) -> Result<GroupRow, BackendError> {
        self.hit();
        self.inner.update_group_users(group_id, users, expected_version).await
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, BackendError> {
        self.hit();
        self.inner.delete_group(group_id).await
    }

    async fn delete_group_cascade(&self, group_id: &str) -> Result<(bool, u64), BackendError> {
        self.hit();
        self.inner.delete_group_cascade(group_id).await
    }

    async fn insert_conversation(
        &self,
        group_id: &str,
        message_id: &str,
        sender: &str,
    ) -> Result<ConversationRow, BackendError> {
        self.hit();
        self.inner.insert_conversation(group_id, message_id, sender).await
    }

    async fn list_conversations(&self, group_id: &str) -> Result<Vec<ConversationRow>, BackendError> {
        self.hit();
        self.inner.list_conversations(group_id).await
    }

    async fn delete_conversations(&self, group_id: &str) -> Result<u64, BackendError> {
        self.hit();
        self.inner.delete_conversations(group_id).await
    }
}

// ─── Messaging SDK ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MessengerInner {
    conversations: Vec<Conversation>,
    consent: HashMap<String, ConsentState>,
    messages: HashMap<String, CachedMessage>,
    sent: Vec<(String, MessageContent)>,
    failing_peers: HashSet<String>,
    next_id: u64,
    disconnected: bool,
}

/// In-memory stand-in for the messaging SDK.
pub(crate) struct FakeMessenger {
    address: String,
    inner: Mutex<MessengerInner>,
    /// Consent lookups started while this is set wait for it to turn `true`.
    consent_hold: Mutex<Option<watch::Receiver<bool>>>,
}

impl FakeMessenger {
    pub(crate) fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            inner: Mutex::new(MessengerInner::default()),
            consent_hold: Mutex::new(None),
        }
    }

    /// Park every consent lookup from now on until the returned gate is
    /// opened with `send_replace(true)`.
    pub(crate) fn hold_consent(&self) -> watch::Sender<bool> {
        let (gate, rx) = watch::channel(false);
        *self.consent_hold.lock().unwrap() = Some(rx);
        gate
    }

    pub(crate) fn stop_holding_consent(&self) {
        *self.consent_hold.lock().unwrap() = None;
    }

    pub(crate) fn add_conversation(&self, peer: &str, consent: ConsentState) -> Conversation {
        let mut inner = self.inner.lock().unwrap();
        let conversation = Conversation {
            topic: format!("topic-{peer}"),
            peer_address: peer.to_string(),
            created_at: inner.conversations.len() as i64,
        };
        inner.conversations.push(conversation.clone());
        inner.consent.insert(peer.to_string(), consent);
        conversation
    }

    pub(crate) fn conversations(&self) -> Vec<Conversation> {
        self.inner.lock().unwrap().conversations.clone()
    }

    pub(crate) fn fail_consent_for(&self, peer: &str) {
        self.inner.lock().unwrap().failing_peers.insert(peer.to_string());
    }

    pub(crate) fn consent_of(&self, peer: &str) -> Option<ConsentState> {
        self.inner.lock().unwrap().consent.get(peer).copied()
    }

    pub(crate) fn sent(&self) -> Vec<(String, MessageContent)> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub(crate) fn insert_message(&self, message: CachedMessage) {
        self.inner.lock().unwrap().messages.insert(message.id.clone(), message);
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.inner.lock().unwrap().disconnected
    }
}

#[async_trait]
impl ConsentSource for FakeMessenger {
    async fn consent_state(&self, peer_address: &str) -> Result<ConsentState, MessagingError> {
        let hold = self.consent_hold.lock().unwrap().clone();
        if let Some(mut gate) = hold {
            let _ = gate.wait_for(|open| *open).await;
        }
        let inner = self.inner.lock().unwrap();
        if inner.failing_peers.contains(peer_address) {
            return Err(MessagingError::Client(format!("consent lookup for {peer_address} failed")));
        }
        Ok(inner.consent.get(peer_address).copied().unwrap_or(ConsentState::Unknown))
    }
}

#[async_trait]
impl MessagingClient for FakeMessenger {
    fn address(&self) -> Option<String> {
        Some(self.address.clone())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, MessagingError> {
        Ok(self.conversations())
    }

    async fn set_consent(&self, peer_address: &str, state: ConsentState) -> Result<(), MessagingError> {
        self.inner.lock().unwrap().consent.insert(peer_address.to_string(), state);
        Ok(())
    }

    async fn send_message(
        &self,
        conversation: &Conversation,
        content: MessageContent,
    ) -> Result<SentMessage, MessagingError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let sent = SentMessage {
            id: format!("msg-{}", inner.next_id),
            sent_at: inner.next_id as i64,
        };
        inner.messages.insert(
            sent.id.clone(),
            CachedMessage {
                id: sent.id.clone(),
                conversation_topic: conversation.topic.clone(),
                sender_address: self.address.clone(),
                content: content.clone(),
                sent_at: sent.sent_at,
            },
        );
        inner.sent.push((conversation.topic.clone(), content));
        Ok(sent)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<CachedMessage>, MessagingError> {
        Ok(self.inner.lock().unwrap().messages.get(message_id).cloned())
    }

    async fn disconnect(&self) -> Result<(), MessagingError> {
        self.inner.lock().unwrap().disconnected = true;
        Ok(())
    }
}

// ─── Wallet ──────────────────────────────────────────────────────────────────

pub(crate) struct FakeWallet {
    address: String,
    fail: bool,
    disconnected: AtomicBool,
}

impl FakeWallet {
    pub(crate) fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            fail: false,
            disconnected: AtomicBool::new(false),
        }
    }

    pub(crate) fn failing(address: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(address)
        }
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    fn address(&self) -> Option<String> {
        Some(self.address.clone())
    }

    async fn disconnect(&self) -> Result<(), MessagingError> {
        if self.fail {
            return Err(MessagingError::Wallet("wallet refused to disconnect".into()));
        }
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ─── Name resolution ─────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct FakeResolver {
    pub(crate) names: HashMap<String, String>,
    pub(crate) avatars: HashMap<String, String>,
    pub(crate) on_network: HashSet<String>,
}

impl FakeResolver {
    pub(crate) fn with_name(mut self, name: &str, address: &str) -> Self {
        self.names.insert(name.to_string(), address.to_string());
        self
    }

    pub(crate) fn with_avatar(mut self, name: &str, url: &str) -> Self {
        self.avatars.insert(name.to_string(), url.to_string());
        self
    }

    pub(crate) fn on_network(mut self, address: &str) -> Self {
        self.on_network.insert(address.to_string());
        self
    }
}

#[async_trait]
impl NameResolver for FakeResolver {
    async fn resolve_name(&self, name: &str) -> Result<Option<String>, MessagingError> {
        Ok(self.names.get(name).cloned())
    }

    async fn lookup_address(&self, address: &str) -> Result<Option<String>, MessagingError> {
        Ok(self
            .names
            .iter()
            .find(|(_, a)| a.as_str() == address)
            .map(|(n, _)| n.clone()))
    }

    async fn avatar(&self, name: &str) -> Result<Option<String>, MessagingError> {
        Ok(self.avatars.get(name).cloned())
    }

    async fn can_message(&self, address: &str) -> Result<bool, MessagingError> {
        Ok(self.on_network.contains(address))
    }
}
