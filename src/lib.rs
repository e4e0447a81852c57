pub mod backend;
pub mod config;
pub mod consent;
pub mod conversations;
pub mod db;
pub mod groups;
pub mod inbox;
pub mod messaging;
pub mod onboarding;
pub mod recipient;
pub mod rest;
pub mod rooms;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use backend::{Backend, BackendError, SqliteBackend};
pub use config::{BackendConfig, Config, ConfigError};
pub use consent::{partition_all, partition_for_tab, ActiveTab, ConsentBuckets, ConsentState};
pub use conversations::{ConversationsService, NewConversation};
pub use db::{ConversationRow, GroupRow};
pub use groups::{GroupPatch, GroupsService, NewGroup, MAX_MEMBERSHIP_ATTEMPTS};
pub use messaging::{
    CachedMessage, ConsentSource, Conversation, MessageContent, MessagingClient, MessagingError,
    SentMessage, Wallet,
};
pub use onboarding::{onboarding_step, OnboardingStatus};
pub use recipient::{resolve_recipient, NameResolver, Recipient, RecipientState, ResolveError, Resolution};
pub use rest::RestBackend;
pub use rooms::{RoomMessage, RoomsController};
pub use state::{Action, AppState, AppStore, ChatRoom, SideNav};
pub use store::{ChatCore, StoreError};

// ── Logging ───────────────────────────────────────────────────────────────────

/// Install an `env_logger` backend for the `log` macros, filtered by
/// `RUST_LOG` (default `info`). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// Errors surfaced by the controllers to the UI layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<db::DbError> for CoreError {
    fn from(e: db::DbError) -> Self {
        CoreError::Backend(BackendError::Db(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[test]
    fn errors_keep_their_layer() {
        let err: CoreError = BackendError::NotFound("room1".into()).into();
        assert!(matches!(err, CoreError::Backend(BackendError::NotFound(_))));

        let err: CoreError = MessagingError::NotConnected.into();
        assert!(err.to_string().starts_with("Messaging error"));

        let err: CoreError = ConfigError::MissingAnonKey.into();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
