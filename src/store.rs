//! Backend selection and the [`ChatCore`] container the UI layer holds on to.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::backend::{Backend, BackendError, SqliteBackend};
use crate::config::{BackendConfig, Config};
use crate::conversations::ConversationsService;
use crate::groups::GroupsService;
use crate::rest::RestBackend;
use crate::rooms::RoomsController;
use crate::state::AppStore;

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store init error: {0}")]
    Init(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

// ─── Initialisation ──────────────────────────────────────────────────────────

/// Open (creating if needed) the SQLite database at `database_url` and apply
/// the schema.
pub async fn open_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StoreError::Init(e.to_string()))?
        .create_if_missing(true);
    let mut pool_options = SqlitePoolOptions::new().max_connections(5);
    if database_url.contains(":memory:") {
        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        pool_options = pool_options.max_connections(1).idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Init(e.to_string()))?;
    crate::db::run_migrations(&pool)
        .await
        .map_err(|e| StoreError::Init(e.to_string()))?;
    Ok(pool)
}

// ─── Container ───────────────────────────────────────────────────────────────

/// One session's worth of services sharing a backend and a state store.
pub struct ChatCore {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub groups: GroupsService,
    pub conversations: ConversationsService,
    pub store: Arc<AppStore>,
}

impl ChatCore {
    pub async fn connect(config: Config) -> Result<Self, StoreError> {
        let backend: Arc<dyn Backend> = match &config.backend {
            BackendConfig::Hosted { url, anon_key } => {
                log::info!("[store] using hosted backend at {url}");
                Arc::new(RestBackend::new(url, anon_key)?)
            }
            BackendConfig::Sqlite { database_url } => {
                log::info!("[store] using sqlite backend at {database_url}");
                Arc::new(SqliteBackend::new(open_pool(database_url).await?))
            }
        };
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            groups: GroupsService::new(backend.clone()),
            conversations: ConversationsService::new(backend.clone()),
            backend,
            store: Arc::new(AppStore::new()),
        }
    }

    /// Rooms controller acting for the wallet address `owner`.
    pub fn rooms(&self, owner: &str) -> RoomsController {
        RoomsController::new(
            self.groups.clone(),
            self.conversations.clone(),
            self.store.clone(),
            owner,
        )
    }
}
