//! Runtime configuration from the environment (and `.env`, when present).

use reqwest::Url;
use thiserror::Error;

pub const BACKEND_URL_VAR: &str = "CHATROOMS_BACKEND_URL";
pub const BACKEND_ANON_KEY_VAR: &str = "CHATROOMS_BACKEND_ANON_KEY";
pub const DATABASE_URL_VAR: &str = "CHATROOMS_DATABASE_URL";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://chatrooms.db?mode=rwc";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CHATROOMS_BACKEND_URL is set but CHATROOMS_BACKEND_ANON_KEY is missing")]
    MissingAnonKey,
    #[error("invalid CHATROOMS_BACKEND_URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Which store the groups and conversation links live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Hosted { url: String, anon_key: String },
    Sqlite { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendConfig,
}

impl Config {
    /// Config for a local SQLite file (or `sqlite::memory:`).
    pub fn sqlite(database_url: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig::Sqlite {
                database_url: database_url.into(),
            },
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match var(BACKEND_URL_VAR) {
            Some(url) => {
                if let Err(e) = Url::parse(&url) {
                    return Err(ConfigError::InvalidUrl {
                        url,
                        reason: e.to_string(),
                    });
                }
                let anon_key = var(BACKEND_ANON_KEY_VAR).ok_or(ConfigError::MissingAnonKey)?;
                BackendConfig::Hosted { url, anon_key }
            }
            None => BackendConfig::Sqlite {
                database_url: var(DATABASE_URL_VAR).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            },
        };
        Ok(Self { backend })
    }
}
