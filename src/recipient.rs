//! Recipient resolution: turning typed text into a messageable address.
//!
//! `invalid → loading → (valid | error)`, back to `invalid` on clear, reset or
//! conversation switch. Every edit bumps a generation counter and results are
//! only applied when they carry the current generation, so a slow lookup for
//! an old input can never overwrite the state for a newer one.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messaging::MessagingError;
use crate::state::{Action, AppStore};

static ETH_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));
static ENS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-z0-9-]+\.)+eth$").expect("valid regex"));

pub fn is_eth_address(input: &str) -> bool {
    ETH_ADDRESS.is_match(input)
}

pub fn is_ens_name(input: &str) -> bool {
    ENS_NAME.is_match(&input.to_lowercase())
}

/// `0x1234…abcd` style shortening for display; short input is returned as is.
pub fn short_address(address: &str) -> String {
    if address.len() > 10 && address.is_ascii() {
        format!("{}...{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientState {
    #[default]
    Invalid,
    Loading,
    Error,
    Valid,
}

/// What a finished lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub address: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub on_network: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipient {
    pub input: String,
    pub address: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub on_network: bool,
    pub state: RecipientState,
    /// Last lookup failure, for display.
    pub error: Option<String>,
    generation: u64,
}

impl Recipient {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Composing to a peer needs a resolved address that is on the network.
    pub fn can_compose(&self) -> bool {
        self.state == RecipientState::Valid && self.on_network
    }

    fn clear_resolved(&mut self) {
        self.address = None;
        self.name = None;
        self.avatar = None;
        self.on_network = false;
        self.error = None;
    }

    /// Record new input. Blank input resets to `Invalid`, anything else starts
    /// a lookup. Returns the generation the lookup must report back with.
    pub fn edit(&mut self, input: &str) -> u64 {
        self.generation += 1;
        self.clear_resolved();
        if input.trim().is_empty() {
            self.input.clear();
            self.state = RecipientState::Invalid;
        } else {
            self.input = input.to_string();
            self.state = RecipientState::Loading;
        }
        self.generation
    }

    /// Apply a lookup result. Returns `false` (and changes nothing) when the
    /// result is stale.
    pub fn complete(&mut self, generation: u64, outcome: Result<Resolution, String>) -> bool {
        if generation != self.generation || self.state != RecipientState::Loading {
            log::debug!(
                "[recipient] dropping stale result (gen {generation}, current {})",
                self.generation
            );
            return false;
        }
        match outcome {
            Ok(resolution) => {
                self.address = Some(resolution.address);
                self.name = resolution.name;
                self.avatar = resolution.avatar;
                self.on_network = resolution.on_network;
                self.state = RecipientState::Valid;
            }
            Err(message) => {
                self.error = Some(message);
                self.state = RecipientState::Error;
            }
        }
        true
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.clear_resolved();
        self.input.clear();
        self.state = RecipientState::Invalid;
    }
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0:?} is neither an address nor a name")]
    Unrecognised(String),
    #[error("{0} does not resolve to an address")]
    UnknownName(String),
    #[error(transparent)]
    Lookup(#[from] MessagingError),
}

/// Name service plus the SDK's "is this address reachable" check.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, name: &str) -> Result<Option<String>, MessagingError>;

    async fn lookup_address(&self, address: &str) -> Result<Option<String>, MessagingError>;

    async fn avatar(&self, name: &str) -> Result<Option<String>, MessagingError>;

    async fn can_message(&self, address: &str) -> Result<bool, MessagingError>;
}

pub async fn resolve<R>(resolver: &R, input: &str) -> Result<Resolution, ResolveError>
where
    R: NameResolver + ?Sized,
{
    let input = input.trim();
    let (address, name) = if is_eth_address(input) {
        // Reverse lookup is cosmetic; an address stays valid without a name.
        let name = resolver.lookup_address(input).await.unwrap_or_else(|e| {
            log::debug!("[recipient] reverse lookup for {input} failed: {e}");
            None
        });
        (input.to_string(), name)
    } else if is_ens_name(input) {
        // Names are case-insensitive; the resolver only ever sees the lowercase form.
        let name = input.to_lowercase();
        let address = resolver
            .resolve_name(&name)
            .await?
            .ok_or_else(|| ResolveError::UnknownName(name.clone()))?;
        (address, Some(name))
    } else {
        return Err(ResolveError::Unrecognised(input.to_string()));
    };

    let avatar = match &name {
        Some(n) => resolver.avatar(n).await.unwrap_or(None),
        None => None,
    };
    let on_network = resolver.can_message(&address).await?;

    Ok(Resolution {
        address,
        name,
        avatar,
        on_network,
    })
}

/// Feed `input` through the store: mark it loading, look it up, and apply the
/// result unless a newer edit arrived in the meantime. Returns the state the
/// store holds afterwards.
pub async fn resolve_recipient<R>(store: &AppStore, resolver: &R, input: &str) -> RecipientState
where
    R: NameResolver + ?Sized,
{
    let (generation, state) = store.dispatch_and_read(Action::RecipientInputChanged(input.to_string()), |s| {
        (s.recipient.generation(), s.recipient.state)
    });
    if state != RecipientState::Loading {
        return state;
    }

    let outcome = resolve(resolver, input).await.map_err(|e| e.to_string());
    if let Err(message) = &outcome {
        log::info!("[recipient] {input}: {message}");
    }

    store.dispatch_and_read(Action::RecipientResolved { generation, outcome }, |s| s.recipient.state)
}
