//! Login strategies
//!
//! A [`Strategy`] starts the handshake with one provider. Strategies are
//! registered by provider key when the state is built; the initiation
//! endpoint looks them up in a [`StrategyRegistry`] instead of dispatching on
//! names at request time.

pub mod oauth2;

pub use self::oauth2::OAuth2Strategy;

use crate::config::{SocialLoginConfig, StrategyConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Strategy errors
#[derive(Debug, Error)]
pub enum StrategyError {
    /// No strategy registered under this key
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Strategy configuration is unusable
    #[error("Invalid strategy configuration for {strategy}: {reason}")]
    InvalidConfig {
        /// Strategy key
        strategy: String,
        /// What is wrong
        reason: String,
    },
}

/// What a strategy needs to start the handshake
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    /// Where the provider should send the visitor back
    pub callback_url: String,
}

/// Where to send the visitor to start the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Provider URL
    pub url: String,
    /// CSRF state, to be checked by the transport on return
    pub state: Option<String>,
    /// PKCE verifier, to be used by the transport for the token exchange
    pub pkce_verifier: Option<String>,
}

/// Starts the handshake with one provider
#[cfg_attr(test, mockall::automock)]
pub trait Strategy: Send + Sync {
    /// Provider key, e.g. `google`
    fn key(&self) -> &str;

    /// Name shown on the login gateway
    fn display_name(&self) -> &str;

    /// Build the provider redirect
    ///
    /// # Errors
    ///
    /// Returns error if the redirect cannot be built from the configuration
    fn initiate(&self, request: &InitiateRequest) -> Result<RedirectTarget, StrategyError>;
}

/// Strategies by provider key
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StrategyRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an [`OAuth2Strategy`] for every configured provider
    ///
    /// # Errors
    ///
    /// Returns error if any strategy's URLs are invalid
    pub fn from_config(config: &SocialLoginConfig) -> Result<Self, StrategyError> {
        config
            .strategies
            .iter()
            .try_fold(Self::new(), |registry, (key, strategy): (&String, &StrategyConfig)| {
                let strategy = OAuth2Strategy::from_config(key, strategy)?;
                Ok(registry.with(strategy))
            })
    }

    /// Register a strategy under its key
    #[must_use]
    pub fn with(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategies
            .insert(strategy.key().to_string(), Arc::new(strategy));
        self
    }

    /// Strategy for `key`
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::UnknownStrategy`] if nothing is registered
    pub fn get(&self, key: &str) -> Result<Arc<dyn Strategy>, StrategyError> {
        self.strategies
            .get(key)
            .cloned()
            .ok_or_else(|| StrategyError::UnknownStrategy(key.to_string()))
    }

    /// Registered strategies in key order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.strategies.values()
    }

    /// Whether no strategy is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
