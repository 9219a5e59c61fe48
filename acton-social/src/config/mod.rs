//! Configuration management for acton-social
//!
//! Configuration is loaded with `figment` from multiple sources with clear
//! precedence:
//!
//! 1. Environment variables (highest priority, `ACTON_SOCIAL_` prefix, `__` nesting)
//! 2. The given TOML file (or `./config.toml`)
//! 3. `~/.config/acton-social/{service_name}/config.toml` (user config, XDG)
//! 4. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! base_path = "/auth"
//! callback_transport = "session"
//! default_login_dest = "/"
//! security_salt = "change-me"
//! required_member_fields = ["Email"]
//!
//! [member]
//! link_on_match = true
//! overwrite_existing_fields = ["FirstName", "Surname"]
//! overwrite_email = false
//!
//! [member_mapper.google]
//! FirstName = "info.first_name"
//! Surname = "info.last_name"
//! Email = "info.email"
//!
//! [member_mapper.facebook]
//! FirstName = "fn:first_name"
//! Surname = "fn:last_name"
//! Email = "info.email"
//!
//! [strategies.google]
//! client_id = "..."
//! client_secret = "..."
//! auth_url = "https://accounts.google.com/o/oauth2/v2/auth"
//! scopes = ["openid", "email", "profile"]
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use acton_social::config::SocialLoginConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = SocialLoginConfig::load_for_service("my-app")?;
//! assert_eq!(config.base_path, "/auth");
//! # Ok(())
//! # }
//! ```

use crate::member::MemberResolutionOptions;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ACTON_SOCIAL_";

/// Configuration errors
///
/// These are raised while loading configuration or building services from it,
/// never while handling a request.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Callback transport is not one of `session`, `get` or `post`
    #[error("Invalid transport method: {0}")]
    InvalidTransport(String),

    /// Member mapper references a transform that is not registered
    #[error("Unknown transform '{name}' for {provider}.{field}")]
    UnknownTransform {
        /// Provider key
        provider: String,
        /// Target member field
        field: String,
        /// Transform name
        name: String,
    },

    /// Member mapper rule is empty or malformed
    #[error("Invalid mapping rule '{rule}' for {provider}.{field}")]
    InvalidRule {
        /// Provider key
        provider: String,
        /// Target member field
        field: String,
        /// Rule as written in configuration
        rule: String,
    },

    /// Strategy configuration could not be turned into a client
    #[error("Invalid strategy '{strategy}': {reason}")]
    InvalidStrategy {
        /// Strategy key
        strategy: String,
        /// Reason
        reason: String,
    },

    /// Figment extraction failed
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// How the provider response reaches the callback endpoint
///
/// Any other value is rejected when the configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CallbackTransport {
    /// Response stored in the session under `opauth`
    #[default]
    Session,
    /// Base64 encoded response in the `opauth` query parameter
    Get,
    /// Base64 encoded response in the `opauth` form field
    Post,
}

impl CallbackTransport {
    /// Configuration value for this transport
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Get => "get",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for CallbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackTransport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            _ => Err(ConfigError::InvalidTransport(s.to_string())),
        }
    }
}

impl TryFrom<String> for CallbackTransport {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CallbackTransport> for String {
    fn from(value: CallbackTransport) -> Self {
        value.as_str().to_string()
    }
}

/// OAuth2 strategy settings for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Human readable name shown on the login gateway
    pub display_name: Option<String>,

    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Provider authorization endpoint
    pub auth_url: String,

    /// Redirect URI registered with the provider.
    /// Defaults to `{public_url}{base_path}/finished`.
    pub redirect_uri: Option<String>,

    /// Scopes to request
    pub scopes: Vec<String>,
}

/// Complete acton-social configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialLoginConfig {
    /// Path the social login routes are mounted under
    pub base_path: String,

    /// Public origin of the site, used to build callback URLs
    pub public_url: String,

    /// Transport carrying the provider response to the callback
    pub callback_transport: CallbackTransport,

    /// Redirect target after login when no `BackURL` was stashed
    pub default_login_dest: String,

    /// Salt shared with the transport for response signatures
    pub security_salt: String,

    /// Maximum age of a signed response in seconds
    pub security_timeout_secs: u64,

    /// Number of hashing rounds applied to a response signature
    pub security_iterations: u32,

    /// Member resolution options
    pub member: MemberResolutionOptions,

    /// Fields a member must have before it can be registered
    pub required_member_fields: Vec<String>,

    /// Provider key -> member field -> mapping rule
    ///
    /// A rule is either a dotted path into the auth payload (`info.email`)
    /// or a named transform (`fn:first_name`).
    pub member_mapper: BTreeMap<String, BTreeMap<String, String>>,

    /// Provider key -> strategy settings
    pub strategies: BTreeMap<String, StrategyConfig>,
}

impl Default for SocialLoginConfig {
    fn default() -> Self {
        Self {
            base_path: "/auth".to_string(),
            public_url: "http://localhost:3000".to_string(),
            callback_transport: CallbackTransport::Session,
            default_login_dest: "/".to_string(),
            security_salt: String::new(),
            security_timeout_secs: 120,
            security_iterations: 1,
            member: MemberResolutionOptions::default(),
            required_member_fields: vec!["Email".to_string()],
            member_mapper: BTreeMap::new(),
            strategies: BTreeMap::new(),
        }
    }
}

impl SocialLoginConfig {
    /// Load configuration for a specific service
    ///
    /// Searches `./config.toml` and the XDG user config path, then applies
    /// `ACTON_SOCIAL_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value is invalid
    /// (for example an unknown callback transport)
    pub fn load_for_service(service_name: &str) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(Self::recommended_path(service_name)))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(&figment)
    }

    /// Load configuration from a specific file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value is invalid
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(&figment)
    }

    /// Parse configuration from a TOML string layered over the defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or a value is invalid
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let figment =
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml));

        Self::extract(&figment)
    }

    /// Get the recommended XDG config path for a service
    ///
    /// ```rust
    /// use acton_social::config::SocialLoginConfig;
    ///
    /// let path = SocialLoginConfig::recommended_path("my-app");
    /// assert!(path.ends_with("acton-social/my-app/config.toml"));
    /// ```
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("acton-social")
            .join(service_name)
            .join("config.toml")
    }

    /// Callback endpoint path, e.g. `/auth/finished`
    #[must_use]
    pub fn callback_path(&self) -> String {
        join_path(&self.base_path, "finished")
    }

    /// Profile completion endpoint path, e.g. `/auth/profile-completion`
    #[must_use]
    pub fn completion_path(&self) -> String {
        join_path(&self.base_path, "profile-completion")
    }

    /// Absolute callback URL registered with providers
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!(
            "{}{}",
            self.public_url.trim_end_matches('/'),
            self.callback_path()
        )
    }

    fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }
}

/// Join a base path and a segment with exactly one slash between them
#[must_use]
pub fn join_path(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}
