//! Application state
//!
//! [`SocialLoginState`] is the explicitly constructed service container the
//! handlers run against: configuration, the callback orchestrator, the
//! completion flow, registered strategies and the session store. Stores
//! default to the in-memory implementations; production setups plug in
//! their own or the PostgreSQL ones.

use crate::auth_source::AuthSource;
use crate::completion::ProfileCompletionFlow;
use crate::config::SocialLoginConfig;
use crate::error::SocialLoginError;
use crate::hooks::ExtensionHooks;
use crate::identity::{IdentityRegistry, IdentityStore};
use crate::login::{DefaultSessionLogin, SessionLogin};
use crate::mapping::{FieldMapper, TransformRegistry};
use crate::member::{MemberResolver, MemberStore, MemberValidator};
use crate::observability::ObservabilityConfig;
use crate::orchestrator::CallbackOrchestrator;
use crate::session::{MemorySessionStore, SessionStore};
use crate::store::{MemoryIdentityStore, MemoryMemberStore};
use crate::strategy::StrategyRegistry;
use crate::validation::{ResponseValidator, SaltedSignatureVerifier, SignatureVerifier};
use std::sync::Arc;

/// Shared state for the social login routes
///
/// # Example
///
/// ```rust
/// use acton_social::{config::SocialLoginConfig, state::SocialLoginState};
///
/// # fn example() -> Result<(), acton_social::error::SocialLoginError> {
/// let state = SocialLoginState::builder(SocialLoginConfig::default())
///     .with_transform("nickname", |auth| auth.string_at("info.nickname"))
///     .build()?;
/// assert_eq!(state.config().base_path, "/auth");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SocialLoginState {
    config: Arc<SocialLoginConfig>,
    observability: Arc<ObservabilityConfig>,
    orchestrator: Arc<CallbackOrchestrator>,
    completion: ProfileCompletionFlow,
    strategies: Arc<StrategyRegistry>,
    sessions: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SocialLoginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialLoginState")
            .field("config", &self.config)
            .field("observability", &self.observability)
            .field("orchestrator", &self.orchestrator)
            .field("strategies", &self.strategies)
            .field("sessions", &"SessionStore")
            .finish_non_exhaustive()
    }
}

impl SocialLoginState {
    /// State with default configuration and in-memory stores
    ///
    /// # Errors
    ///
    /// Returns error if the default configuration cannot be built
    pub fn new() -> Result<Self, SocialLoginError> {
        Self::builder(SocialLoginConfig::default()).build()
    }

    /// State with custom configuration and in-memory stores
    ///
    /// # Errors
    ///
    /// Returns error if a field mapping or strategy in `config` is invalid
    pub fn with_config(config: SocialLoginConfig) -> Result<Self, SocialLoginError> {
        Self::builder(config).build()
    }

    /// Start building state from `config`
    #[must_use]
    pub fn builder(config: SocialLoginConfig) -> SocialLoginStateBuilder {
        SocialLoginStateBuilder::new(config)
    }

    /// Get configuration reference
    #[must_use]
    pub fn config(&self) -> &SocialLoginConfig {
        &self.config
    }

    /// Get observability configuration
    #[must_use]
    pub fn observability(&self) -> &ObservabilityConfig {
        &self.observability
    }

    /// Callback orchestrator
    #[must_use]
    pub fn orchestrator(&self) -> &CallbackOrchestrator {
        &self.orchestrator
    }

    /// Profile completion flow
    #[must_use]
    pub const fn completion(&self) -> &ProfileCompletionFlow {
        &self.completion
    }

    /// Registered strategies
    #[must_use]
    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Session store used by the session middleware
    #[must_use]
    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }
}

/// Builder for [`SocialLoginState`]
pub struct SocialLoginStateBuilder {
    config: SocialLoginConfig,
    observability: ObservabilityConfig,
    identities: Option<Arc<dyn IdentityStore>>,
    members: Option<Arc<dyn MemberStore>>,
    sessions: Option<Arc<dyn SessionStore>>,
    login: Option<Arc<dyn SessionLogin>>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    strategies: Option<StrategyRegistry>,
    transforms: TransformRegistry,
    hooks: ExtensionHooks,
}

impl std::fmt::Debug for SocialLoginStateBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialLoginStateBuilder")
            .field("config", &self.config)
            .field("transforms", &self.transforms)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl SocialLoginStateBuilder {
    fn new(config: SocialLoginConfig) -> Self {
        Self {
            config,
            observability: ObservabilityConfig::new("acton-social"),
            identities: None,
            members: None,
            sessions: None,
            login: None,
            verifier: None,
            strategies: None,
            transforms: TransformRegistry::builtin(),
            hooks: ExtensionHooks::new(),
        }
    }

    /// Use a custom observability configuration
    #[must_use]
    pub fn with_observability(mut self, observability: ObservabilityConfig) -> Self {
        self.observability = observability;
        self
    }

    /// Store identities in `store`
    #[must_use]
    pub fn with_identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identities = Some(store);
        self
    }

    /// Store members in `store`
    #[must_use]
    pub fn with_member_store(mut self, store: Arc<dyn MemberStore>) -> Self {
        self.members = Some(store);
        self
    }

    /// Store identities and members in PostgreSQL
    #[cfg(feature = "postgres")]
    #[must_use]
    pub fn with_pg_pool(self, pool: &sqlx::PgPool) -> Self {
        use crate::store::{PgIdentityStore, PgMemberStore};

        self.with_identity_store(Arc::new(PgIdentityStore::new(pool.clone())))
            .with_member_store(Arc::new(PgMemberStore::new(pool.clone())))
    }

    /// Keep sessions in `store`
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Use a custom login primitive
    #[must_use]
    pub fn with_login(mut self, login: Arc<dyn SessionLogin>) -> Self {
        self.login = Some(login);
        self
    }

    /// Use a custom signature verifier instead of the salted one
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Use these strategies instead of the configured ones
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Make a named transform available to `fn:` mapping rules
    #[must_use]
    pub fn with_transform(
        mut self,
        name: impl Into<String>,
        transform: impl Fn(&AuthSource) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.transforms = self.transforms.with(name, transform);
        self
    }

    /// Register extension hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: ExtensionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Build the state
    ///
    /// # Errors
    ///
    /// Returns error if a mapping rule names an unknown transform or a
    /// strategy is misconfigured
    pub fn build(self) -> Result<SocialLoginState, SocialLoginError> {
        let config = self.config;
        let mapper = Arc::new(FieldMapper::from_config(&config.member_mapper, &self.transforms)?);

        if config.security_salt.is_empty() && self.verifier.is_none() {
            tracing::warn!("security_salt is empty, response signatures are trivially forgeable");
        }
        let verifier = self.verifier.unwrap_or_else(|| {
            Arc::new(SaltedSignatureVerifier::new(
                config.security_salt.clone(),
                config.security_iterations,
                config.security_timeout_secs,
            ))
        });

        let strategies = match self.strategies {
            Some(strategies) => strategies,
            None => StrategyRegistry::from_config(&config)?,
        };

        let hooks = Arc::new(self.hooks);
        let identities = self
            .identities
            .unwrap_or_else(|| Arc::new(MemoryIdentityStore::new()));
        let members = self
            .members
            .unwrap_or_else(|| Arc::new(MemoryMemberStore::new()));

        let orchestrator = Arc::new(
            CallbackOrchestrator::new(
                ResponseValidator::new(verifier),
                IdentityRegistry::new(identities, hooks.clone()),
                MemberResolver::new(members, mapper, config.member.clone()),
                MemberValidator::new(config.required_member_fields.clone()),
                self.login.unwrap_or_else(|| Arc::new(DefaultSessionLogin)),
                hooks,
            )
            .with_transport(config.callback_transport)
            .with_default_login_dest(config.default_login_dest.clone())
            .with_completion_path(config.completion_path()),
        );

        tracing::debug!(
            base_path = %config.base_path,
            transport = %config.callback_transport,
            strategies = ?strategies.iter().map(|s| s.key().to_string()).collect::<Vec<_>>(),
            "Social login state built"
        );

        Ok(SocialLoginState {
            completion: ProfileCompletionFlow::new(orchestrator.clone()),
            orchestrator,
            strategies: Arc::new(strategies),
            sessions: self
                .sessions
                .unwrap_or_else(|| Arc::new(MemorySessionStore::new())),
            observability: Arc::new(self.observability),
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CallbackTransport, ConfigError};

    #[test]
    fn test_new_state() {
        let state = SocialLoginState::new().expect("Failed to create state");
        assert_eq!(state.config().base_path, "/auth");
        assert_eq!(state.orchestrator().transport(), CallbackTransport::Session);
        assert!(state.strategies().is_empty());
    }

    #[test]
    fn test_with_config() {
        let config = SocialLoginConfig {
            base_path: "/social".to_string(),
            callback_transport: CallbackTransport::Post,
            ..SocialLoginConfig::default()
        };

        let state = SocialLoginState::with_config(config).expect("Failed to create state");

        assert_eq!(state.orchestrator().transport(), CallbackTransport::Post);
        assert_eq!(state.orchestrator().completion_path(), "/social/profile-completion");
    }

    #[test]
    fn test_unknown_transform_fails_build() {
        let config = SocialLoginConfig::from_toml_str(
            r#"
            [member_mapper.google]
            Nickname = "fn:nickname"
            "#,
        )
        .unwrap();

        let err = SocialLoginState::with_config(config.clone()).unwrap_err();
        assert!(matches!(
            err,
            SocialLoginError::Config(ConfigError::UnknownTransform { .. })
        ));

        SocialLoginState::builder(config)
            .with_transform("nickname", |auth| auth.string_at("info.nickname"))
            .build()
            .expect("custom transform should resolve");
    }

    #[test]
    fn test_clone_state() {
        let state = SocialLoginState::new().expect("Failed to create state");
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert!(Arc::ptr_eq(&state.orchestrator, &cloned.orchestrator));
    }
}
