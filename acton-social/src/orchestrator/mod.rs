//! Callback state machine
//!
//! One provider callback walks these stages in order:
//!
//! ```text
//! ValidatingResponse -> ResolvingIdentity -> ResolvingMember -> Deciding
//!     -> LoggingIn | AwaitingProfileCompletion
//! ```
//!
//! The decision branches on whether the member is saved and valid and
//! whether the identity is saved:
//!
//! | member saved + valid | identity saved | flag       | writes                                |
//! |----------------------|----------------|------------|---------------------------------------|
//! | yes                  | yes            | `LOGIN`    | none (unless the link changed)         |
//! | yes                  | no             | `LINK`     | identity                               |
//! | no                   | -              | `REGISTER` | identity, then member + identity again |
//!
//! A `REGISTER` whose member fails validation suspends: the identity id and
//! the partial member data go into the session and the visitor is sent to
//! the profile completion form.

use crate::auth_source::{read_response, RawResponse};
use crate::config::CallbackTransport;
use crate::error::SocialLoginError;
use crate::forms::ProfileCompletionForm;
use crate::hooks::{BackUrlContext, ExtensionHooks};
use crate::identity::{Identity, IdentityRegistry};
use crate::login::SessionLogin;
use crate::member::{Member, MemberResolver, MemberValidator};
use crate::session::Session;
use crate::store::StoreError;
use crate::validation::{ResponseValidator, ValidatedResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session key holding the post-login redirect target
pub const BACK_URL_KEY: &str = "BackURL";

/// Session key holding the identity awaiting profile completion
pub const PENDING_IDENTITY_KEY: &str = "SocialLoginIdentityID";

/// Session key holding the partially completed member data
pub const REGISTRATION_KEY: &str = "social_login.registration";

/// Outcome tag of one callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthFlag {
    /// Existing linked identity
    Login = 2,
    /// Existing member matched, identity newly linked
    Link = 4,
    /// New member being created
    Register = 8,
}

impl AuthFlag {
    /// Bit value handed to redirect hooks
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Whether this callback registered a new member
    #[must_use]
    pub const fn is_register(self) -> bool {
        matches!(self, Self::Register)
    }

    /// Upper-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Link => "LINK",
            Self::Register => "REGISTER",
        }
    }
}

impl std::fmt::Display for AuthFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback processing stage, for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    /// Checking the provider response
    ValidatingResponse,
    /// Looking up the identity
    ResolvingIdentity,
    /// Finding or building the member
    ResolvingMember,
    /// Choosing LOGIN, LINK or REGISTER
    Deciding,
    /// Handing the member to the login primitive
    LoggingIn,
    /// Waiting for the visitor to complete their profile
    AwaitingProfileCompletion,
}

impl std::fmt::Display for CallbackStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ValidatingResponse => "validating_response",
            Self::ResolvingIdentity => "resolving_identity",
            Self::ResolvingMember => "resolving_member",
            Self::Deciding => "deciding",
            Self::LoggingIn => "logging_in",
            Self::AwaitingProfileCompletion => "awaiting_profile_completion",
        };
        f.write_str(name)
    }
}

/// Where a finished callback sends the visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The member was logged in
    LoggedIn {
        /// Outcome tag
        flag: AuthFlag,
        /// Logged in member
        member_id: Option<i64>,
        /// Redirect target
        redirect: String,
    },

    /// The member needs more details before it can be registered
    AwaitingProfileCompletion {
        /// Saved identity waiting for its member
        identity_id: i64,
        /// Completion form URL
        redirect: String,
    },

    /// Login was refused and a hook supplied somewhere else to go
    Redirect {
        /// Outcome tag
        flag: AuthFlag,
        /// Redirect target
        redirect: String,
    },
}

impl CallbackOutcome {
    /// Redirect target
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        match self {
            Self::LoggedIn { redirect, .. }
            | Self::AwaitingProfileCompletion { redirect, .. }
            | Self::Redirect { redirect, .. } => redirect,
        }
    }
}

/// Drives one callback from raw response to login or suspension
#[derive(Clone)]
pub struct CallbackOrchestrator {
    transport: CallbackTransport,
    validator: ResponseValidator,
    identities: IdentityRegistry,
    resolver: MemberResolver,
    member_validator: MemberValidator,
    login: Arc<dyn SessionLogin>,
    hooks: Arc<ExtensionHooks>,
    default_login_dest: String,
    completion_path: String,
}

impl std::fmt::Debug for CallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackOrchestrator")
            .field("transport", &self.transport)
            .field("validator", &self.validator)
            .field("identities", &self.identities)
            .field("resolver", &self.resolver)
            .field("member_validator", &self.member_validator)
            .field("login", &"SessionLogin")
            .field("default_login_dest", &self.default_login_dest)
            .field("completion_path", &self.completion_path)
            .finish_non_exhaustive()
    }
}

impl CallbackOrchestrator {
    /// Create an orchestrator
    ///
    /// Defaults: session transport, redirect to `/` after login, completion
    /// form at `/auth/profile-completion`.
    #[must_use]
    pub fn new(
        validator: ResponseValidator,
        identities: IdentityRegistry,
        resolver: MemberResolver,
        member_validator: MemberValidator,
        login: Arc<dyn SessionLogin>,
        hooks: Arc<ExtensionHooks>,
    ) -> Self {
        Self {
            transport: CallbackTransport::Session,
            validator,
            identities,
            resolver,
            member_validator,
            login,
            hooks,
            default_login_dest: "/".to_string(),
            completion_path: "/auth/profile-completion".to_string(),
        }
    }

    /// Set the callback transport
    #[must_use]
    pub const fn with_transport(mut self, transport: CallbackTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Set the redirect used when no `BackURL` was stashed
    #[must_use]
    pub fn with_default_login_dest(mut self, dest: impl Into<String>) -> Self {
        self.default_login_dest = dest.into();
        self
    }

    /// Set the profile completion form URL
    #[must_use]
    pub fn with_completion_path(mut self, path: impl Into<String>) -> Self {
        self.completion_path = path.into();
        self
    }

    /// Callback transport in use
    #[must_use]
    pub const fn transport(&self) -> CallbackTransport {
        self.transport
    }

    /// Profile completion form URL
    #[must_use]
    pub fn completion_path(&self) -> &str {
        &self.completion_path
    }

    /// Read the provider response for this request, consuming the session copy
    #[must_use]
    pub fn read_response(&self, session: &Session, encoded: Option<&str>) -> RawResponse {
        read_response(self.transport, session, encoded)
    }

    pub(crate) const fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub(crate) const fn resolver(&self) -> &MemberResolver {
        &self.resolver
    }

    pub(crate) const fn member_validator(&self) -> &MemberValidator {
        &self.member_validator
    }

    /// Process one provider callback
    ///
    /// # Errors
    ///
    /// Validation failures, login policy rejection, and store or session
    /// failures. A uniqueness conflict while writing is retried once against
    /// the record that won.
    pub async fn handle_callback(
        &self,
        response: &RawResponse,
        session: &Session,
    ) -> Result<CallbackOutcome, SocialLoginError> {
        enter(CallbackStage::ValidatingResponse);
        let validated = self.validator.validate(response).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected provider response");
        })?;

        match self.resolve_and_decide(&validated, session).await {
            Err(SocialLoginError::Store(StoreError::Duplicate(what))) => {
                tracing::warn!(
                    provider = %validated.provider,
                    uid = %validated.uid,
                    conflict = %what,
                    "Concurrent registration detected, re-resolving"
                );
                self.resolve_and_decide(&validated, session).await
            }
            other => other,
        }
    }

    async fn resolve_and_decide(
        &self,
        validated: &ValidatedResponse,
        session: &Session,
    ) -> Result<CallbackOutcome, SocialLoginError> {
        enter(CallbackStage::ResolvingIdentity);
        let mut identity = self
            .identities
            .resolve_identity(&validated.provider, &validated.uid, validated.auth.clone())
            .await?;

        enter(CallbackStage::ResolvingMember);
        let member = self.resolver.find_or_create_member(&mut identity).await?;

        enter(CallbackStage::Deciding);
        self.decide(identity, member, session).await
    }

    async fn decide(
        &self,
        mut identity: Identity,
        member: Member,
        session: &Session,
    ) -> Result<CallbackOutcome, SocialLoginError> {
        if member.is_persisted() && self.member_validator.is_valid(&member) {
            let flag = if identity.is_persisted() {
                AuthFlag::Login
            } else {
                AuthFlag::Link
            };
            tracing::info!(
                provider = %identity.provider(),
                uid = %identity.uid(),
                member_id = ?member.id,
                flag = %flag,
                "Resolved existing member"
            );

            self.identities.write(&mut identity).await?;
            self.save_member_changes(&member).await?;
            return self.log_in_and_redirect(&member, &identity, flag, session).await;
        }

        tracing::info!(
            provider = %identity.provider(),
            uid = %identity.uid(),
            flag = %AuthFlag::Register,
            "Registering new member"
        );
        self.identities.write(&mut identity).await?;

        let errors = self.member_validator.validate(&member);
        if errors.has_errors() {
            return self.suspend_registration(&identity, &member, session);
        }

        self.register_and_log_in(identity, member, session).await
    }

    fn suspend_registration(
        &self,
        identity: &Identity,
        member: &Member,
        session: &Session,
    ) -> Result<CallbackOutcome, SocialLoginError> {
        let Some(identity_id) = identity.id() else {
            return Err(StoreError::NotFound.into());
        };

        session.set(PENDING_IDENTITY_KEY, identity_id)?;
        session.set(
            REGISTRATION_KEY,
            ProfileCompletionForm::for_member(member, self.member_validator.required_fields()),
        )?;

        enter(CallbackStage::AwaitingProfileCompletion);
        tracing::info!(
            identity_id,
            provider = %identity.provider(),
            "Member incomplete, awaiting profile completion"
        );

        Ok(CallbackOutcome::AwaitingProfileCompletion {
            identity_id,
            redirect: self.completion_path.clone(),
        })
    }

    /// Persist a new member, link `identity` to it and log it in
    pub(crate) async fn register_and_log_in(
        &self,
        mut identity: Identity,
        mut member: Member,
        session: &Session,
    ) -> Result<CallbackOutcome, SocialLoginError> {
        self.hooks.before_register(&mut member);

        let member_id = self.resolver.store().insert(&member).await?;
        member.id = Some(member_id);
        identity.set_member_id(Some(member_id));
        self.identities.write(&mut identity).await?;

        // The registration is spent whether or not the login policy admits it
        session.remove(PENDING_IDENTITY_KEY);
        session.remove(REGISTRATION_KEY);

        tracing::info!(
            member_id,
            provider = %identity.provider(),
            uid = %identity.uid(),
            "Member registered"
        );

        self.log_in_and_redirect(&member, &identity, AuthFlag::Register, session)
            .await
    }

    // Overwrite policy may have changed a matched member in memory
    async fn save_member_changes(&self, member: &Member) -> Result<(), StoreError> {
        let Some(id) = member.id else {
            return Ok(());
        };

        let store = self.resolver.store();
        if store.find_by_id(id).await?.as_ref() != Some(member) {
            store.update(member).await?;
            tracing::debug!(member_id = id, "Applied provider fields to member");
        }
        Ok(())
    }

    async fn log_in_and_redirect(
        &self,
        member: &Member,
        identity: &Identity,
        flag: AuthFlag,
        session: &Session,
    ) -> Result<CallbackOutcome, SocialLoginError> {
        enter(CallbackStage::LoggingIn);
        let back_url = session
            .get::<String>(BACK_URL_KEY)
            .filter(|url| !url.is_empty());

        if !self.login.can_log_in(member).await {
            let alternate = self.hooks.cant_login_back_url(&BackUrlContext {
                member,
                identity,
                flag,
                redirect: back_url.as_deref(),
            });

            tracing::warn!(member_id = ?member.id, flag = %flag, "Login policy rejected member");
            return match alternate {
                Some(redirect) => Ok(CallbackOutcome::Redirect { flag, redirect }),
                None => Err(SocialLoginError::LoginPolicyRejected {
                    member_id: member.id,
                }),
            };
        }

        let default = back_url.unwrap_or_else(|| self.default_login_dest.clone());
        let alternate = self.hooks.success_back_url(&BackUrlContext {
            member,
            identity,
            flag,
            redirect: Some(&default),
        });
        let redirect = alternate.unwrap_or(default);

        self.login.log_in(member, true, session).await?;

        session.remove(PENDING_IDENTITY_KEY);
        session.remove(BACK_URL_KEY);
        session.remove(REGISTRATION_KEY);

        tracing::info!(
            member_id = ?member.id,
            flag = %flag,
            redirect = %redirect,
            "Social login complete"
        );

        Ok(CallbackOutcome::LoggedIn {
            flag,
            member_id: member.id,
            redirect,
        })
    }
}

fn enter(stage: CallbackStage) {
    tracing::debug!(stage = %stage, "Callback stage");
}
