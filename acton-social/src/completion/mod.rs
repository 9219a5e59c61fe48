//! Profile completion
//!
//! A registration that lacks required member fields is suspended by the
//! orchestrator. The session then carries the saved identity's id and the
//! partially filled member data as a [`ProfileCompletionForm`]. [`ProfileCompletionFlow::resume`] is a fresh
//! request acting on that session state alone: it re-fetches the identity,
//! validates the submitted fields and either finishes the registration or
//! hands the form back with every error attached.

use crate::error::SocialLoginError;
use crate::forms::{ProfileCompletionForm, ValidationErrors};
use crate::identity::Identity;
use crate::member::{Member, EMAIL};
use crate::orchestrator::{
    CallbackOrchestrator, CallbackOutcome, PENDING_IDENTITY_KEY, REGISTRATION_KEY,
};
use crate::session::Session;
use crate::store::StoreError;
use std::sync::Arc;

/// Error shown when the submitted email belongs to another member
pub const EMAIL_TAKEN: &str = "It looks like this email has already been used";

/// Result of a completion submission
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The member was registered; continue as a finished callback
    Completed(CallbackOutcome),

    /// The submission was rejected
    Invalid {
        /// Field-level errors
        errors: ValidationErrors,
        /// Submitted values, for redisplay
        form: ProfileCompletionForm,
    },
}

/// Resumes suspended registrations
#[derive(Debug, Clone)]
pub struct ProfileCompletionFlow {
    orchestrator: Arc<CallbackOrchestrator>,
}

impl ProfileCompletionFlow {
    /// Create a flow resuming into `orchestrator`
    #[must_use]
    pub const fn new(orchestrator: Arc<CallbackOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Values to prefill the completion form with
    ///
    /// # Errors
    ///
    /// [`SocialLoginError::ExpiredOrInvalidSession`] if no registration is
    /// pending
    pub async fn prepare(&self, session: &Session) -> Result<ProfileCompletionForm, SocialLoginError> {
        self.pending_identity(session).await?;
        Ok(self.stashed_form(session))
    }

    /// Apply a completion form submission
    ///
    /// # Errors
    ///
    /// [`SocialLoginError::ExpiredOrInvalidSession`] if the pending identity
    /// is gone, otherwise store, session and login policy failures
    pub async fn resume(
        &self,
        session: &Session,
        form: ProfileCompletionForm,
    ) -> Result<CompletionOutcome, SocialLoginError> {
        let identity = self.pending_identity(session).await?;
        let required = self.orchestrator.member_validator().required_fields();
        let form = self.stashed_form(session).apply_submission(&form, required);
        let member = form.to_member();

        let mut errors = form.check();
        errors.merge(&self.orchestrator.member_validator().validate(&member));

        if let Some(email) = member.field(EMAIL) {
            let existing = self.orchestrator.resolver().store().find_by_email(email).await?;
            if existing.is_some_and(|m| m.is_persisted()) {
                errors.add_with_code(EMAIL, EMAIL_TAKEN, "required");
            }
        }

        if errors.has_errors() {
            return self.reject(session, form, errors);
        }

        match self
            .orchestrator
            .register_and_log_in(identity, member, session)
            .await
        {
            Ok(outcome) => Ok(CompletionOutcome::Completed(outcome)),
            // Another registration claimed the email between check and insert
            Err(SocialLoginError::Store(StoreError::Duplicate(_))) => {
                let mut errors = ValidationErrors::new();
                errors.add_with_code(EMAIL, EMAIL_TAKEN, "required");
                self.reject(session, form, errors)
            }
            Err(e) => Err(e),
        }
    }

    // Falls back to a blank form if the stash is gone but the identity is not
    fn stashed_form(&self, session: &Session) -> ProfileCompletionForm {
        session
            .get::<ProfileCompletionForm>(REGISTRATION_KEY)
            .unwrap_or_else(|| {
                ProfileCompletionForm::for_member(
                    &Member::default(),
                    self.orchestrator.member_validator().required_fields(),
                )
            })
    }

    fn reject(
        &self,
        session: &Session,
        form: ProfileCompletionForm,
        errors: ValidationErrors,
    ) -> Result<CompletionOutcome, SocialLoginError> {
        session.set(REGISTRATION_KEY, &form)?;
        tracing::warn!(
            errors = errors.count(),
            completion_path = %self.orchestrator.completion_path(),
            "Profile completion rejected"
        );
        Ok(CompletionOutcome::Invalid { errors, form })
    }

    async fn pending_identity(&self, session: &Session) -> Result<Identity, SocialLoginError> {
        let Some(identity_id) = session.get::<i64>(PENDING_IDENTITY_KEY) else {
            tracing::warn!("Profile completion without a pending identity");
            return Err(SocialLoginError::ExpiredOrInvalidSession);
        };

        self.orchestrator
            .identities()
            .find(identity_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(identity_id, "Pending identity no longer exists");
                SocialLoginError::ExpiredOrInvalidSession
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_source::{AuthSource, RawResponse};
    use crate::hooks::ExtensionHooks;
    use crate::identity::{IdentityRegistry, IdentityStore};
    use crate::login::DefaultSessionLogin;
    use crate::mapping::{FieldMapper, MappingRule};
    use crate::member::{
        MemberResolutionOptions, MemberResolver, MemberStore, MemberValidator, FIRST_NAME, LOCALE,
        SURNAME,
    };
    use crate::orchestrator::AuthFlag;
    use crate::store::{MemoryIdentityStore, MemoryMemberStore};
    use crate::validation::{ResponseValidator, SaltedSignatureVerifier};
    use chrono::Utc;
    use serde_json::{json, Value};

    const SALT: &str = "salt";

    struct Harness {
        identities: Arc<MemoryIdentityStore>,
        members: Arc<MemoryMemberStore>,
        orchestrator: Arc<CallbackOrchestrator>,
        flow: ProfileCompletionFlow,
    }

    fn harness() -> Harness {
        harness_with(&[EMAIL], ExtensionHooks::new())
    }

    fn harness_with(required: &[&str], hooks: ExtensionHooks) -> Harness {
        let identities = Arc::new(MemoryIdentityStore::new());
        let members = Arc::new(MemoryMemberStore::new());
        let hooks = Arc::new(hooks);
        let mapper = FieldMapper::new()
            .with_rule("google", EMAIL, MappingRule::path("info.email"))
            .with_rule("google", LOCALE, MappingRule::path("info.locale"));

        let orchestrator = Arc::new(CallbackOrchestrator::new(
            ResponseValidator::new(Arc::new(SaltedSignatureVerifier::new(SALT, 1, 120))),
            IdentityRegistry::new(identities.clone(), hooks.clone()),
            MemberResolver::new(
                members.clone(),
                Arc::new(mapper),
                MemberResolutionOptions::default(),
            ),
            MemberValidator::new(required.iter().map(ToString::to_string).collect()),
            Arc::new(DefaultSessionLogin),
            hooks,
        ));

        Harness {
            identities,
            members,
            flow: ProfileCompletionFlow::new(orchestrator.clone()),
            orchestrator,
        }
    }

    fn signed(uid: &str, info: Value) -> RawResponse {
        let auth = json!({"provider": "google", "uid": uid, "info": info});
        let timestamp = Utc::now().to_rfc3339();
        let signature = SaltedSignatureVerifier::new(SALT, 1, 120)
            .sign(&AuthSource::new(auth.clone()), &timestamp);
        RawResponse::new(json!({"auth": auth, "timestamp": timestamp, "signature": signature}))
    }

    async fn pending(h: &Harness) -> Session {
        let id = h.identities.insert("google", "1", None).await.unwrap();
        let session = Session::new_empty();
        session.set(PENDING_IDENTITY_KEY, id).unwrap();
        session
            .set(
                REGISTRATION_KEY,
                ProfileCompletionForm::new().with_field(FIRST_NAME, "Ada"),
            )
            .unwrap();
        session
    }

    fn form(email: &str) -> ProfileCompletionForm {
        ProfileCompletionForm::new()
            .with_field(FIRST_NAME, "Ada")
            .with_field(SURNAME, "Lovelace")
            .with_field(EMAIL, email)
    }

    async fn suspend(h: &Harness, info: Value) -> Session {
        let session = Session::new_empty();
        let outcome = h
            .orchestrator
            .handle_callback(&signed("1", info), &session)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CallbackOutcome::AwaitingProfileCompletion { .. }
        ));
        session
    }

    #[tokio::test]
    async fn test_missing_pending_identity_is_expired() {
        let h = harness();
        let err = h.flow.resume(&Session::new_empty(), form("a@b.com")).await.unwrap_err();
        assert!(matches!(err, SocialLoginError::ExpiredOrInvalidSession));

        let session = Session::new_empty();
        session.set(PENDING_IDENTITY_KEY, 404_i64).unwrap();
        assert!(matches!(
            h.flow.prepare(&session).await,
            Err(SocialLoginError::ExpiredOrInvalidSession)
        ));
    }

    #[tokio::test]
    async fn test_prepare_returns_stashed_values() {
        let h = harness();
        let session = pending(&h).await;
        let form = h.flow.prepare(&session).await.unwrap();
        assert_eq!(form.value(FIRST_NAME), Some("Ada"));
    }

    #[tokio::test]
    async fn test_completion_registers_and_links() {
        let h = harness();
        let session = pending(&h).await;

        let outcome = h.flow.resume(&session, form(" a@b.com ")).await.unwrap();
        let CompletionOutcome::Completed(CallbackOutcome::LoggedIn { flag, member_id, redirect }) =
            outcome
        else {
            panic!("expected login, got {outcome:?}");
        };
        assert_eq!(flag, AuthFlag::Register);
        assert_eq!(redirect, "/");

        let member = h.members.find_by_id(member_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(member.email.as_deref(), Some("a@b.com"));
        assert_eq!(h.identities.records()[0].member_id, member_id);

        assert!(session.get::<i64>(PENDING_IDENTITY_KEY).is_none());
        assert!(session.get::<ProfileCompletionForm>(REGISTRATION_KEY).is_none());
    }

    #[tokio::test]
    async fn test_invalid_submission_keeps_input() {
        let h = harness();
        let session = pending(&h).await;

        let outcome = h.flow.resume(&session, form("")).await.unwrap();
        let CompletionOutcome::Invalid { errors, form } = outcome else {
            panic!("expected invalid");
        };
        assert!(errors.has_field_error(EMAIL));
        assert_eq!(form.value(SURNAME), Some("Lovelace"));

        let stashed: ProfileCompletionForm = session.get(REGISTRATION_KEY).unwrap();
        assert_eq!(stashed.value(SURNAME), Some("Lovelace"));
        assert!(h.members.is_empty());
    }

    #[tokio::test]
    async fn test_email_collision() {
        let h = harness();
        h.members
            .insert(&Member {
                email: Some("a@b.com".to_string()),
                ..Member::default()
            })
            .await
            .unwrap();
        let session = pending(&h).await;

        let outcome = h.flow.resume(&session, form("a@b.com")).await.unwrap();
        let CompletionOutcome::Invalid { errors, .. } = outcome else {
            panic!("expected invalid");
        };
        assert_eq!(errors.for_field(EMAIL)[0].message, EMAIL_TAKEN);
        assert_eq!(h.members.len(), 1);
        assert_eq!(session.user_id(), None);
    }

    #[tokio::test]
    async fn test_provider_fields_survive_completion() {
        let h = harness();
        let session = suspend(&h, json!({"locale": "en_NZ"})).await;

        let offered = h.flow.prepare(&session).await.unwrap();
        assert_eq!(offered.value(LOCALE), Some("en_NZ"));

        // The visitor only posts the field that was missing
        let submitted = ProfileCompletionForm::new().with_field(EMAIL, "a@b.com");
        let outcome = h.flow.resume(&session, submitted).await.unwrap();
        let CompletionOutcome::Completed(CallbackOutcome::LoggedIn { member_id, .. }) = outcome
        else {
            panic!("expected login, got {outcome:?}");
        };

        let member = h.members.find_by_id(member_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(member.email.as_deref(), Some("a@b.com"));
        assert_eq!(member.locale.as_deref(), Some("en_NZ"));
    }

    #[tokio::test]
    async fn test_configured_required_field_can_be_completed() {
        let h = harness_with(&[EMAIL, LOCALE], ExtensionHooks::new());
        let session = suspend(&h, json!({"email": "a@b.com"})).await;

        let offered = h.flow.prepare(&session).await.unwrap();
        assert!(offered.field_names().any(|name| name == LOCALE));
        assert_eq!(offered.value(EMAIL), Some("a@b.com"));

        let outcome = h
            .flow
            .resume(&session, ProfileCompletionForm::new())
            .await
            .unwrap();
        let CompletionOutcome::Invalid { errors, .. } = outcome else {
            panic!("expected invalid");
        };
        assert_eq!(errors.for_field(LOCALE)[0].message, "Locale is required");
        assert!(!errors.has_field_error(EMAIL));

        let submitted = ProfileCompletionForm::new().with_field(LOCALE, "en_GB");
        let outcome = h.flow.resume(&session, submitted).await.unwrap();
        assert!(matches!(
            outcome,
            CompletionOutcome::Completed(CallbackOutcome::LoggedIn { .. })
        ));

        let member = h.members.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(member.locale.as_deref(), Some("en_GB"));
    }

    #[tokio::test]
    async fn test_policy_rejection_still_clears_registration() {
        let hooks = ExtensionHooks::new().on_before_register(|member| member.disabled = true);
        let h = harness_with(&[EMAIL], hooks);
        let session = pending(&h).await;

        let err = h.flow.resume(&session, form("a@b.com")).await.unwrap_err();
        assert!(matches!(err, SocialLoginError::LoginPolicyRejected { .. }));
        assert_eq!(h.members.len(), 1);
        assert_eq!(session.user_id(), None);

        assert!(session.get::<i64>(PENDING_IDENTITY_KEY).is_none());
        assert!(session.get::<ProfileCompletionForm>(REGISTRATION_KEY).is_none());
        assert!(matches!(
            h.flow.resume(&session, form("a@b.com")).await,
            Err(SocialLoginError::ExpiredOrInvalidSession)
        ));
    }
}
