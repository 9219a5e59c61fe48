//! Extension points
//!
//! Each hook is an ordered list of callbacks. Observer hooks run every
//! callback in registration order. Redirect hooks collect every return value
//! in order and the last non-empty one wins.
//!
//! ```rust
//! use acton_social::hooks::ExtensionHooks;
//!
//! let hooks = ExtensionHooks::new()
//!     .on_before_register(|member| member.locale = Some("en_GB".to_string()))
//!     .on_success_back_url(|ctx| (ctx.flag.is_register()).then(|| "/welcome".to_string()));
//! ```

use crate::identity::Identity;
use crate::member::Member;
use crate::orchestrator::AuthFlag;
use std::sync::Arc;

/// Observer for identity writes
pub type IdentityHook = Arc<dyn Fn(&Identity) + Send + Sync>;

/// Runs before a new member is written
pub type RegisterHook = Arc<dyn Fn(&mut Member) + Send + Sync>;

/// May supply an alternate redirect target
pub type BackUrlHook = Arc<dyn Fn(&BackUrlContext<'_>) -> Option<String> + Send + Sync>;

/// What a redirect hook gets to look at
#[derive(Debug, Clone, Copy)]
pub struct BackUrlContext<'a> {
    /// Member being logged in
    pub member: &'a Member,
    /// Identity the callback resolved to
    pub identity: &'a Identity,
    /// Outcome of the callback
    pub flag: AuthFlag,
    /// Redirect target chosen so far
    pub redirect: Option<&'a str>,
}

/// Registered extension callbacks
#[derive(Clone, Default)]
pub struct ExtensionHooks {
    before_create: Vec<IdentityHook>,
    after_create: Vec<IdentityHook>,
    member_linked: Vec<IdentityHook>,
    before_register: Vec<RegisterHook>,
    cant_login_back_url: Vec<BackUrlHook>,
    success_back_url: Vec<BackUrlHook>,
}

impl std::fmt::Debug for ExtensionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHooks")
            .field("before_create", &self.before_create.len())
            .field("after_create", &self.after_create.len())
            .field("member_linked", &self.member_linked.len())
            .field("before_register", &self.before_register.len())
            .field("cant_login_back_url", &self.cant_login_back_url.len())
            .field("success_back_url", &self.success_back_url.len())
            .finish()
    }
}

impl ExtensionHooks {
    /// No hooks registered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run before an identity is first persisted
    #[must_use]
    pub fn on_before_create(mut self, hook: impl Fn(&Identity) + Send + Sync + 'static) -> Self {
        self.before_create.push(Arc::new(hook));
        self
    }

    /// Run after an identity is first persisted
    #[must_use]
    pub fn on_after_create(mut self, hook: impl Fn(&Identity) + Send + Sync + 'static) -> Self {
        self.after_create.push(Arc::new(hook));
        self
    }

    /// Run when an identity's member link changes
    #[must_use]
    pub fn on_member_linked(mut self, hook: impl Fn(&Identity) + Send + Sync + 'static) -> Self {
        self.member_linked.push(Arc::new(hook));
        self
    }

    /// Run before a newly registered member is persisted
    #[must_use]
    pub fn on_before_register(
        mut self,
        hook: impl Fn(&mut Member) + Send + Sync + 'static,
    ) -> Self {
        self.before_register.push(Arc::new(hook));
        self
    }

    /// Supply a redirect when the login policy rejects a member
    #[must_use]
    pub fn on_cant_login_back_url(
        mut self,
        hook: impl Fn(&BackUrlContext<'_>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.cant_login_back_url.push(Arc::new(hook));
        self
    }

    /// Override the redirect after a successful login
    #[must_use]
    pub fn on_success_back_url(
        mut self,
        hook: impl Fn(&BackUrlContext<'_>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.success_back_url.push(Arc::new(hook));
        self
    }

    pub(crate) fn before_create(&self, identity: &Identity) {
        self.before_create.iter().for_each(|hook| hook(identity));
    }

    pub(crate) fn after_create(&self, identity: &Identity) {
        self.after_create.iter().for_each(|hook| hook(identity));
    }

    pub(crate) fn member_linked(&self, identity: &Identity) {
        self.member_linked.iter().for_each(|hook| hook(identity));
    }

    pub(crate) fn before_register(&self, member: &mut Member) {
        self.before_register.iter().for_each(|hook| hook(member));
    }

    pub(crate) fn cant_login_back_url(&self, ctx: &BackUrlContext<'_>) -> Option<String> {
        last_non_empty(&self.cant_login_back_url, ctx)
    }

    pub(crate) fn success_back_url(&self, ctx: &BackUrlContext<'_>) -> Option<String> {
        last_non_empty(&self.success_back_url, ctx)
    }
}

fn last_non_empty(hooks: &[BackUrlHook], ctx: &BackUrlContext<'_>) -> Option<String> {
    let results: Vec<Option<String>> = hooks.iter().map(|hook| hook(ctx)).collect();
    results
        .into_iter()
        .rev()
        .flatten()
        .find(|url| !url.is_empty())
}
