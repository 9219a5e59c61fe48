//! Session login primitive
//!
//! The host application decides who may log in and what an authenticated
//! session looks like. [`DefaultSessionLogin`] stores the member id in the
//! session and refuses unsaved or disabled members.

use crate::member::Member;
use crate::session::{Session, SessionError};
use async_trait::async_trait;

/// Establishes an authenticated session for a member
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionLogin: Send + Sync {
    /// Policy check run before [`SessionLogin::log_in`]
    async fn can_log_in(&self, member: &Member) -> bool;

    /// Log the member in on `session`
    async fn log_in(
        &self,
        member: &Member,
        remember: bool,
        session: &Session,
    ) -> Result<(), SessionError>;
}

/// Session key holding the remember-me flag
pub const REMEMBER_KEY: &str = "remember_login";

/// Writes the member id into the session
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSessionLogin;

#[async_trait]
impl SessionLogin for DefaultSessionLogin {
    async fn can_log_in(&self, member: &Member) -> bool {
        member.is_persisted() && !member.disabled
    }

    async fn log_in(
        &self,
        member: &Member,
        remember: bool,
        session: &Session,
    ) -> Result<(), SessionError> {
        session.set_user_id(member.id);
        session.set(REMEMBER_KEY, remember)?;
        tracing::info!(member_id = ?member.id, "Member logged in");
        Ok(())
    }
}
