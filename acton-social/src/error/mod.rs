//! Error types and error handling
//!
//! Every failure of the callback and completion flows ends up as a
//! [`SocialLoginError`]. Its [`IntoResponse`] implementation turns validation
//! and policy failures into a single permission-failure page and keeps
//! internal details (store and session errors) out of the browser.

use crate::config::ConfigError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::strategy::StrategyError;
use crate::validation::ValidationError;
use crate::views;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Message shown when the login policy rejects a member and no hook
/// supplied an alternate redirect
pub const LOGIN_NOT_POSSIBLE: &str = "Login not possible.";

/// Crate-level error type
#[derive(Debug, Error)]
pub enum SocialLoginError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider response failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Member resolved but is not allowed to log in
    #[error("Login not possible for member {member_id:?}")]
    LoginPolicyRejected {
        /// Rejected member
        member_id: Option<i64>,
    },

    /// Profile completion resumed without a valid pending identity
    #[error("Registration session expired or invalid")]
    ExpiredOrInvalidSession,

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Session store failure
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Strategy failure
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl SocialLoginError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::LoginPolicyRejected { .. }
            | Self::ExpiredOrInvalidSession
            | Self::Strategy(StrategyError::UnknownStrategy(_)) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Store(_) | Self::Session(_) | Self::Strategy(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the visitor
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.user_message(),
            Self::LoginPolicyRejected { .. } => LOGIN_NOT_POSSIBLE.to_string(),
            Self::ExpiredOrInvalidSession => {
                "Your registration session has expired. Please log in again.".to_string()
            }
            Self::Strategy(StrategyError::UnknownStrategy(name)) => {
                format!("Social login strategy {name} was not found.")
            }
            Self::BadRequest(message) => message.clone(),
            Self::Config(_) | Self::Store(_) | Self::Session(_) | Self::Strategy(_) => {
                "Something went wrong while logging you in. Please try again.".to_string()
            }
        }
    }
}

impl IntoResponse for SocialLoginError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Social login failed");
        } else {
            tracing::warn!(error = %self, status = %status, "Social login rejected");
        }

        (status, Html(views::permission_failure(&self.user_message(), None))).into_response()
    }
}
