//! acton-social: OAuth social login and identity resolution for axum applications
//!
//! A provider response arrives at the callback, is validated, and is turned
//! into one of three outcomes:
//!
//! - **LOGIN**: the `(provider, uid)` pair is already linked to a member
//! - **LINK**: a member with the same email exists and gains a new identity
//! - **REGISTER**: a new member is created, possibly after the visitor fills
//!   in missing profile fields
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acton_social::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     acton_social::observability::init()?;
//!
//!     let config = SocialLoginConfig::load_for_service("my-app")?;
//!     let state = SocialLoginState::builder(config)
//!         .with_hooks(ExtensionHooks::new().on_member_linked(|identity| {
//!             tracing::info!(provider = %identity.provider(), "Identity linked");
//!         }))
//!         .build()?;
//!
//!     let app = axum::Router::new().merge(acton_social::handlers::router(state));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `postgres` - `PostgreSQL` identity and member stores (default)

pub mod auth_source;
pub mod completion;
pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod hooks;
pub mod identity;
pub mod login;
pub mod mapping;
pub mod member;
pub mod observability;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod store;
pub mod strategy;
pub mod validation;
pub mod views;

#[cfg(test)]
pub mod testing;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use acton_social::prelude::*;
    //! ```

    // Configuration and state
    pub use crate::config::{CallbackTransport, SocialLoginConfig, StrategyConfig};
    pub use crate::state::{SocialLoginState, SocialLoginStateBuilder};

    // Callback flow
    pub use crate::auth_source::{AuthSource, RawResponse};
    pub use crate::completion::{CompletionOutcome, ProfileCompletionFlow};
    pub use crate::orchestrator::{AuthFlag, CallbackOrchestrator, CallbackOutcome};
    pub use crate::validation::{ResponseValidator, SaltedSignatureVerifier, SignatureVerifier};

    // Identities and members
    pub use crate::identity::{Identity, IdentityStore};
    pub use crate::mapping::{FieldMapper, TransformRegistry};
    pub use crate::member::{Member, MemberStore, OverwritePolicy};

    // Extension points
    pub use crate::hooks::ExtensionHooks;
    pub use crate::login::{DefaultSessionLogin, SessionLogin};
    pub use crate::strategy::{Strategy, StrategyRegistry};

    // Sessions and forms
    pub use crate::forms::{ProfileCompletionForm, ValidationErrors};
    pub use crate::session::{Session, SessionLayer, SessionStore};

    // Error types
    pub use crate::error::SocialLoginError;

    // Re-export key dependencies
    pub use axum;
    pub use axum_htmx::{HxRedirect, HxRequest};
}
