//! Testing utilities for the social login routes
//!
//! - [`TestServer`] - Wrapper around `axum-test` that keeps the session cookie
//! - Re-exported mockall for trait mocks

pub mod server;

pub use server::TestServer;

// Re-export mockall for test usage
pub use mockall;
