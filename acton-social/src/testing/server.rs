//! Test server utilities using axum-test
//!
//! A thin wrapper around `axum_test::TestServer`. Social login spans several
//! requests sharing one session, so [`TestServer::with_cookies`] keeps the
//! cookies each response sets.

use axum::Router;

/// Test server wrapper for handler tests
pub struct TestServer {
    inner: axum_test::TestServer,
}

impl TestServer {
    /// Create a new test server from an Axum router
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be started
    pub fn new(app: Router) -> anyhow::Result<Self> {
        let inner = axum_test::TestServer::new(app)?;
        Ok(Self { inner })
    }

    /// Create a test server that sends back every cookie it receives
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be started
    pub fn with_cookies(app: Router) -> anyhow::Result<Self> {
        let inner = axum_test::TestServer::builder().save_cookies().build(app)?;
        Ok(Self { inner })
    }

    /// Make a GET request to the server
    pub fn get(&self, path: &str) -> axum_test::TestRequest {
        self.inner.get(path)
    }

    /// Make a POST request to the server
    pub fn post(&self, path: &str) -> axum_test::TestRequest {
        self.inner.post(path)
    }

    /// Get the inner `axum_test::TestServer` for advanced usage
    #[must_use]
    pub const fn inner(&self) -> &axum_test::TestServer {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, Session, SessionLayer};
    use axum::routing::get;
    use std::sync::Arc;

    fn counter_app() -> Router {
        Router::new()
            .route(
                "/count",
                get(|session: Session| async move {
                    let count = session.get::<u32>("count").unwrap_or(0) + 1;
                    session.set("count", count).unwrap();
                    count.to_string()
                }),
            )
            .layer(SessionLayer::new(Arc::new(MemorySessionStore::new())))
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = TestServer::new(counter_app()).unwrap();
        server.get("/count").await.assert_text("1");
    }

    #[tokio::test]
    async fn test_cookies_are_kept() {
        let server = TestServer::with_cookies(counter_app()).unwrap();
        server.get("/count").await.assert_text("1");
        server.get("/count").await.assert_text("2");
    }

    #[tokio::test]
    async fn test_cookies_are_dropped_by_default() {
        let server = TestServer::new(counter_app()).unwrap();
        server.get("/count").await.assert_text("1");
        server.get("/count").await.assert_text("1");
    }
}
