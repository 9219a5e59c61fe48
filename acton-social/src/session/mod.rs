//! Browser sessions
//!
//! The session store is owned by the host application; this crate only needs
//! `get`, `set` and `remove` on a per-browser key/value map. [`SessionLayer`]
//! loads the session for each request, exposes it to handlers as a
//! [`Session`] extractor and saves it once the response is produced.

pub mod extractors;
pub mod middleware;

pub use middleware::{SameSite, SessionConfig, SessionLayer, SessionMiddleware, SESSION_COOKIE_NAME};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session id is not a UUID
    #[error("Invalid session id")]
    InvalidSessionId,

    /// Value could not be serialized
    #[error("Session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store failed
    #[error("Session store failure: {0}")]
    Store(String),
}

/// Unique session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the session ID as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|_| SessionError::InvalidSessionId)
    }
}

/// Session data stored per browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// When this session expires
    pub expires_at: DateTime<Utc>,
    /// Logged in member, if any
    pub user_id: Option<i64>,
    /// Custom session data
    pub data: HashMap<String, serde_json::Value>,
}

impl SessionData {
    /// Create new session data expiring after `ttl`
    #[must_use]
    pub fn with_expiration(ttl: Duration) -> Self {
        Self {
            expires_at: Utc::now() + ttl,
            user_id: None,
            data: HashMap::new(),
        }
    }

    /// Check if session is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::with_expiration(Duration::hours(24))
    }
}

/// Handle on the current request's session
///
/// Clones share the same data, so writes made by a handler are seen by the
/// middleware when it saves the session.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    data: Arc<Mutex<SessionData>>,
}

impl Session {
    /// Wrap loaded session data
    #[must_use]
    pub fn new(id: SessionId, data: SessionData) -> Self {
        Self {
            id,
            data: Arc::new(Mutex::new(data)),
        }
    }

    /// A fresh session with a new id
    #[must_use]
    pub fn new_empty() -> Self {
        Self::new(SessionId::generate(), SessionData::default())
    }

    /// Get the session ID
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Get a value from the session
    #[must_use]
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .lock()
            .data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a value in the session
    ///
    /// # Errors
    ///
    /// Returns error if value cannot be serialized to JSON
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        self.data.lock().data.insert(key.into(), value);
        Ok(())
    }

    /// Remove a value from the session
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().data.remove(key)
    }

    /// Remove a value and return it, if it deserializes as `T`
    pub fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.remove(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Logged in member, if any
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.data.lock().user_id
    }

    /// Set the logged in member
    pub fn set_user_id(&self, user_id: Option<i64>) {
        self.data.lock().user_id = user_id;
    }

    /// Copy of the current data, for saving
    #[must_use]
    pub fn snapshot(&self) -> SessionData {
        self.data.lock().clone()
    }
}

/// Storage for session data, keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session, `None` if unknown or expired
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError>;

    /// Save a session
    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError>;
}

/// Process-local session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionData>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let mut sessions = self.sessions.write();
        match sessions.get(id) {
            Some(data) if data.is_expired() => {
                sessions.remove(id);
                Ok(None)
            }
            Some(data) => Ok(Some(data.clone())),
            None => Ok(None),
        }
    }

    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError> {
        self.sessions.write().insert(id.clone(), data.clone());
        Ok(())
    }
}
