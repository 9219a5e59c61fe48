//! Storage backends for identities and members
//!
//! Both backends enforce the two uniqueness rules at write time:
//! `(provider, uid)` for identities and `email` for members. A conflict is
//! reported as [`StoreError::Duplicate`] so callers can re-resolve.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryIdentityStore, MemoryMemberStore};
#[cfg(feature = "postgres")]
pub use postgres::{PgIdentityStore, PgMemberStore};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record to update does not exist
    #[error("Record not found")]
    NotFound,

    /// Uniqueness constraint violated
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether this is a uniqueness conflict
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
