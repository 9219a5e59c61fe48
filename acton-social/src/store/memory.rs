//! In-memory stores
//!
//! Each store keeps its rows behind a single [`RwLock`]; the uniqueness check
//! and the insert happen under the same write guard.

use super::StoreError;
use crate::identity::{IdentityRecord, IdentityStore};
use crate::member::{Member, MemberStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i64, T>,
    last_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T> Table<T> {
    const fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Identities held in process memory
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    table: RwLock<Table<IdentityRecord>>,
}

impl MemoryIdentityStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    /// Whether no identity is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().rows.is_empty()
    }

    /// All stored identities, ordered by id
    #[must_use]
    pub fn records(&self) -> Vec<IdentityRecord> {
        self.table.read().rows.values().cloned().collect()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_provider_uid(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self
            .table
            .read()
            .rows
            .values()
            .find(|r| r.provider == provider && r.uid == uid)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self.table.read().rows.get(&id).cloned())
    }

    async fn insert(
        &self,
        provider: &str,
        uid: &str,
        member_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let mut table = self.table.write();
        if table
            .rows
            .values()
            .any(|r| r.provider == provider && r.uid == uid)
        {
            return Err(StoreError::Duplicate(format!("identity {provider}/{uid}")));
        }

        let id = table.next_id();
        table.rows.insert(
            id,
            IdentityRecord {
                id,
                provider: provider.to_string(),
                uid: uid.to_string(),
                member_id,
            },
        );
        Ok(id)
    }

    async fn update_member(&self, id: i64, member_id: Option<i64>) -> Result<(), StoreError> {
        let mut table = self.table.write();
        let record = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.member_id = member_id;
        Ok(())
    }
}

/// Members held in process memory
#[derive(Debug, Default)]
pub struct MemoryMemberStore {
    table: RwLock<Table<Member>>,
}

impl MemoryMemberStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored members
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    /// Whether no member is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().rows.is_empty()
    }

    fn email_taken(table: &Table<Member>, email: Option<&str>, except: Option<i64>) -> bool {
        let Some(email) = email.filter(|e| !e.is_empty()) else {
            return false;
        };
        table
            .rows
            .values()
            .any(|m| m.id != except && m.email.as_deref() == Some(email))
    }
}

#[async_trait]
impl MemberStore for MemoryMemberStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Member>, StoreError> {
        Ok(self.table.read().rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>, StoreError> {
        Ok(self
            .table
            .read()
            .rows
            .values()
            .find(|m| m.email.as_deref() == Some(email))
            .cloned())
    }

    async fn insert(&self, member: &Member) -> Result<i64, StoreError> {
        let mut table = self.table.write();
        if Self::email_taken(&table, member.email.as_deref(), None) {
            return Err(StoreError::Duplicate("member email".to_string()));
        }

        let id = table.next_id();
        let mut row = member.clone();
        row.id = Some(id);
        table.rows.insert(id, row);
        Ok(id)
    }

    async fn update(&self, member: &Member) -> Result<(), StoreError> {
        let id = member.id.ok_or(StoreError::NotFound)?;
        let mut table = self.table.write();
        if !table.rows.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if Self::email_taken(&table, member.email.as_deref(), Some(id)) {
            return Err(StoreError::Duplicate("member email".to_string()));
        }
        table.rows.insert(id, member.clone());
        Ok(())
    }
}
