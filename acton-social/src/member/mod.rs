//! Members: the site's user accounts
//!
//! Members belong to the host application. This crate reads and writes a
//! small set of named fields (`Email`, `FirstName`, `Surname`, `Locale`) plus
//! any extra fields a field mapping targets.

pub mod resolver;
pub mod validator;

pub use resolver::{MemberResolutionOptions, MemberResolver, OverwritePolicy};
pub use validator::MemberValidator;

use crate::mapping::MemberRecord;
use crate::store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `Email` field name
pub const EMAIL: &str = "Email";
/// `FirstName` field name
pub const FIRST_NAME: &str = "FirstName";
/// `Surname` field name
pub const SURNAME: &str = "Surname";
/// `Locale` field name
pub const LOCALE: &str = "Locale";

/// A site member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Primary key, once persisted
    pub id: Option<i64>,
    /// Login email address
    pub email: Option<String>,
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub surname: Option<String>,
    /// Preferred locale
    pub locale: Option<String>,
    /// Disabled members cannot log in
    pub disabled: bool,
    /// Any other mapped fields
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Member {
    /// Whether this member exists in the store
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Read a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            EMAIL => self.email.as_deref(),
            FIRST_NAME => self.first_name.as_deref(),
            SURNAME => self.surname.as_deref(),
            LOCALE => self.locale.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        };
        value.filter(|value| !value.is_empty())
    }

    /// Write a field by name
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match name {
            EMAIL => self.email = value,
            FIRST_NAME => self.first_name = value,
            SURNAME => self.surname = value,
            LOCALE => self.locale = value,
            other => {
                if let Some(value) = value {
                    self.extra.insert(other.to_string(), value);
                }
            }
        }
    }

    /// Apply every field of `record`
    pub fn update(&mut self, record: &MemberRecord) {
        for (field, value) in record {
            self.set_field(field, value.clone());
        }
    }

    /// Non-empty fields as a record
    #[must_use]
    pub fn to_record(&self) -> MemberRecord {
        let named = [EMAIL, FIRST_NAME, SURNAME, LOCALE]
            .into_iter()
            .filter_map(|name| self.field(name).map(|v| (name.to_string(), v.to_string())));
        let extra = self
            .extra
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()));

        named.chain(extra).collect()
    }

    /// Display name for logs and views
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.field(FIRST_NAME), self.field(SURNAME)) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => self.field(EMAIL).unwrap_or_default().to_string(),
        }
    }
}

/// Persistence for members
///
/// Implementations must reject a second member with the same email as
/// [`StoreError::Duplicate`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Find a member by primary key
    async fn find_by_id(&self, id: i64) -> Result<Option<Member>, StoreError>;

    /// Find a member by exact email
    async fn find_by_email(&self, email: &str) -> Result<Option<Member>, StoreError>;

    /// Insert a new member and return its id
    async fn insert(&self, member: &Member) -> Result<i64, StoreError>;

    /// Update an existing member
    async fn update(&self, member: &Member) -> Result<(), StoreError>;
}
