//! Finding or building the member behind an identity

use super::{Member, MemberStore, EMAIL};
use crate::identity::Identity;
use crate::mapping::{FieldMapper, MemberRecord};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which projected fields may overwrite an existing member's values
///
/// Configured as `false`, `true` or a list of field names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "OverwriteSetting", into = "OverwriteSetting")]
pub enum OverwritePolicy {
    /// Leave existing members untouched
    #[default]
    None,
    /// Overwrite every projected field
    All,
    /// Overwrite only the named fields
    Fields(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OverwriteSetting {
    Flag(bool),
    Fields(Vec<String>),
}

impl From<OverwriteSetting> for OverwritePolicy {
    fn from(setting: OverwriteSetting) -> Self {
        match setting {
            OverwriteSetting::Flag(true) => Self::All,
            OverwriteSetting::Flag(false) => Self::None,
            OverwriteSetting::Fields(fields) => Self::Fields(fields),
        }
    }
}

impl From<OverwritePolicy> for OverwriteSetting {
    fn from(policy: OverwritePolicy) -> Self {
        match policy {
            OverwritePolicy::None => Self::Flag(false),
            OverwritePolicy::All => Self::Flag(true),
            OverwritePolicy::Fields(fields) => Self::Fields(fields),
        }
    }
}

/// Options controlling member resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberResolutionOptions {
    /// Link the identity to a member found by email
    pub link_on_match: bool,
    /// Which projected fields may overwrite an existing member
    pub overwrite_existing_fields: OverwritePolicy,
    /// Allow the projected email to replace an existing member's email
    pub overwrite_email: bool,
}

impl Default for MemberResolutionOptions {
    fn default() -> Self {
        Self {
            link_on_match: true,
            overwrite_existing_fields: OverwritePolicy::None,
            overwrite_email: false,
        }
    }
}

impl MemberResolutionOptions {
    /// Fields of `record` to apply to an existing member
    ///
    /// `Email` is always dropped unless `overwrite_email` is set.
    #[must_use]
    pub fn fields_to_apply(&self, record: &MemberRecord) -> MemberRecord {
        let mut fields: MemberRecord = match &self.overwrite_existing_fields {
            OverwritePolicy::None => MemberRecord::new(),
            OverwritePolicy::All => record.clone(),
            OverwritePolicy::Fields(allowed) => record
                .iter()
                .filter(|(field, _)| allowed.contains(*field))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        if !self.overwrite_email {
            fields.remove(EMAIL);
        }
        fields
    }
}

/// Resolves identities to members
#[derive(Clone)]
pub struct MemberResolver {
    members: Arc<dyn MemberStore>,
    mapper: Arc<FieldMapper>,
    options: MemberResolutionOptions,
}

impl std::fmt::Debug for MemberResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberResolver")
            .field("members", &"MemberStore")
            .field("mapper", &self.mapper)
            .field("options", &self.options)
            .finish()
    }
}

impl MemberResolver {
    /// Create a resolver
    #[must_use]
    pub fn new(
        members: Arc<dyn MemberStore>,
        mapper: Arc<FieldMapper>,
        options: MemberResolutionOptions,
    ) -> Self {
        Self {
            members,
            mapper,
            options,
        }
    }

    /// The member store this resolver reads from
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MemberStore> {
        &self.members
    }

    /// Find or build the member for `identity`
    ///
    /// A persisted identity already linked to an existing member returns that
    /// member unchanged. Otherwise the payload is projected, a member is
    /// looked up by email (or built empty), the identity is linked in memory
    /// when `link_on_match` allows, and projected fields are applied according
    /// to the overwrite policy. Nothing is written.
    pub async fn find_or_create_member(
        &self,
        identity: &mut Identity,
    ) -> Result<Member, StoreError> {
        if identity.is_persisted() {
            if let Some(member_id) = identity.member_id() {
                if let Some(member) = self.members.find_by_id(member_id).await? {
                    tracing::debug!(member_id, "Identity already linked to member");
                    return Ok(member);
                }
            }
        }

        let record = identity.member_record(&self.mapper).clone();

        let mut member = match record.get(EMAIL).filter(|email| !email.is_empty()) {
            Some(email) => self.members.find_by_email(email).await?.unwrap_or_default(),
            None => Member::default(),
        };

        if self.options.link_on_match && member.is_persisted() {
            identity.set_member_id(member.id);
            tracing::debug!(member_id = ?member.id, "Matched existing member by email");
        }

        if member.is_persisted() {
            member.update(&self.options.fields_to_apply(&record));
        } else {
            member.update(&record);
        }

        Ok(member)
    }
}
