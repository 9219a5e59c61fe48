//! Identities: durable bindings of one provider account to one member
//!
//! The pair `(provider, uid)` is unique across all identities. An identity is
//! either unlinked or linked to exactly one member, and is never deleted here.
//!
//! Resolution is lookup-or-new: [`IdentityRegistry::resolve_identity`] always
//! yields an [`Identity`], unpersisted when the pair has not been seen before.

use crate::auth_source::AuthSource;
use crate::hooks::ExtensionHooks;
use crate::mapping::{FieldMapper, MemberRecord};
use crate::store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity row as held by an [`IdentityStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct IdentityRecord {
    /// Primary key
    pub id: i64,
    /// Provider key
    pub provider: String,
    /// Provider-scoped subject id
    pub uid: String,
    /// Linked member
    pub member_id: Option<i64>,
}

/// Persistence for identities
///
/// Implementations must enforce uniqueness of `(provider, uid)` and report a
/// conflict as [`StoreError::Duplicate`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find an identity by exact provider and uid
    async fn find_by_provider_uid(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<IdentityRecord>, StoreError>;

    /// Find an identity by primary key
    async fn find_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError>;

    /// Insert a new identity and return its id
    async fn insert(
        &self,
        provider: &str,
        uid: &str,
        member_id: Option<i64>,
    ) -> Result<i64, StoreError>;

    /// Change the member an identity is linked to
    async fn update_member(&self, id: i64, member_id: Option<i64>) -> Result<(), StoreError>;
}

/// One provider account, possibly not yet persisted
#[derive(Debug, Clone)]
pub struct Identity {
    id: Option<i64>,
    provider: String,
    uid: String,
    member_id: Option<i64>,
    stored_member_id: Option<i64>,
    auth_source: Option<AuthSource>,
    record: Option<MemberRecord>,
}

impl Identity {
    /// A new, unpersisted and unlinked identity
    #[must_use]
    pub fn new(provider: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            id: None,
            provider: provider.into(),
            uid: uid.into(),
            member_id: None,
            stored_member_id: None,
            auth_source: None,
            record: None,
        }
    }

    /// An identity loaded from a store
    #[must_use]
    pub fn from_record(record: IdentityRecord) -> Self {
        Self {
            id: Some(record.id),
            provider: record.provider,
            uid: record.uid,
            member_id: record.member_id,
            stored_member_id: record.member_id,
            auth_source: None,
            record: None,
        }
    }

    /// Primary key, once persisted
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Provider key
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Provider-scoped subject id
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Linked member
    #[must_use]
    pub const fn member_id(&self) -> Option<i64> {
        self.member_id
    }

    /// Link (or unlink) a member in memory
    pub const fn set_member_id(&mut self, member_id: Option<i64>) {
        self.member_id = member_id;
    }

    /// Whether this identity has been written to the store
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the member link differs from what the store holds
    #[must_use]
    pub fn is_member_changed(&self) -> bool {
        self.member_id != self.stored_member_id
    }

    /// Record that the current state has been written under `id`
    pub const fn mark_persisted(&mut self, id: i64) {
        self.id = Some(id);
        self.stored_member_id = self.member_id;
    }

    /// Attach the provider payload for this callback
    ///
    /// Replacing the payload invalidates the cached member record.
    pub fn set_auth_source(&mut self, auth: AuthSource) {
        self.auth_source = Some(auth);
        self.record = None;
    }

    /// The provider payload for this callback
    #[must_use]
    pub const fn auth_source(&self) -> Option<&AuthSource> {
        self.auth_source.as_ref()
    }

    /// Member fields projected from the provider payload
    ///
    /// Computed once per payload and cached on the identity.
    pub fn member_record(&mut self, mapper: &FieldMapper) -> &MemberRecord {
        let provider = &self.provider;
        let auth = &self.auth_source;
        self.record.get_or_insert_with(|| {
            auth.as_ref()
                .map(|auth| mapper.project(provider, auth))
                .unwrap_or_default()
        })
    }
}

/// Lookup-or-new resolution and hook-aware writes over an [`IdentityStore`]
#[derive(Clone)]
pub struct IdentityRegistry {
    store: Arc<dyn IdentityStore>,
    hooks: Arc<ExtensionHooks>,
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("store", &"IdentityStore")
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl IdentityRegistry {
    /// Create a registry
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, hooks: Arc<ExtensionHooks>) -> Self {
        Self { store, hooks }
    }

    /// Find the identity for `auth`, or build a new unpersisted one
    ///
    /// The payload is attached to the returned identity either way.
    pub async fn resolve_identity(
        &self,
        provider: &str,
        uid: &str,
        auth: AuthSource,
    ) -> Result<Identity, StoreError> {
        let mut identity = self
            .store
            .find_by_provider_uid(provider, uid)
            .await?
            .map_or_else(|| Identity::new(provider, uid), Identity::from_record);

        identity.set_auth_source(auth);
        Ok(identity)
    }

    /// Load a persisted identity by id
    pub async fn find(&self, id: i64) -> Result<Option<Identity>, StoreError> {
        Ok(self.store.find_by_id(id).await?.map(Identity::from_record))
    }

    /// Persist an identity, firing the identity hooks
    ///
    /// `on_before_create` and `on_after_create` bracket the first insert;
    /// `on_member_linked` fires before any write that changes the member link.
    /// Writing a persisted identity with no changes is a no-op.
    pub async fn write(&self, identity: &mut Identity) -> Result<(), StoreError> {
        let linked = identity.is_member_changed();

        match identity.id() {
            None => {
                self.hooks.before_create(identity);
                if linked {
                    self.hooks.member_linked(identity);
                }

                let id = self
                    .store
                    .insert(identity.provider(), identity.uid(), identity.member_id())
                    .await?;
                identity.mark_persisted(id);

                tracing::debug!(
                    provider = %identity.provider(),
                    uid = %identity.uid(),
                    identity_id = id,
                    "Identity created"
                );
                self.hooks.after_create(identity);
            }
            Some(id) if linked => {
                self.hooks.member_linked(identity);
                self.store.update_member(id, identity.member_id()).await?;
                identity.mark_persisted(id);

                tracing::debug!(
                    identity_id = id,
                    member_id = ?identity.member_id(),
                    "Identity linked to member"
                );
            }
            Some(_) => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingRule;
    use mockall::predicate::eq;
    use parking_lot::Mutex;
    use serde_json::json;

    fn record(id: i64, member_id: Option<i64>) -> IdentityRecord {
        IdentityRecord {
            id,
            provider: "Google".to_string(),
            uid: "42".to_string(),
            member_id,
        }
    }

    fn auth() -> AuthSource {
        AuthSource::new(json!({"provider": "Google", "uid": "42", "info": {"email": "a@b.com"}}))
    }

    #[tokio::test]
    async fn test_resolve_existing_identity() {
        let mut store = MockIdentityStore::new();
        store
            .expect_find_by_provider_uid()
            .withf(|provider, uid| provider == "Google" && uid == "42")
            .returning(|_, _| Ok(Some(record(5, Some(9)))));

        let registry = IdentityRegistry::new(Arc::new(store), Arc::default());
        let identity = registry.resolve_identity("Google", "42", auth()).await.unwrap();

        assert_eq!(identity.id(), Some(5));
        assert_eq!(identity.member_id(), Some(9));
        assert!(!identity.is_member_changed());
        assert!(identity.auth_source().is_some());
    }

    #[tokio::test]
    async fn test_resolve_unknown_identity_is_unpersisted() {
        let mut store = MockIdentityStore::new();
        store.expect_find_by_provider_uid().returning(|_, _| Ok(None));

        let registry = IdentityRegistry::new(Arc::new(store), Arc::default());
        let identity = registry.resolve_identity("Google", "42", auth()).await.unwrap();

        assert!(!identity.is_persisted());
        assert_eq!(identity.provider(), "Google");
        assert_eq!(identity.uid(), "42");
        assert_eq!(identity.member_id(), None);
    }

    #[tokio::test]
    async fn test_write_new_identity_fires_hooks_in_order() {
        let mut store = MockIdentityStore::new();
        store
            .expect_insert()
            .withf(|provider, uid, member_id| {
                provider == "Google" && uid == "42" && *member_id == Some(3)
            })
            .times(1)
            .returning(|_, _, _| Ok(11));

        let calls = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (calls.clone(), calls.clone(), calls.clone());
        let hooks = ExtensionHooks::new()
            .on_before_create(move |i| a.lock().push(format!("before:{:?}", i.id())))
            .on_member_linked(move |i| b.lock().push(format!("linked:{:?}", i.member_id())))
            .on_after_create(move |i| c.lock().push(format!("after:{:?}", i.id())));

        let registry = IdentityRegistry::new(Arc::new(store), Arc::new(hooks));
        let mut identity = Identity::new("Google", "42");
        identity.set_member_id(Some(3));
        registry.write(&mut identity).await.unwrap();

        assert_eq!(identity.id(), Some(11));
        assert!(!identity.is_member_changed());
        assert_eq!(
            *calls.lock(),
            vec!["before:None", "linked:Some(3)", "after:Some(11)"]
        );
    }

    #[tokio::test]
    async fn test_write_relink_updates_member() {
        let mut store = MockIdentityStore::new();
        store
            .expect_update_member()
            .with(eq(5), eq(Some(8)))
            .times(1)
            .returning(|_, _| Ok(()));
        store.expect_insert().never();

        let registry = IdentityRegistry::new(Arc::new(store), Arc::default());
        let mut identity = Identity::from_record(record(5, None));
        identity.set_member_id(Some(8));
        registry.write(&mut identity).await.unwrap();

        assert!(!identity.is_member_changed());
    }

    #[tokio::test]
    async fn test_write_unchanged_identity_is_noop() {
        let mut store = MockIdentityStore::new();
        store.expect_update_member().never();
        store.expect_insert().never();

        let registry = IdentityRegistry::new(Arc::new(store), Arc::default());
        let mut identity = Identity::from_record(record(5, Some(1)));
        registry.write(&mut identity).await.unwrap();
    }

    #[test]
    fn test_member_record_cached_until_source_replaced() {
        let mapper = FieldMapper::new().with_rule("Google", "Email", MappingRule::path("info.email"));
        let mut identity = Identity::new("Google", "42");
        identity.set_auth_source(auth());

        assert_eq!(identity.member_record(&mapper)["Email"], "a@b.com");

        identity.set_auth_source(AuthSource::new(json!({"info": {"email": "c@d.com"}})));
        assert_eq!(identity.member_record(&mapper)["Email"], "c@d.com");
    }
}
