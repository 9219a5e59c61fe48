//! Projection of provider payloads onto member fields
//!
//! Each provider has a [`FieldMapping`]: target member field name to a
//! [`MappingRule`], either a dotted path into the auth payload or a named
//! transform. Projection never fails; missing paths and empty results are
//! simply left out of the [`MemberRecord`].

use crate::auth_source::AuthSource;
use crate::config::ConfigError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Member field name to value
pub type MemberRecord = BTreeMap<String, String>;

/// Computes a field value from the whole auth payload
pub type TransformFn = Arc<dyn Fn(&AuthSource) -> Option<String> + Send + Sync>;

/// Prefix marking a transform rule in configuration
pub const TRANSFORM_PREFIX: &str = "fn:";

/// How one member field is derived
#[derive(Clone)]
pub enum MappingRule {
    /// Dotted path into the payload, e.g. `info.email`
    Path(String),
    /// Named transform
    Transform {
        /// Registered name
        name: String,
        /// The transform itself
        transform: TransformFn,
    },
}

impl std::fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Transform { name, .. } => f.debug_tuple("Transform").field(name).finish(),
        }
    }
}

impl MappingRule {
    /// Dotted path rule
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// Transform rule
    #[must_use]
    pub fn transform(
        name: impl Into<String>,
        transform: impl Fn(&AuthSource) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self::Transform {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    fn evaluate(&self, auth: &AuthSource) -> Option<String> {
        let value = match self {
            Self::Path(path) => auth.string_at(path),
            Self::Transform { transform, .. } => transform(auth),
        };
        value.filter(|value| !value.is_empty())
    }
}

/// Named transforms available to configuration rules
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, TransformFn>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.transforms.keys()).finish()
    }
}

impl TransformRegistry {
    /// Registry holding the built-in transforms
    ///
    /// - `first_name`: `info.first_name`, else the first word of `info.name`
    /// - `last_name`: `info.last_name`, else the remaining words of `info.name`
    /// - `email`: `info.email`
    /// - `name`: `info.name`
    #[must_use]
    pub fn builtin() -> Self {
        Self::default()
            .with("first_name", |auth| {
                auth.string_at("info.first_name").or_else(|| {
                    auth.string_at("info.name")
                        .and_then(|name| name.split_whitespace().next().map(str::to_string))
                })
            })
            .with("last_name", |auth| {
                auth.string_at("info.last_name").or_else(|| {
                    auth.string_at("info.name").map(|name| {
                        name.split_whitespace().skip(1).collect::<Vec<_>>().join(" ")
                    })
                })
            })
            .with("email", |auth| auth.string_at("info.email"))
            .with("name", |auth| auth.string_at("info.name"))
    }

    /// Register a transform, replacing any of the same name
    #[must_use]
    pub fn with(
        mut self,
        name: impl Into<String>,
        transform: impl Fn(&AuthSource) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.transforms.insert(name.into(), Arc::new(transform));
        self
    }

    /// Look up a transform by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TransformFn> {
        self.transforms.get(name).cloned()
    }
}

/// Rules for one provider
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    rules: BTreeMap<String, MappingRule>,
}

impl FieldMapping {
    /// Add a rule for `field`
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, rule: MappingRule) -> Self {
        self.rules.insert(field.into(), rule);
        self
    }

    /// Parse rules from configuration strings
    ///
    /// # Errors
    ///
    /// Returns an error for empty rules and unknown transform names
    pub fn from_config(
        provider: &str,
        rules: &BTreeMap<String, String>,
        transforms: &TransformRegistry,
    ) -> Result<Self, ConfigError> {
        rules
            .iter()
            .try_fold(Self::default(), |mapping, (field, rule)| {
                parse_rule(provider, field, rule, transforms).map(|rule| mapping.with(field, rule))
            })
    }

    /// Evaluate every rule against `auth`
    #[must_use]
    pub fn project(&self, auth: &AuthSource) -> MemberRecord {
        self.rules
            .iter()
            .filter_map(|(field, rule)| rule.evaluate(auth).map(|value| (field.clone(), value)))
            .collect()
    }
}

fn parse_rule(
    provider: &str,
    field: &str,
    rule: &str,
    transforms: &TransformRegistry,
) -> Result<MappingRule, ConfigError> {
    let rule = rule.trim();
    if let Some(name) = rule.strip_prefix(TRANSFORM_PREFIX) {
        let name = name.trim();
        return transforms
            .get(name)
            .map(|transform| MappingRule::Transform {
                name: name.to_string(),
                transform,
            })
            .ok_or_else(|| ConfigError::UnknownTransform {
                provider: provider.to_string(),
                field: field.to_string(),
                name: name.to_string(),
            });
    }

    if rule.is_empty() || rule.split('.').any(str::is_empty) {
        return Err(ConfigError::InvalidRule {
            provider: provider.to_string(),
            field: field.to_string(),
            rule: rule.to_string(),
        });
    }

    Ok(MappingRule::path(rule))
}

/// Per-provider projection of auth payloads into member records
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    mappings: BTreeMap<String, FieldMapping>,
}

impl FieldMapper {
    /// Mapper with no providers configured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `member_mapper` configuration table
    ///
    /// # Errors
    ///
    /// Returns an error if any rule is malformed or names an unknown transform
    pub fn from_config(
        config: &BTreeMap<String, BTreeMap<String, String>>,
        transforms: &TransformRegistry,
    ) -> Result<Self, ConfigError> {
        let mappings = config
            .iter()
            .map(|(provider, rules)| {
                FieldMapping::from_config(provider, rules, transforms)
                    .map(|mapping| (provider.clone(), mapping))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { mappings })
    }

    /// Set the mapping for a provider
    #[must_use]
    pub fn with_mapping(mut self, provider: impl Into<String>, mapping: FieldMapping) -> Self {
        self.mappings.insert(provider.into(), mapping);
        self
    }

    /// Add one rule to a provider's mapping
    #[must_use]
    pub fn with_rule(
        mut self,
        provider: impl Into<String>,
        field: impl Into<String>,
        rule: MappingRule,
    ) -> Self {
        let provider = provider.into();
        let mapping = self.mappings.remove(&provider).unwrap_or_default();
        self.mappings.insert(provider, mapping.with(field, rule));
        self
    }

    /// Project `auth` using the mapping for `provider`
    ///
    /// Provider keys match case-insensitively. Unknown providers yield an
    /// empty record.
    #[must_use]
    pub fn project(&self, provider: &str, auth: &AuthSource) -> MemberRecord {
        self.mapping_for(provider)
            .map(|mapping| mapping.project(auth))
            .unwrap_or_default()
    }

    fn mapping_for(&self, provider: &str) -> Option<&FieldMapping> {
        self.mappings.get(provider).or_else(|| {
            self.mappings
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(provider))
                .map(|(_, mapping)| mapping)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn facebook() -> AuthSource {
        AuthSource::new(json!({
            "provider": "Facebook",
            "uid": "99",
            "info": {"name": "Grace Brewster Hopper", "email": "grace@navy.mil"}
        }))
    }

    fn config(rules: &[(&str, &str)]) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut table = BTreeMap::new();
        table.insert(
            "facebook".to_string(),
            rules
                .iter()
                .map(|(f, r)| ((*f).to_string(), (*r).to_string()))
                .collect(),
        );
        table
    }

    #[test]
    fn test_paths_and_transforms() {
        let mapper = FieldMapper::from_config(
            &config(&[
                ("Email", "info.email"),
                ("FirstName", "fn:first_name"),
                ("Surname", "fn:last_name"),
                ("Locale", "info.locale"),
            ]),
            &TransformRegistry::builtin(),
        )
        .unwrap();

        let record = mapper.project("Facebook", &facebook());
        assert_eq!(record["Email"], "grace@navy.mil");
        assert_eq!(record["FirstName"], "Grace");
        assert_eq!(record["Surname"], "Brewster Hopper");
        assert!(!record.contains_key("Locale"));
    }

    #[test]
    fn test_unknown_provider_yields_empty_record() {
        let mapper = FieldMapper::new().with_rule("Google", "Email", MappingRule::path("info.email"));
        assert!(mapper.project("Twitter", &facebook()).is_empty());
    }

    #[test]
    fn test_unknown_transform_is_config_error() {
        let err = FieldMapper::from_config(
            &config(&[("FirstName", "fn:nope")]),
            &TransformRegistry::builtin(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransform { name, .. } if name == "nope"));
    }

    #[test]
    fn test_malformed_path_is_config_error() {
        let err = FieldMapper::from_config(
            &config(&[("Email", "info..email")]),
            &TransformRegistry::builtin(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { .. }));
    }

    #[test]
    fn test_custom_transform() {
        let transforms = TransformRegistry::builtin()
            .with("shout", |auth| auth.string_at("info.name").map(|n| n.to_uppercase()));
        let mapper =
            FieldMapper::from_config(&config(&[("Nickname", "fn:shout")]), &transforms).unwrap();

        assert_eq!(mapper.project("facebook", &facebook())["Nickname"], "GRACE BREWSTER HOPPER");
    }

    #[test]
    fn test_single_word_name_has_no_surname() {
        let mapper = FieldMapper::from_config(
            &config(&[("Surname", "fn:last_name")]),
            &TransformRegistry::builtin(),
        )
        .unwrap();
        let auth = AuthSource::new(json!({"info": {"name": "Cher"}}));
        assert!(mapper.project("facebook", &auth).is_empty());
    }

    proptest! {
        #[test]
        fn projection_is_total(name in ".*", email in any::<Option<String>>(), depth in 0usize..4) {
            let mut info = json!({"name": name});
            if let Some(email) = email {
                info["email"] = json!(email);
            }
            let mut payload = json!({"info": info});
            for _ in 0..depth {
                payload = json!({"info": payload});
            }

            let mapper = FieldMapper::from_config(
                &config(&[
                    ("Email", "info.email"),
                    ("FirstName", "fn:first_name"),
                    ("Surname", "fn:last_name"),
                ]),
                &TransformRegistry::builtin(),
            ).unwrap();

            let record = mapper.project("facebook", &AuthSource::new(payload));
            prop_assert!(record.values().all(|v| !v.is_empty()));
        }
    }
}
