//! Form handling for the profile completion step
//!
//! [`ProfileCompletionForm`] holds the partially filled member as a
//! field-to-value map. The same shape is stashed in the session when a
//! registration is suspended and posted back by the completion form, so every
//! projected field survives the round trip, including `Locale` and any extra
//! mapped field.

pub mod error;

pub use error::{FieldError, ValidationErrors};

use crate::mapping::MemberRecord;
use crate::member::{Member, EMAIL, FIRST_NAME, SURNAME};
use serde::{Deserialize, Serialize};
use validator::ValidateLength;

/// Fields the completion form always offers, in display order
pub const FORM_FIELDS: [&str; 3] = [FIRST_NAME, SURNAME, EMAIL];

const MAX_FIELD_LENGTH: u64 = 100;
const MAX_EMAIL_LENGTH: u64 = 254;

/// Member details carried through the completion form
///
/// Values may be empty: an empty entry is a field the form offers but the
/// visitor has not filled in yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileCompletionForm {
    fields: MemberRecord,
}

impl ProfileCompletionForm {
    /// Empty form
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Form for a suspended registration
    ///
    /// Offers [`FORM_FIELDS`], every `required` field, and every field the
    /// member already carries, prefilled with the member's values.
    #[must_use]
    pub fn for_member(member: &Member, required: &[String]) -> Self {
        let mut fields: MemberRecord = FORM_FIELDS
            .iter()
            .map(|name| ((*name).to_string(), String::new()))
            .collect();
        for name in required {
            fields.entry(name.clone()).or_default();
        }
        fields.extend(member.to_record());
        Self { fields }
    }

    /// Set a field value
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Current value of a field, empty if offered but unfilled
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Offered fields: [`FORM_FIELDS`] first, then the rest by name
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        let standard = FORM_FIELDS
            .iter()
            .filter_map(|name| self.fields.get_key_value(*name))
            .map(|(name, _)| name.as_str());
        let rest = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|name| !FORM_FIELDS.iter().any(|standard| standard == name));
        standard.chain(rest)
    }

    /// Overlay a submission onto this form
    ///
    /// Only fields this form offers, [`FORM_FIELDS`] and `required` fields
    /// are taken from `submitted`; anything else posted is ignored. Values
    /// are trimmed.
    #[must_use]
    pub fn apply_submission(&self, submitted: &Self, required: &[String]) -> Self {
        let mut merged = self.clone();
        let offered = FORM_FIELDS
            .iter()
            .map(|name| (*name).to_string())
            .chain(required.iter().cloned());
        for name in offered {
            merged.fields.entry(name).or_default();
        }
        for (name, value) in &submitted.fields {
            if let Some(slot) = merged.fields.get_mut(name) {
                *slot = value.trim().to_string();
            }
        }
        merged
    }

    /// Build a new member from the filled-in values
    #[must_use]
    pub fn to_member(&self) -> Member {
        let mut member = Member::default();
        for (name, value) in &self.fields {
            if !value.is_empty() {
                member.set_field(name, value.clone());
            }
        }
        member
    }

    /// Length checks on the submitted values, keyed by member field name
    #[must_use]
    pub fn check(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for (name, value) in &self.fields {
            let max = if name == EMAIL {
                MAX_EMAIL_LENGTH
            } else {
                MAX_FIELD_LENGTH
            };
            if !value.validate_length(None, Some(max), None) {
                errors.add_with_code(
                    name.clone(),
                    format!("{} must be at most {max} characters", field_label(name)),
                    "length",
                );
            }
        }
        errors
    }
}

/// Human label for a member field name
///
/// ```rust
/// use acton_social::forms::field_label;
///
/// assert_eq!(field_label("FirstName"), "First name");
/// assert_eq!(field_label("Locale"), "Locale");
/// ```
#[must_use]
pub fn field_label(name: &str) -> String {
    let mut label = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if i > 0 && c.is_uppercase() {
            label.push(' ');
            label.extend(c.to_lowercase());
        } else {
            label.push(c);
        }
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::LOCALE;

    fn required(fields: &[&str]) -> Vec<String> {
        fields.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_form_deserializes_posted_fields() {
        let form: ProfileCompletionForm =
            serde_json::from_value(serde_json::json!({"FirstName": "Ada", "Email": "a@b.com"}))
                .unwrap();
        assert_eq!(form.value(FIRST_NAME), Some("Ada"));
        assert_eq!(form.value(SURNAME), None);
        assert_eq!(form.value(EMAIL), Some("a@b.com"));
    }

    #[test]
    fn test_for_member_offers_required_and_carried_fields() {
        let mut member = Member::default();
        member.set_field(LOCALE, "en_NZ");
        member.set_field("Nickname", "ace");

        let form = ProfileCompletionForm::for_member(&member, &required(&[EMAIL, "Phone"]));
        let names: Vec<&str> = form.field_names().collect();
        assert_eq!(
            names,
            vec![FIRST_NAME, SURNAME, EMAIL, LOCALE, "Nickname", "Phone"]
        );
        assert_eq!(form.value(LOCALE), Some("en_NZ"));
        assert_eq!(form.value("Phone"), Some(""));
    }

    #[test]
    fn test_apply_submission_keeps_carried_fields() {
        let mut member = Member::default();
        member.set_field(LOCALE, "en_NZ");
        let stashed = ProfileCompletionForm::for_member(&member, &required(&[EMAIL]));

        let submitted = ProfileCompletionForm::new()
            .with_field(EMAIL, " a@b.com ")
            .with_field("Admin", "yes");
        let merged = stashed.apply_submission(&submitted, &required(&[EMAIL]));

        let member = merged.to_member();
        assert_eq!(member.email.as_deref(), Some("a@b.com"));
        assert_eq!(member.locale.as_deref(), Some("en_NZ"));
        assert_eq!(member.field("Admin"), None);
    }

    #[test]
    fn test_submission_can_clear_a_field() {
        let stashed = ProfileCompletionForm::new().with_field(FIRST_NAME, "Ada");
        let merged =
            stashed.apply_submission(&ProfileCompletionForm::new().with_field(FIRST_NAME, "  "), &[]);

        assert_eq!(merged.value(FIRST_NAME), Some(""));
        assert_eq!(merged.to_member().first_name, None);
        assert!(!merged.to_member().is_persisted());
    }

    #[test]
    fn test_check_uses_member_field_names() {
        let form = ProfileCompletionForm::new()
            .with_field(FIRST_NAME, "x".repeat(101))
            .with_field(EMAIL, "a@b.com");
        let errors = form.check();
        assert!(errors.has_field_error(FIRST_NAME));
        assert_eq!(
            errors.for_field(FIRST_NAME)[0].message,
            "First name must be at most 100 characters"
        );
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn test_for_member_round_trip() {
        let mut member = Member::default();
        member.set_field(EMAIL, "a@b.com");
        member.set_field(LOCALE, "en_GB");
        let form = ProfileCompletionForm::for_member(&member, &[]);
        assert_eq!(form.to_member(), member);
    }
}
