//! Record-level member validation

use super::{Member, EMAIL};
use crate::forms::ValidationErrors;
use validator::ValidateEmail;

/// Checks that a member can be registered
#[derive(Debug, Clone)]
pub struct MemberValidator {
    required_fields: Vec<String>,
}

impl Default for MemberValidator {
    fn default() -> Self {
        Self::new(vec![EMAIL.to_string()])
    }
}

impl MemberValidator {
    /// Validator requiring the given fields
    #[must_use]
    pub const fn new(required_fields: Vec<String>) -> Self {
        Self { required_fields }
    }

    /// Fields a member must have
    #[must_use]
    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Validate a member, collecting every failure
    #[must_use]
    pub fn validate(&self, member: &Member) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        for field in &self.required_fields {
            if member.field(field).is_none() {
                errors.add_with_code(field, format!("{field} is required"), "required");
            }
        }

        if let Some(email) = member.field(EMAIL) {
            if !email.to_string().validate_email() {
                errors.add_with_code(EMAIL, "Please enter a valid email address", "email");
            }
        }

        errors
    }

    /// Whether a member passes validation
    #[must_use]
    pub fn is_valid(&self, member: &Member) -> bool {
        !self.validate(member).has_errors()
    }
}
