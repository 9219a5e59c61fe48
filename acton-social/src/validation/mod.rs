//! Provider response validation
//!
//! [`ResponseValidator`] checks a raw callback payload in a fixed order, each
//! step with its own failure mode:
//!
//! 1. a non-empty `error` component fails with [`ValidationError::ProviderError`]
//! 2. `auth`, `timestamp` and `signature` must be present
//! 3. `auth.provider` and `auth.uid` must be present
//! 4. the signature over the canonical `auth` digest must verify
//!
//! Validation has no side effects.

pub mod signature;

pub use signature::{auth_digest, canonical_json, SaltedSignatureVerifier, SignatureVerifier};

use crate::auth_source::{is_blank, scalar_to_string, AuthSource, RawResponse};
use std::sync::Arc;
use thiserror::Error;

/// Why a provider response was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The provider reported a failure
    #[error("OAuth provider error from {provider}")]
    ProviderError {
        /// Provider name reported with the error
        provider: String,
    },

    /// A required component is absent or empty
    #[error("Required component missing")]
    MissingComponent {
        /// Name of the missing component
        component: String,
    },

    /// The signature check failed
    #[error("Invalid auth response")]
    InvalidSignature {
        /// Reason given by the verifier
        reason: String,
    },
}

impl ValidationError {
    /// Message shown to the visitor
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderError { provider } => {
                format!("There was a problem logging in with {provider}.")
            }
            Self::MissingComponent { .. } | Self::InvalidSignature { .. } => {
                format!("There was a problem logging in - {self}")
            }
        }
    }
}

/// A response that passed every validation step
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    /// The `auth` substructure
    pub auth: AuthSource,
    /// `auth.provider`
    pub provider: String,
    /// `auth.uid`
    pub uid: String,
    /// Response timestamp
    pub timestamp: String,
    /// Response signature
    pub signature: String,
}

/// Validates raw provider responses
#[derive(Clone)]
pub struct ResponseValidator {
    verifier: Arc<dyn SignatureVerifier>,
}

impl std::fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseValidator")
            .field("verifier", &"SignatureVerifier")
            .finish()
    }
}

impl ResponseValidator {
    /// Create a validator delegating signature checks to `verifier`
    #[must_use]
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    /// Validate a raw response
    ///
    /// # Errors
    ///
    /// Returns the first failing step as a [`ValidationError`]
    pub fn validate(&self, response: &RawResponse) -> Result<ValidatedResponse, ValidationError> {
        if !is_blank(response.component("error")) {
            let provider = response
                .component("error")
                .and_then(|e| e.get("provider"))
                .and_then(scalar_to_string)
                .or_else(|| response.auth().and_then(|a| a.provider()))
                .unwrap_or_else(|| "unknown".to_string());

            tracing::warn!(provider = %provider, error = %response.as_value()["error"], "Provider reported an error");
            return Err(ValidationError::ProviderError { provider });
        }

        for component in ["auth", "timestamp", "signature"] {
            if is_blank(response.component(component)) {
                return Err(missing(component));
            }
        }

        let auth = response.auth().ok_or_else(|| missing("auth"))?;
        let provider = auth.provider().ok_or_else(|| missing("provider"))?;
        let uid = auth.uid().ok_or_else(|| missing("uid"))?;

        let timestamp = response
            .component("timestamp")
            .and_then(scalar_to_string)
            .ok_or_else(|| missing("timestamp"))?;
        let signature = response
            .component("signature")
            .and_then(scalar_to_string)
            .ok_or_else(|| missing("signature"))?;

        self.verifier
            .verify(&auth_digest(&auth), &timestamp, &signature)
            .map_err(|reason| {
                tracing::warn!(provider = %provider, uid = %uid, reason = %reason, "Invalid auth response");
                ValidationError::InvalidSignature { reason }
            })?;

        Ok(ValidatedResponse {
            auth,
            provider,
            uid,
            timestamp,
            signature,
        })
    }
}

fn missing(component: &str) -> ValidationError {
    tracing::warn!(component = %component, "Required component missing from auth response");
    ValidationError::MissingComponent {
        component: component.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::signature::MockSignatureVerifier;
    use super::*;
    use serde_json::json;

    fn accepting() -> ResponseValidator {
        let mut verifier = MockSignatureVerifier::new();
        verifier.expect_verify().returning(|_, _, _| Ok(()));
        ResponseValidator::new(Arc::new(verifier))
    }

    fn untouched() -> ResponseValidator {
        let mut verifier = MockSignatureVerifier::new();
        verifier.expect_verify().never();
        ResponseValidator::new(Arc::new(verifier))
    }

    fn complete() -> serde_json::Value {
        json!({
            "auth": {"provider": "Google", "uid": "42", "info": {"email": "a@b.com"}},
            "timestamp": "2024-01-01T00:00:00Z",
            "signature": "abc"
        })
    }

    #[test]
    fn test_valid_response() {
        let validated = accepting().validate(&RawResponse::new(complete())).unwrap();
        assert_eq!(validated.provider, "Google");
        assert_eq!(validated.uid, "42");
        assert_eq!(validated.signature, "abc");
    }

    #[test]
    fn test_provider_error_reported_first() {
        let mut raw = complete();
        raw["error"] = json!({"provider": "Facebook", "code": "access_denied"});
        raw.as_object_mut().unwrap().remove("signature");

        let err = untouched().validate(&RawResponse::new(raw)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ProviderError {
                provider: "Facebook".to_string()
            }
        );
    }

    #[test]
    fn test_provider_error_falls_back_to_auth_provider() {
        let mut raw = complete();
        raw["error"] = json!("denied");

        let err = untouched().validate(&RawResponse::new(raw)).unwrap_err();
        assert_eq!(err.user_message(), "There was a problem logging in with Google.");
    }

    #[test]
    fn test_missing_top_level_components() {
        for component in ["auth", "timestamp", "signature"] {
            let mut raw = complete();
            raw.as_object_mut().unwrap().remove(component);

            let err = untouched().validate(&RawResponse::new(raw)).unwrap_err();
            assert_eq!(
                err,
                ValidationError::MissingComponent {
                    component: component.to_string()
                }
            );
        }
    }

    #[test]
    fn test_missing_uid() {
        let mut raw = complete();
        raw["auth"].as_object_mut().unwrap().remove("uid");

        let err = untouched().validate(&RawResponse::new(raw)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingComponent {
                component: "uid".to_string()
            }
        );
    }

    #[test]
    fn test_empty_provider_is_missing() {
        let mut raw = complete();
        raw["auth"]["provider"] = json!("");

        let err = untouched().validate(&RawResponse::new(raw)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingComponent {
                component: "provider".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_signature() {
        let mut verifier = MockSignatureVerifier::new();
        verifier
            .expect_verify()
            .withf(|input, timestamp, signature| {
                input.len() == 64
                    && timestamp.to_string() == "2024-01-01T00:00:00Z"
                    && signature.to_string() == "abc"
            })
            .times(1)
            .returning(|_, _, _| Err("Signature does not validate".to_string()));

        let err = ResponseValidator::new(Arc::new(verifier))
            .validate(&RawResponse::new(complete()))
            .unwrap_err();

        assert_eq!(
            err,
            ValidationError::InvalidSignature {
                reason: "Signature does not validate".to_string()
            }
        );
        assert_eq!(err.user_message(), "There was a problem logging in - Invalid auth response");
    }

    #[test]
    fn test_real_verifier_round_trip() {
        let verifier = SaltedSignatureVerifier::new("salt", 2, 300);
        let auth = AuthSource::new(json!({"provider": "GitHub", "uid": 7}));
        let timestamp = chrono::Utc::now().to_rfc3339();
        let raw = RawResponse::new(json!({
            "auth": auth.as_value(),
            "timestamp": timestamp,
            "signature": verifier.sign(&auth, &timestamp),
        }));

        let validated = ResponseValidator::new(Arc::new(verifier)).validate(&raw).unwrap();
        assert_eq!(validated.uid, "7");
    }
}
