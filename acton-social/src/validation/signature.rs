//! Response signatures
//!
//! The `auth` substructure is serialised canonically (object keys sorted at
//! every depth, no insignificant whitespace) and hashed with SHA-256. The
//! transport signs `hex(sha256(canonical_json(auth)))` by hashing it together
//! with the response timestamp and a shared salt, `security_iterations` times:
//!
//! ```text
//! h0 = hex(sha256(canonical_json(auth)))
//! hN = hex(sha256(h(N-1) || timestamp || salt))
//! ```

use crate::auth_source::AuthSource;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Checks the authenticity of a provider response
///
/// `input` is the canonical digest of the `auth` substructure. An `Err`
/// carries the reason shown to the visitor.
#[cfg_attr(test, mockall::automock)]
pub trait SignatureVerifier: Send + Sync {
    /// Verify a signature for the given digest and timestamp
    ///
    /// # Errors
    ///
    /// Returns the failure reason when the signature does not validate
    fn verify(&self, input: &str, timestamp: &str, signature: &str) -> Result<(), String>;
}

/// Serialise a JSON value with object keys sorted at every depth
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Digest of the `auth` substructure that signatures are computed over
#[must_use]
pub fn auth_digest(auth: &AuthSource) -> String {
    sha256_hex(canonical_json(auth.as_value()).as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Salted, iterated SHA-256 signatures with an expiry window
#[derive(Debug, Clone)]
pub struct SaltedSignatureVerifier {
    salt: String,
    iterations: u32,
    timeout: Duration,
}

impl SaltedSignatureVerifier {
    /// Create a verifier
    ///
    /// `iterations` below one is treated as one.
    #[must_use]
    pub fn new(salt: impl Into<String>, iterations: u32, timeout_secs: u64) -> Self {
        Self {
            salt: salt.into(),
            iterations: iterations.max(1),
            timeout: Duration::seconds(i64::try_from(timeout_secs).unwrap_or(i64::MAX)),
        }
    }

    /// Sign an `auth` substructure for the given timestamp
    #[must_use]
    pub fn sign(&self, auth: &AuthSource, timestamp: &str) -> String {
        self.sign_digest(&auth_digest(auth), timestamp)
    }

    fn sign_digest(&self, input: &str, timestamp: &str) -> String {
        (0..self.iterations).fold(input.to_string(), |hash, _| {
            sha256_hex(format!("{hash}{timestamp}{}", self.salt).as_bytes())
        })
    }

    fn check_timestamp(&self, timestamp: &str, now: DateTime<Utc>) -> Result<(), String> {
        let issued = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| "Invalid timestamp".to_string())?
            .with_timezone(&Utc);

        if now.signed_duration_since(issued) > self.timeout {
            return Err("Auth response expired".to_string());
        }
        Ok(())
    }
}

impl SignatureVerifier for SaltedSignatureVerifier {
    fn verify(&self, input: &str, timestamp: &str, signature: &str) -> Result<(), String> {
        self.check_timestamp(timestamp, Utc::now())?;

        let expected = self.sign_digest(input, timestamp);
        if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            Ok(())
        } else {
            Err("Signature does not validate".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": [3, {"y": true, "x": null}], "c": "s"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"s","z":[3,{"x":null,"y":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let verifier = SaltedSignatureVerifier::new("pepper", 3, 120);
        let auth = AuthSource::new(json!({"provider": "Google", "uid": "42"}));
        let timestamp = Utc::now().to_rfc3339();

        let signature = verifier.sign(&auth, &timestamp);
        assert!(verifier.verify(&auth_digest(&auth), &timestamp, &signature).is_ok());
    }

    #[test]
    fn test_tampered_auth_fails() {
        let verifier = SaltedSignatureVerifier::new("pepper", 1, 120);
        let auth = AuthSource::new(json!({"provider": "Google", "uid": "42"}));
        let forged = AuthSource::new(json!({"provider": "Google", "uid": "43"}));
        let timestamp = Utc::now().to_rfc3339();

        let signature = verifier.sign(&auth, &timestamp);
        let err = verifier
            .verify(&auth_digest(&forged), &timestamp, &signature)
            .unwrap_err();
        assert_eq!(err, "Signature does not validate");
    }

    #[test]
    fn test_expired_response() {
        let verifier = SaltedSignatureVerifier::new("pepper", 1, 120);
        let auth = AuthSource::new(json!({"uid": "1"}));
        let timestamp = (Utc::now() - Duration::seconds(600)).to_rfc3339();

        let signature = verifier.sign(&auth, &timestamp);
        let err = verifier
            .verify(&auth_digest(&auth), &timestamp, &signature)
            .unwrap_err();
        assert_eq!(err, "Auth response expired");
    }

    #[test]
    fn test_invalid_timestamp() {
        let verifier = SaltedSignatureVerifier::new("pepper", 1, 120);
        let err = verifier.verify("digest", "yesterday", "sig").unwrap_err();
        assert_eq!(err, "Invalid timestamp");
    }

    #[test]
    fn test_salt_changes_signature() {
        let auth = AuthSource::new(json!({"uid": "1"}));
        let a = SaltedSignatureVerifier::new("one", 1, 120).sign(&auth, "t");
        let b = SaltedSignatureVerifier::new("two", 1, 120).sign(&auth, "t");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    proptest! {
        #[test]
        fn canonical_json_ignores_insertion_order(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let mut forward = serde_json::Map::new();
            for (k, v) in &entries {
                forward.insert(k.clone(), json!({"n": v, "k": k}));
            }
            let mut reverse = serde_json::Map::new();
            for (k, v) in entries.iter().rev() {
                reverse.insert(k.clone(), json!({"k": k, "n": v}));
            }

            let canonical = canonical_json(&Value::Object(forward));
            prop_assert_eq!(&canonical, &canonical_json(&Value::Object(reverse)));
            prop_assert!(!canonical.contains(' '));
        }
    }
}
