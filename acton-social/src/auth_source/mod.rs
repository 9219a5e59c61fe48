//! Provider responses and the transports that carry them
//!
//! A provider response is a nested structure:
//!
//! ```json
//! {
//!   "auth": { "provider": "Google", "uid": "1234", "info": { "email": "..." } },
//!   "timestamp": "2024-01-01T00:00:00Z",
//!   "signature": "...",
//!   "error": { "provider": "Google", "message": "..." }
//! }
//! ```
//!
//! It reaches the callback either through the session (`opauth` key) or as
//! base64 encoded JSON in an `opauth` query or form parameter.

use crate::config::CallbackTransport;
use crate::session::Session;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Session key and request parameter carrying the provider response
pub const RESPONSE_KEY: &str = "opauth";

/// Untrusted provider response as received by the callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawResponse(Value);

impl RawResponse {
    /// Wrap a JSON value
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// An empty response, used when a transport carried nothing readable
    #[must_use]
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Decode a base64 encoded JSON response
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the input is not valid base64
    /// or does not contain JSON
    pub fn decode(encoded: &str) -> Result<Self, String> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("invalid base64: {e}"))?;
        serde_json::from_slice(&bytes)
            .map(Self)
            .map_err(|e| format!("invalid payload: {e}"))
    }

    /// Encode this response for the `get`/`post` transports
    #[must_use]
    pub fn encode(&self) -> String {
        STANDARD.encode(self.0.to_string())
    }

    /// Top-level component by name
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `auth` substructure, if present
    #[must_use]
    pub fn auth(&self) -> Option<AuthSource> {
        self.0.get("auth").cloned().map(AuthSource)
    }

    /// The raw JSON value
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

/// The `auth` portion of a provider response
///
/// Transient: lives for one callback and is only ever projected into member
/// fields, never stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthSource(Value);

impl AuthSource {
    /// Wrap a JSON value
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Provider key (`auth.provider`)
    #[must_use]
    pub fn provider(&self) -> Option<String> {
        self.string_at("provider")
    }

    /// Provider-scoped subject id (`auth.uid`)
    #[must_use]
    pub fn uid(&self) -> Option<String> {
        self.string_at("uid")
    }

    /// Walk a dotted path such as `info.email`
    ///
    /// Returns `None` on any missing segment.
    #[must_use]
    pub fn path(&self, dotted: &str) -> Option<&Value> {
        dotted
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.0, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Scalar at a dotted path rendered as a string, `None` when empty
    #[must_use]
    pub fn string_at(&self, dotted: &str) -> Option<String> {
        self.path(dotted).and_then(scalar_to_string)
    }

    /// The raw JSON value
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Render a scalar JSON value as a string
///
/// Objects, arrays, null and empty strings yield `None`.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether a component counts as absent
///
/// Null, `false`, `0`, `"0"`, empty strings and empty containers are all
/// treated as missing.
#[must_use]
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null | Value::Bool(false)) => true,
        Some(Value::String(s)) => s.is_empty() || s == "0",
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Bool(true)) => false,
    }
}

/// Read the provider response from the configured transport
///
/// The session copy is always removed, so a response can be read at most once
/// and cannot be replayed through the browser back button. Undecodable
/// parameters are logged and treated as an empty response, which then fails
/// validation.
#[must_use]
pub fn read_response(
    transport: CallbackTransport,
    session: &Session,
    encoded: Option<&str>,
) -> RawResponse {
    let stored = session.take::<Value>(RESPONSE_KEY);

    match transport {
        CallbackTransport::Session => stored.map_or_else(RawResponse::empty, RawResponse::new),
        CallbackTransport::Get | CallbackTransport::Post => {
            let Some(encoded) = encoded.filter(|e| !e.is_empty()) else {
                tracing::warn!(transport = %transport, "Callback carried no response");
                return RawResponse::empty();
            };

            RawResponse::decode(encoded).unwrap_or_else(|reason| {
                tracing::warn!(transport = %transport, reason = %reason, "Failed to decode callback response");
                RawResponse::empty()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AuthSource {
        AuthSource::new(json!({
            "provider": "Google",
            "uid": 1234,
            "info": { "email": "a@b.com", "name": "Ada Lovelace", "urls": ["x", "y"] }
        }))
    }

    #[test]
    fn test_provider_and_uid() {
        let auth = sample();
        assert_eq!(auth.provider().as_deref(), Some("Google"));
        assert_eq!(auth.uid().as_deref(), Some("1234"));
    }

    #[test]
    fn test_dotted_path() {
        let auth = sample();
        assert_eq!(auth.string_at("info.email").as_deref(), Some("a@b.com"));
        assert_eq!(auth.string_at("info.urls.1").as_deref(), Some("y"));
        assert!(auth.path("info.missing.deeper").is_none());
        assert!(auth.string_at("info").is_none());
    }

    #[test]
    fn test_blank_values() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!(""))));
        assert!(is_blank(Some(&json!("0"))));
        assert!(is_blank(Some(&json!(0))));
        assert!(is_blank(Some(&json!({}))));
        assert!(!is_blank(Some(&json!("x"))));
        assert!(!is_blank(Some(&json!({"a": 1}))));
    }

    #[test]
    fn test_encode_decode() {
        let raw = RawResponse::new(json!({"auth": {"provider": "Google"}}));
        let decoded = RawResponse::decode(&raw.encode()).unwrap();
        assert_eq!(decoded, raw);
        assert!(RawResponse::decode("not base64!").is_err());
    }

    #[test]
    fn test_session_transport_reads_once() {
        let session = Session::new_empty();
        session
            .set(RESPONSE_KEY, json!({"auth": {"provider": "Google"}}))
            .unwrap();

        let first = read_response(CallbackTransport::Session, &session, None);
        assert!(first.auth().is_some());

        let second = read_response(CallbackTransport::Session, &session, None);
        assert_eq!(second, RawResponse::empty());
    }

    #[test]
    fn test_get_transport_bad_payload_is_empty() {
        let session = Session::new_empty();
        let raw = read_response(CallbackTransport::Get, &session, Some("%%%"));
        assert_eq!(raw, RawResponse::empty());
    }

    #[test]
    fn test_post_transport_clears_session_copy() {
        let session = Session::new_empty();
        session.set(RESPONSE_KEY, json!({"stale": true})).unwrap();

        let encoded = RawResponse::new(json!({"auth": {"uid": "1"}})).encode();
        let raw = read_response(CallbackTransport::Post, &session, Some(&encoded));

        assert!(raw.auth().is_some());
        assert!(session.get::<Value>(RESPONSE_KEY).is_none());
    }
}
