//! JSON-RPC 2.0 envelope decoding and error synthesis.
//!
//! The relay treats envelopes as untyped string-keyed JSON objects and never
//! reinterprets their contents: whatever `id`, `result`, or `error` the peer
//! sent is carried through byte-for-byte. The only structure this module
//! imposes is the one the relay itself needs: "is this line a JSON object"
//! on the way in, and a well-formed error envelope on the way out.

use serde_json::Value;

use crate::error::FramingError;

/// JSON-RPC error code for malformed inbound JSON.
///
/// Fixed by the JSON-RPC 2.0 specification; never renumber.
pub const PARSE_ERROR: i64 = -32700;

/// JSON-RPC error code for any downstream failure (network, timeout,
/// malformed upstream response).
///
/// Fixed by the JSON-RPC 2.0 specification; never renumber.
pub const INTERNAL_ERROR: i64 = -32603;

/// One JSON-RPC envelope: an untyped string-keyed JSON object.
///
/// Requests, responses, and error envelopes all share this shape. An
/// envelope is constructed from one inbound line or one HTTP response body,
/// consumed immediately, and never persisted beyond the diagnostics log's
/// serialized copy.
pub type Envelope = serde_json::Map<String, Value>;

/// Decode one inbound line into an [`Envelope`].
///
/// Leading and trailing whitespace (including the line delimiter) is
/// ignored. The line must parse as a single JSON object; arrays, scalars,
/// and null are rejected; the relay does not support batch requests.
///
/// # Errors
///
/// Returns [`FramingError::MalformedJson`] when the line is not valid JSON,
/// or [`FramingError::NotAnObject`] when it is valid JSON of the wrong type.
pub fn decode_line(line: &str) -> Result<Envelope, FramingError> {
    let value: Value =
        serde_json::from_str(line.trim()).map_err(|e| FramingError::MalformedJson {
            reason: e.to_string(),
        })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(FramingError::NotAnObject {
            found: json_type_name(&other),
        }),
    }
}

/// Best-effort `id` recovery from a line that failed to decode.
///
/// If a leading JSON value can still be pulled off the line (a complete
/// object followed by trailing garbage, for instance) and that value is an
/// object exposing an `id` member, the member is returned verbatim so the
/// synthesized error envelope can echo it. Nothing is ever invented: when no
/// id is recoverable the caller omits the field entirely.
pub fn recover_id(line: &str) -> Option<Value> {
    let mut values = serde_json::Deserializer::from_str(line).into_iter::<Value>();
    match values.next() {
        Some(Ok(Value::Object(map))) => map.get("id").cloned(),
        _ => None,
    }
}

/// Build a protocol-compliant error envelope.
///
/// The `id`, when present, is inserted exactly as given (same JSON value,
/// same type), so the caller controls the echo policy.
pub fn error_envelope(id: Option<Value>, code: i64, message: &str) -> Envelope {
    let mut error = Envelope::new();
    error.insert("code".to_string(), code.into());
    error.insert("message".to_string(), message.into());

    let mut envelope = Envelope::new();
    envelope.insert("jsonrpc".to_string(), "2.0".into());
    envelope.insert("error".to_string(), Value::Object(error));
    if let Some(id) = id {
        envelope.insert("id".to_string(), id);
    }
    envelope
}

/// JSON type name for diagnostics and error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"read_file"}}"#;
        let envelope = decode_line(line).unwrap();
        assert_eq!(envelope.get("id"), Some(&json!(1)));
        assert_eq!(envelope.get("method"), Some(&json!("tools/call")));
    }

    #[test]
    fn test_decode_trims_delimiter() {
        let line = "  {\"jsonrpc\":\"2.0\",\"id\":\"abc\",\"method\":\"ping\"}  \n";
        let envelope = decode_line(line).unwrap();
        assert_eq!(envelope.get("id"), Some(&json!("abc")));
    }

    #[test]
    fn test_decode_malformed() {
        let err = decode_line(r#"{"truncated"#).unwrap_err();
        assert!(matches!(err, FramingError::MalformedJson { .. }));
    }

    #[test]
    fn test_decode_array_rejected() {
        let err = decode_line(r#"[{"jsonrpc":"2.0","id":1,"method":"x"}]"#).unwrap_err();
        assert!(matches!(err, FramingError::NotAnObject { found } if found == "an array"));
    }

    #[test]
    fn test_decode_scalar_rejected() {
        let err = decode_line("42").unwrap_err();
        assert!(matches!(err, FramingError::NotAnObject { found } if found == "a number"));
    }

    #[test]
    fn test_decode_preserves_unusual_ids() {
        // The relay polices framing, not envelope schema: a float id is
        // carried through untouched.
        let envelope = decode_line(r#"{"jsonrpc":"2.0","id":1.5,"method":"x"}"#).unwrap();
        assert_eq!(envelope.get("id"), Some(&json!(1.5)));
    }

    #[test]
    fn test_recover_id_from_trailing_garbage() {
        let id = recover_id(r#"{"jsonrpc":"2.0","id":7,"method":"x"} trailing"#);
        assert_eq!(id, Some(json!(7)));
    }

    #[test]
    fn test_recover_id_string() {
        let id = recover_id(r#"{"id":"req-9"} %%%"#);
        assert_eq!(id, Some(json!("req-9")));
    }

    #[test]
    fn test_recover_id_unparseable() {
        assert_eq!(recover_id("not json"), None);
    }

    #[test]
    fn test_recover_id_non_object() {
        assert_eq!(recover_id(r#"[1,2,3] junk"#), None);
        assert_eq!(recover_id("null junk"), None);
    }

    #[test]
    fn test_recover_id_object_without_id() {
        assert_eq!(recover_id(r#"{"method":"x"} junk"#), None);
    }

    #[test]
    fn test_error_envelope_with_id() {
        let envelope = error_envelope(Some(json!(1)), INTERNAL_ERROR, "Internal error: boom");
        assert_eq!(envelope["jsonrpc"], json!("2.0"));
        assert_eq!(envelope["id"], json!(1));
        assert_eq!(envelope["error"]["code"], json!(-32603));
        assert_eq!(envelope["error"]["message"], json!("Internal error: boom"));
    }

    #[test]
    fn test_error_envelope_null_id_is_echoed() {
        // An explicit null id is a real id and must appear in the envelope;
        // only a missing id omits the field.
        let envelope = error_envelope(Some(Value::Null), PARSE_ERROR, "Parse error");
        assert_eq!(envelope.get("id"), Some(&Value::Null));
    }

    #[test]
    fn test_error_envelope_without_id_omits_field() {
        let envelope = error_envelope(None, PARSE_ERROR, "Parse error");
        assert!(!envelope.contains_key("id"));
        assert_eq!(envelope["error"]["code"], json!(-32700));
    }

    #[test]
    fn test_error_envelope_serializes_to_one_line() {
        let envelope = error_envelope(Some(json!("abc")), PARSE_ERROR, "Parse error");
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains('\n'));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["id"], json!("abc"));
    }
}
