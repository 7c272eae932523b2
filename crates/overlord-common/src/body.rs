//! Raw request-body decoding.
//!
//! Bodies with an `application/json` content type are parsed as JSON;
//! everything else is passed through as text.

use crate::protocol::response::CONTENT_TYPE_JSON;
use serde_json::Value;

/// Decodes a raw request body according to its content type.
///
/// Invalid JSON falls back to raw text rather than failing the request; the
/// script decides what to do with it.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> Value {
    let is_json = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().eq_ignore_ascii_case(CONTENT_TYPE_JSON))
        .unwrap_or(false);

    if is_json {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return value;
        }
    }

    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_content_type_is_parsed() {
        let value = decode_body(Some("application/json"), br#"{"msg": "hello"}"#);
        assert_eq!(value, json!({"msg": "hello"}));
    }

    #[test]
    fn test_json_content_type_with_charset_is_parsed() {
        let value = decode_body(Some("application/json; charset=utf-8"), b"[1, 2]");
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn test_other_content_types_stay_text() {
        let value = decode_body(Some("text/plain"), br#"{"msg": "hello"}"#);
        assert_eq!(value, json!(r#"{"msg": "hello"}"#));
    }

    #[test]
    fn test_missing_content_type_stays_text() {
        let value = decode_body(None, b"plain text");
        assert_eq!(value, json!("plain text"));
    }

    #[test]
    fn test_invalid_json_falls_back_to_text() {
        let value = decode_body(Some("application/json"), b"{not json");
        assert_eq!(value, json!("{not json"));
    }
}
