//! The canonical response shape emitted by an execution unit.
//!
//! Scripts may return either a plain value or a response-shaped object
//! (`body` + `status` + `headers`). Plain values are wrapped with defaults:
//! status 200 and a content type inferred from the body (`text/html` for
//! strings, `application/json` for everything else).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_HTML: &str = "text/html";

/// The shape an execution unit emits and the coordinator writes back as the
/// HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub body: Value,
    pub status: u16,
    pub headers: HashMap<String, String>,
    #[serde(rename = "statusText", skip_serializing_if = "Option::is_none", default)]
    pub status_text: Option<String>,
}

impl ResponsePayload {
    /// Wraps a plain script return value as a default response: status 200,
    /// content type inferred from the body type.
    pub fn wrap(body: Value) -> Self {
        let content_type = if body.is_string() {
            CONTENT_TYPE_HTML
        } else {
            CONTENT_TYPE_JSON
        };

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());

        Self {
            body,
            status: 200,
            headers,
            status_text: None,
        }
    }

    /// A bodiless response carrying only a status code (timeouts and errors).
    pub fn empty(status: u16) -> Self {
        Self {
            body: Value::Null,
            status,
            headers: HashMap::new(),
            status_text: None,
        }
    }

    /// The generic answer for failures nothing else handled.
    pub fn unhandled() -> Self {
        Self {
            body: Value::Null,
            status: 500,
            headers: HashMap::new(),
            status_text: Some("Ouch! That went unhandled.".to_string()),
        }
    }

    /// Interprets a worker reply: response-shaped values pass through,
    /// anything else is wrapped as a default response.
    pub fn from_value(value: Value) -> Self {
        if is_response_shaped(&value) {
            if let Ok(payload) = serde_json::from_value(value.clone()) {
                return payload;
            }
        }
        Self::wrap(value)
    }
}

/// A value is response-shaped when it carries all of `body`, `status` and
/// `headers`.
pub fn is_response_shaped(value: &Value) -> bool {
    match value.as_object() {
        Some(obj) => {
            obj.contains_key("body") && obj.contains_key("status") && obj.contains_key("headers")
        }
        None => false,
    }
}
