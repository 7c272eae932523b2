//! The worker message protocol, as seen across the isolation boundary.
//!
//! A minion sends exactly one [`WorkerRequest`] into its worker and receives
//! exactly one [`WorkerEvent`] back. The outbound message is either an error
//! report (tagged with a structured kind, so the minion does not have to
//! sniff error text to tell "script could not be located" from "script ran
//! and failed") or the script's return value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The decoded request a script's `run()` entry point is invoked with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub body: Value,
    pub headers: HashMap<String, String>,
    pub url: String,
    pub method: String,
}

/// The single inbound worker message: the payload plus the resolved script
/// location. An absent location surfaces as a module-resolution failure
/// inside the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub data: Payload,
    pub url: Option<String>,
}

/// Structured error code for script failures, preferred over matching on
/// error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptErrorKind {
    /// The script could not be located or loaded.
    ModuleNotFound,
    /// The script was loaded but raised an error while running.
    Execution,
}

/// The single outbound worker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerMessage {
    Error {
        kind: ScriptErrorKind,
        message: String,
    },
    Response(Value),
}

impl WorkerMessage {
    pub fn module_not_found(message: impl Into<String>) -> Self {
        Self::Error {
            kind: ScriptErrorKind::ModuleNotFound,
            message: message.into(),
        }
    }

    pub fn execution_error(message: impl Into<String>) -> Self {
        Self::Error {
            kind: ScriptErrorKind::Execution,
            message: message.into(),
        }
    }
}

/// What a minion observes from its worker: a posted message, or a crash
/// (a panic on the worker thread, or the worker going away without replying).
#[derive(Debug)]
pub enum WorkerEvent {
    Message(WorkerMessage),
    Crashed(String),
}

/// Fallback heuristic for error text produced outside the structured path.
pub fn looks_like_module_not_found(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("module not found") || lowered.contains("404")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_message_error_wire_shape() {
        let message = WorkerMessage::module_not_found("module not found: ./missing.js");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], json!("error"));
        assert_eq!(value["payload"]["kind"], json!("module_not_found"));
    }

    #[test]
    fn test_worker_message_response_wire_shape() {
        let message = WorkerMessage::Response(json!({"ok": true}));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], json!("response"));
        assert_eq!(value["payload"], json!({"ok": true}));
    }

    #[test]
    fn test_module_not_found_heuristic() {
        assert!(looks_like_module_not_found("Module not found: ./x.js"));
        assert!(looks_like_module_not_found("fetch failed with 404"));
        assert!(!looks_like_module_not_found("TypeError: x is not a function"));
    }
}
