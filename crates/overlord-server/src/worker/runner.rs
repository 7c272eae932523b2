//! One script invocation inside a fresh Boa context.
//!
//! The runner loads the resolved script source (honoring the capability
//! grant), evaluates it, calls its global `run(payload)` entry point,
//! settles a returned promise by draining the job queue, and shapes the
//! return value into the canonical response form.

use crate::worker::conversions::{js_value_to_json, json_to_js_value};
use crate::worker::permissions::{is_remote, WorkerPermissions};
use boa_engine::{
    builtins::promise::PromiseState, js_string, object::builtins::JsPromise, Context, Source,
};
use overlord_common::protocol::worker::{WorkerMessage, WorkerRequest};
use overlord_common::protocol::{is_response_shaped, ResponsePayload};
use serde_json::Value;
use std::io;
use std::path::Path;

/// A running script cannot be preempted, so runaway loops are bounded by
/// iteration count instead. A loop exceeding the cap raises an error, which
/// lets a worker thread whose minion has already timed out unwind and exit
/// instead of spinning forever. Legitimate scripts stay far below the cap;
/// a tripped cap surfaces as an execution error.
const LOOP_ITERATION_LIMIT: u64 = 1 << 25;

/// Script failures, split into the two outcomes the minion cares about.
#[derive(Debug)]
pub(crate) enum ScriptError {
    /// The script could not be located or loaded.
    ModuleNotFound(String),
    /// The script was loaded but raised while running.
    Execution(String),
}

impl ScriptError {
    pub(crate) fn into_message(self) -> WorkerMessage {
        match self {
            Self::ModuleNotFound(message) => WorkerMessage::module_not_found(message),
            Self::Execution(message) => WorkerMessage::execution_error(message),
        }
    }
}

/// Runs one request to completion. Returns the script's result already in
/// response shape, so the value posted back over the channel matches the
/// worker protocol.
pub(crate) fn execute(
    request: &WorkerRequest,
    permissions: &WorkerPermissions,
) -> Result<Value, ScriptError> {
    let location = request.url.as_deref().ok_or_else(|| {
        ScriptError::ModuleNotFound("Module not found: no script location resolved".into())
    })?;

    let source = load_source(location, permissions)?;

    let mut ctx = Context::default();
    ctx.runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    ctx.eval(Source::from_bytes(source.as_bytes()))
        .map_err(|e| ScriptError::Execution(format!("Script evaluation error: {e}")))?;

    let run = ctx
        .global_object()
        .get(js_string!("run"), &mut ctx)
        .map_err(|e| ScriptError::Execution(format!("Failed to look up run(): {e}")))?;

    let run_fn = run
        .as_object()
        .filter(|obj| obj.is_callable())
        .ok_or_else(|| {
            ScriptError::Execution(format!("Script {location} does not define a run() function"))
        })?;

    let payload = serde_json::to_value(&request.data)
        .map_err(|e| ScriptError::Execution(format!("Payload conversion error: {e}")))?;
    let payload_js = json_to_js_value(payload, &mut ctx)
        .map_err(|e| ScriptError::Execution(e.to_string()))?;

    let mut result = run_fn
        .call(&boa_engine::JsValue::undefined(), &[payload_js], &mut ctx)
        .map_err(|e| ScriptError::Execution(format!("Uncaught error in script: {e}")))?;

    // Async run() returns a promise; drive the job queue until it settles.
    let _ = ctx.run_jobs();
    let promise = result
        .as_object()
        .cloned()
        .and_then(|obj| JsPromise::from_object(obj).ok());
    if let Some(promise) = promise {
        result = match promise.state() {
            PromiseState::Fulfilled(value) => value,
            PromiseState::Rejected(err) => {
                return Err(ScriptError::Execution(format!(
                    "Uncaught error in script: {}",
                    err.display()
                )))
            }
            PromiseState::Pending => {
                return Err(ScriptError::Execution(format!(
                    "Script {location} returned a promise that never settled"
                )))
            }
        };
    }

    let value =
        js_value_to_json(result, &mut ctx).map_err(|e| ScriptError::Execution(e.to_string()))?;

    Ok(shape(value))
}

/// Applies the response-shape rule on the worker side, like the reply the
/// original worker posts: shaped values pass through, plain values get the
/// default wrapping.
fn shape(value: Value) -> Value {
    if is_response_shaped(&value) {
        value
    } else {
        // Serializing our own struct cannot fail.
        serde_json::to_value(ResponsePayload::wrap(value)).unwrap_or(Value::Null)
    }
}

fn load_source(location: &str, permissions: &WorkerPermissions) -> Result<String, ScriptError> {
    if is_remote(location) {
        if !permissions.net {
            return Err(ScriptError::Execution(format!(
                "Network access is not permitted for {location}"
            )));
        }
        let response = ureq::get(location).call().map_err(|e| {
            ScriptError::ModuleNotFound(format!("Module not found: {location} ({e})"))
        })?;
        return response.into_string().map_err(|e| {
            ScriptError::Execution(format!("Failed to read remote script {location}: {e}"))
        });
    }

    let path = Path::new(location);
    if !permissions.allows_read(path) {
        return Err(ScriptError::Execution(format!(
            "Read access to {location} is not permitted"
        )));
    }

    match std::fs::read_to_string(path) {
        Ok(source) => Ok(source),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ScriptError::ModuleNotFound(
            format!("Module not found: {location}"),
        )),
        Err(e) => Err(ScriptError::Execution(format!(
            "Failed to read script {location}: {e}"
        ))),
    }
}
