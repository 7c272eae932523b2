//! The execution unit: runs one script against one work order inside an
//! isolated worker, with a deadline, and reduces every possible outcome to
//! exactly one [`ResponsePayload`].

use crate::worker::{Worker, WorkerPermissions};
use futures::future::BoxFuture;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::http::request::Parts;
use overlord_common::body::decode_body;
use overlord_common::protocol::worker::{
    looks_like_module_not_found, Payload, ScriptErrorKind, WorkerEvent, WorkerMessage,
    WorkerRequest,
};
use overlord_common::{ResponsePayload, Result};
use std::collections::HashMap;
use std::time::Duration;

/// The resolved (script location, inbound request) pair handed to a minion.
/// Built once per request; consumed exactly once by `do_work`.
#[derive(Debug)]
pub struct WorkOrder {
    pub location: Option<String>,
    pub parts: Parts,
    pub body: Bytes,
}

/// Per-minion configuration.
#[derive(Debug, Clone)]
pub struct MinionInstructions {
    pub timeout: Duration,
}

/// Object-safe seam so tests and integrations can substitute a stub
/// execution unit through the overlord's minion factory.
pub trait Minion: Send + Sync {
    /// Every code path terminates in a `ResponsePayload`; the only outward
    /// failure is setup before the race begins (e.g. the worker thread could
    /// not be spawned), which travels the dispatcher's failure path.
    fn do_work(&self, order: WorkOrder) -> BoxFuture<'static, Result<ResponsePayload>>;
}

/// The production minion: one Boa worker per invocation.
pub struct BoaMinion {
    timeout: Duration,
}

impl BoaMinion {
    pub fn new(instructions: MinionInstructions) -> Self {
        Self {
            timeout: instructions.timeout,
        }
    }
}

impl Minion for BoaMinion {
    fn do_work(&self, order: WorkOrder) -> BoxFuture<'static, Result<ResponsePayload>> {
        let timeout = self.timeout;
        Box::pin(async move {
            let payload = prepare_payload(&order);
            let request_url = payload.url.clone();

            let permissions = WorkerPermissions::for_script(order.location.as_deref());
            let mut worker = Worker::spawn(permissions)?;
            worker.post(WorkerRequest {
                data: payload,
                url: order.location,
            })?;

            tracing::debug!("Sending payload to worker");

            // Three-way race: first terminal event wins, the rest are
            // disarmed. The timer arm is dropped by select!, the worker is
            // terminated unconditionally below.
            let event = tokio::select! {
                event = worker.recv() => Some(event),
                _ = tokio::time::sleep(timeout) => None,
            };
            worker.terminate();

            Ok(match event {
                None => {
                    tracing::warn!("Worker timed out handling {request_url}");
                    ResponsePayload::empty(408)
                }
                Some(WorkerEvent::Crashed(message)) => {
                    tracing::error!("An error occurred in the worker: {message}");
                    ResponsePayload::empty(500)
                }
                Some(WorkerEvent::Message(message)) => {
                    tracing::debug!("Message received from worker");
                    handle_message(message)
                }
            })
        })
    }
}

/// Derives the payload a script is invoked with from the inbound request.
fn prepare_payload(order: &WorkOrder) -> Payload {
    let content_type = order
        .parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let body = decode_body(content_type, &order.body);

    let mut headers = HashMap::new();
    for (name, value) in &order.parts.headers {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    Payload {
        body,
        headers,
        url: request_url(order),
        method: order.parts.method.as_str().to_string(),
    }
}

/// Scripts receive the absolute request URL. HTTP/1.1 clients send an
/// origin-form path, so scheme and host are restored from the Host header;
/// a URI that already carries them is passed through.
fn request_url(order: &WorkOrder) -> String {
    if order.parts.uri.host().is_some() {
        return order.parts.uri.to_string();
    }
    match order.parts.headers.get(HOST).and_then(|v| v.to_str().ok()) {
        Some(host) => format!("http://{host}{}", order.parts.uri),
        None => order.parts.uri.to_string(),
    }
}

fn handle_message(message: WorkerMessage) -> ResponsePayload {
    match message {
        WorkerMessage::Error {
            kind: ScriptErrorKind::ModuleNotFound,
            message,
        } => {
            tracing::error!("Worker script could not be resolved: {message}");
            ResponsePayload::empty(404)
        }
        WorkerMessage::Error {
            kind: ScriptErrorKind::Execution,
            message,
        } => {
            // Error text sniffing only as a fallback for failures the
            // structured kind did not classify.
            if looks_like_module_not_found(&message) {
                tracing::error!("Worker script could not be resolved: {message}");
                ResponsePayload::empty(404)
            } else {
                tracing::error!("An error occurred in the worker: {message}");
                ResponsePayload::empty(500)
            }
        }
        WorkerMessage::Response(value) => ResponsePayload::from_value(value),
    }
}
