//! Wire shapes shared between the coordinator, the minion and its worker.

pub mod response;
pub mod worker;

pub use response::{is_response_shaped, ResponsePayload};
pub use worker::{Payload, ScriptErrorKind, WorkerEvent, WorkerMessage, WorkerRequest};
