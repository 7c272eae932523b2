//! Overlord Common
//!
//! Shared types for the overlord script runner: the error type, the worker
//! message protocol, the canonical response shape, and the request-body
//! decoder. Everything that crosses the boundary between the coordinator,
//! the execution unit and the worker lives here.

pub mod body;
pub mod error;
pub mod protocol;

pub use error::{OverlordError, Result};
pub use protocol::response::ResponsePayload;
