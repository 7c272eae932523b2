//! Overlord Server
//!
//! The core of the script runner: a bounded-concurrency dispatcher, the
//! minion execution unit with its sandboxed Boa worker, the script-location
//! resolver, and the overlord coordinator that ties them to an HTTP listener.

pub mod dispatcher;
pub mod minion;
pub mod overlord;
pub mod resolver;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use minion::{BoaMinion, Minion, MinionInstructions, WorkOrder};
pub use overlord::{MinionFactory, Overlord, OverlordOptions};
pub use resolver::ScriptRoute;
pub use worker::{Worker, WorkerPermissions};
