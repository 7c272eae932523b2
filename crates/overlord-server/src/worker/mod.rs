//! The isolated worker behind a minion.
//!
//! A worker is a dedicated OS thread owning a fresh Boa context, reachable
//! only through message passing: one [`WorkerRequest`] in, one
//! [`WorkerEvent`] out. The thread runs with the capability grant it was
//! spawned with and supports forced termination at any time.
//!
//! One worker serves exactly one request and is then discarded; workers are
//! never shared or pooled.

mod conversions;
mod permissions;
mod runner;

pub use permissions::WorkerPermissions;

use overlord_common::protocol::worker::{WorkerEvent, WorkerMessage, WorkerRequest};
use overlord_common::{OverlordError, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tokio::sync::oneshot;

pub struct Worker {
    inbox: Option<mpsc::Sender<WorkerRequest>>,
    events: Option<oneshot::Receiver<WorkerEvent>>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    /// Spawns the worker thread with the given capability grant. The thread
    /// blocks waiting for its single request and exits after replying.
    pub fn spawn(permissions: WorkerPermissions) -> Result<Self> {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        let (event_tx, event_rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        std::thread::Builder::new()
            .name("minion-worker".into())
            .spawn(move || worker_main(inbox_rx, event_tx, permissions, flag))
            .map_err(|e| OverlordError::Worker(format!("Failed to spawn worker thread: {e}")))?;

        Ok(Self {
            inbox: Some(inbox_tx),
            events: Some(event_rx),
            cancelled,
        })
    }

    /// Posts the single request into the worker.
    pub fn post(&self, request: WorkerRequest) -> Result<()> {
        match &self.inbox {
            Some(inbox) => inbox
                .send(request)
                .map_err(|_| OverlordError::Worker("Worker is gone before receiving work".into())),
            None => Err(OverlordError::Worker("Worker was already terminated".into())),
        }
    }

    /// Awaits the worker's single reply. A dropped channel (the thread died
    /// without posting) is reported as a crash, never as a hang.
    pub async fn recv(&mut self) -> WorkerEvent {
        match self.events.take() {
            Some(events) => match events.await {
                Ok(event) => event,
                Err(_) => WorkerEvent::Crashed("Worker exited without replying".into()),
            },
            None => WorkerEvent::Crashed("Worker reply was already consumed".into()),
        }
    }

    /// Forced termination: disarms the reply channel and flags the thread as
    /// cancelled so a late result is discarded. A script stuck in a loop hits
    /// the runner's iteration cap, errors out and lets the thread exit, so
    /// the worker never outlives its minion by more than the cap. Idempotent;
    /// must be called on every exit path.
    pub fn terminate(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.inbox.take();
        self.events.take();
    }
}

fn worker_main(
    inbox: mpsc::Receiver<WorkerRequest>,
    events: oneshot::Sender<WorkerEvent>,
    permissions: WorkerPermissions,
    cancelled: Arc<AtomicBool>,
) {
    let request = match inbox.recv() {
        Ok(request) => request,
        // Terminated before any work arrived.
        Err(_) => return,
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner::execute(&request, &permissions)));

    if cancelled.load(Ordering::SeqCst) {
        return;
    }

    let event = match outcome {
        Ok(Ok(value)) => WorkerEvent::Message(WorkerMessage::Response(value)),
        Ok(Err(err)) => WorkerEvent::Message(err.into_message()),
        Err(panic) => WorkerEvent::Crashed(panic_text(panic)),
    };

    // The minion may have timed out and dropped the receiver; nothing to do.
    let _ = events.send(event);
}

fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "Worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlord_common::protocol::worker::Payload;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn request_for(location: Option<String>) -> WorkerRequest {
        WorkerRequest {
            data: Payload {
                body: json!(null),
                headers: HashMap::new(),
                url: "http://localhost:8080/hello".into(),
                method: "GET".into(),
            },
            url: location,
        }
    }

    #[tokio::test]
    async fn test_worker_replies_once() {
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        file.write_all(br#"function run() { return "done"; }"#).unwrap();
        let location = file.path().to_string_lossy().into_owned();

        let mut worker =
            Worker::spawn(WorkerPermissions::for_script(Some(&location))).unwrap();
        worker.post(request_for(Some(location))).unwrap();

        match worker.recv().await {
            WorkerEvent::Message(WorkerMessage::Response(value)) => {
                assert_eq!(value["body"], json!("done"));
            }
            other => panic!("expected response, got {other:?}"),
        }
        worker.terminate();
    }

    #[tokio::test]
    async fn test_worker_thread_exits_after_terminating_a_looping_script() {
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        file.write_all(br#"function run() { while (true) {} }"#).unwrap();
        let location = file.path().to_string_lossy().into_owned();

        let mut worker =
            Worker::spawn(WorkerPermissions::for_script(Some(&location))).unwrap();
        worker.post(request_for(Some(location))).unwrap();

        // Simulate a timed-out minion walking away mid-execution.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        worker.terminate();

        // The thread holds the only other reference to the cancellation
        // flag; the count dropping to one means it has exited.
        for _ in 0..300 {
            if Arc::strong_count(&worker.cancelled) == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        panic!("worker thread kept running after terminate()");
    }

    #[tokio::test]
    async fn test_terminated_worker_rejects_post() {
        let mut worker = Worker::spawn(WorkerPermissions::for_script(None)).unwrap();
        worker.terminate();
        assert!(worker.post(request_for(None)).is_err());
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let mut worker = Worker::spawn(WorkerPermissions::for_script(None)).unwrap();
        worker.terminate();
        worker.terminate();
    }
}
