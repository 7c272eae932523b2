//! Bounded-concurrency FIFO mission scheduler.
//!
//! The dispatcher accepts (mission, failure handler) pairs, runs up to `size`
//! of them concurrently and queues the rest in arrival order. It knows
//! nothing about HTTP or scripts.
//!
//! The counters and the queue are the only state shared across concurrent
//! requests; both live behind a single mutex so that `utilization <= size`
//! holds under any interleaving of submissions and completions.

use futures::future::BoxFuture;
use overlord_common::{OverlordError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A unit of asynchronous work. Missions carry no identity and cannot be
/// cancelled once admitted.
pub type Mission = BoxFuture<'static, Result<()>>;

/// Invoked with the mission's error when a mission fails. Purely
/// observational; it cannot alter scheduling.
pub type FailureHandler = Box<dyn FnOnce(OverlordError) + Send>;

struct DispatcherState {
    utilization: usize,
    queue: VecDeque<(Mission, FailureHandler)>,
}

#[derive(Clone)]
pub struct Dispatcher {
    size: usize,
    state: Arc<Mutex<DispatcherState>>,
}

impl Dispatcher {
    /// Creates a dispatcher that runs at most `size` missions concurrently.
    /// `usize::MAX` expresses an unbounded pool.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "dispatcher size must be at least 1");
        Self {
            size,
            state: Arc::new(Mutex::new(DispatcherState {
                utilization: 0,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Enqueues a mission and attempts to advance scheduling. Never blocks;
    /// the mission itself runs asynchronously. There is no bound on the
    /// queue; backpressure is the caller's responsibility.
    pub fn submit(&self, mission: Mission, on_failure: FailureHandler) {
        self.state
            .lock()
            .unwrap()
            .queue
            .push_back((mission, on_failure));
        self.advance();
    }

    /// Current number of running missions.
    pub fn utilization(&self) -> usize {
        self.state.lock().unwrap().utilization
    }

    /// Current number of missions waiting for a slot.
    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One scheduling step: starts the head of the queue if capacity allows.
    /// The utilization increment happens under the same lock as the dequeue,
    /// so the capacity invariant cannot be raced.
    fn advance(&self) {
        let next = {
            let mut state = self.state.lock().unwrap();
            if state.utilization >= self.size || state.queue.is_empty() {
                return;
            }
            state.utilization += 1;
            state.queue.pop_front()
        };

        if let Some((mission, on_failure)) = next {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                if let Err(err) = mission.await {
                    tracing::error!("An error occurred while executing a mission: {err}");
                    on_failure(err);
                }
                // Capacity release is unconditional, success or failure.
                dispatcher.state.lock().unwrap().utilization -= 1;
                dispatcher.advance();
            });
        }
    }
}
