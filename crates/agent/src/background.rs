//! Background task tracking.
//!
//! Everything the engine starts but does not await (model streams, tool
//! executions, rule-scheduled jobs) runs here, so hosts and tests have a
//! single barrier for quiescence.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use foldline_core::error::{Result, panic_message};
use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

pub struct BackgroundTracker {
    tracker: TaskTracker,
    soft_limit: usize,
    idle_gate: tokio::sync::Mutex<()>,
}

impl BackgroundTracker {
    pub fn new(soft_limit: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            soft_limit,
            idle_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Start `fut` immediately. Errors and panics are logged, never returned.
    pub fn spawn<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let live = self.tracker.len();
        if live >= self.soft_limit {
            warn!(live, limit = self.soft_limit, task = %name, "Background task count above soft limit");
        }

        debug!(task = %name, "Spawning background task");
        self.tracker.spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => debug!(task = %name, "Background task finished"),
                Ok(Err(e)) => warn!(task = %name, error = %e, "Background task failed"),
                Err(panic) => {
                    error!(task = %name, panic = %panic_message(panic.as_ref()), "Background task panicked")
                }
            }
        });
    }

    /// Wait until every tracked task has settled, including tasks spawned by
    /// tracked tasks while waiting.
    pub async fn wait_idle(&self) {
        let _gate = self.idle_gate.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }
}
