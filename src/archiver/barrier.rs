//! Completion barrier for the asynchronous tasks of one session.

use std::future::Future;

use tokio_util::task::TaskTracker;

/// Counts outstanding tasks and lets the session block until all finish.
///
/// Tasks may spawn further tasks on the same barrier (a stylesheet download
/// schedules its `url(...)` assets); since the parent is still running when
/// it spawns, the count cannot reach zero early.
#[derive(Debug, Clone, Default)]
pub struct CompletionBarrier {
    tracker: TaskTracker,
}

impl CompletionBarrier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the runtime and count it until it completes.
    ///
    /// A panicking task still counts as completed.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Number of tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every spawned task, including ones spawned while waiting,
    /// has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
