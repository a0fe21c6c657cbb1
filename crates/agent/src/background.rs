//! Tracking for fire-and-forget consolidation tasks.
//!
//! Sessions never wait on consolidation, but the process must, or memory and
//! experience updates are lost on exit. Every background task goes through a
//! [`BackgroundTasks`] handle so the owner can wait for them to drain.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::warn;

/// A cloneable set of running background tasks.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a task. Finished tasks are reaped on the way in.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        while let Some(done) = tasks.try_join_next() {
            log_join_failure(done);
        }
        tasks.spawn(task);
    }

    /// Tasks that have not been reaped yet.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait until every task, including ones spawned while waiting, is done.
    pub async fn wait_idle(&self) {
        loop {
            let mut drained = std::mem::take(&mut *self.lock());
            if drained.is_empty() {
                return;
            }
            while let Some(done) = drained.join_next().await {
                log_join_failure(done);
            }
        }
    }
}

fn log_join_failure(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!(error = %e, "Background task failed");
    }
}
