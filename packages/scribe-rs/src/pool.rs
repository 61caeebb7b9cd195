//! Bounded pool for CPU-bound work (decoding, aggregation).
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::request::FailureReason;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(threads.max(1))),
        }
    }

    /// Runs `work` on a blocking thread once a permit is free.
    ///
    /// A panic inside `work` comes back as [`FailureReason::Internal`].
    /// The permit is held by the blocking thread, so dropping the returned
    /// future does not free it while `work` is still running.
    pub async fn run<F, T>(&self, work: F) -> Result<T, FailureReason>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FailureReason::Internal("worker pool closed".into()))?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(|e| FailureReason::Internal(format!("worker task failed: {e}")))
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
