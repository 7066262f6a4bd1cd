//! Bounded parallel execution with first-failure cancellation.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Runs batches of independent tasks with a concurrency ceiling.
///
/// All tasks in a batch share one child cancellation token. The first task to
/// fail cancels that token: tasks that have not started yet are skipped, and
/// in-flight tasks observe the cancellation at their next checkpoint (a
/// rate-limiter wait, a retry sleep, a provider call) — running work is never
/// forcibly killed. The first error is returned once every task has settled.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    concurrency: usize,
}

impl ParallelExecutor {
    /// Creates an executor; a ceiling of zero defaults to the host's logical
    /// core count.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = if concurrency == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            concurrency
        };
        Self { concurrency }
    }

    /// The effective concurrency ceiling.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Executes `tasks`, at most `concurrency` at a time.
    ///
    /// Each task receives the batch's shared cancellation token (a child of
    /// `cancel`) and must check it at its blocking points. An empty batch
    /// succeeds immediately. Returns the first task error, or
    /// [`Error::Cancelled`] when the caller's token fired.
    pub async fn execute<F, Fut>(&self, cancel: &CancellationToken, tasks: Vec<F>) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if tasks.is_empty() {
            return Ok(());
        }

        let batch = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            let semaphore = semaphore.clone();
            let batch = batch.clone();
            let first_error = first_error.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if batch.is_cancelled() {
                    debug!("skipping task: batch already cancelled");
                    return;
                }

                if let Err(err) = task(batch.clone()).await {
                    let mut slot = first_error.lock().expect("first-error lock poisoned");
                    if slot.is_none() && !err.is_cancelled() {
                        *slot = Some(err);
                        batch.cancel();
                    }
                }
            }));
        }

        for joined in join_all(handles).await {
            if let Err(err) = joined {
                if err.is_panic() {
                    let mut slot = first_error.lock().expect("first-error lock poisoned");
                    if slot.is_none() {
                        *slot = Some(Error::Other(anyhow::anyhow!("parallel task panicked")));
                    }
                }
            }
        }

        if let Some(err) = first_error.lock().expect("first-error lock poisoned").take() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(0)
    }
}
