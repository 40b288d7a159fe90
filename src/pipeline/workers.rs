//! Bounded worker pool for backfill epoch tasks
//!
//! A sliding window over a `JoinSet`: at most `size` epoch tasks run at once, and a new
//! one is spawned as soon as any finishes. Completion order is arbitrary.
//!
//! The first failing task aborts every task still in flight (all-or-nothing).

use std::future::Future;
use std::ops::RangeInclusive;
use tokio::task::{JoinError, JoinSet};

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// A size of 0 is treated as 1.
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `task(epoch)` for every epoch in `epochs` with bounded parallelism.
    ///
    /// # Arguments
    /// * `epochs` - Closed epoch range; empty ranges complete immediately
    /// * `task` - Builds the future for one epoch
    ///
    /// # Returns
    /// Number of completed tasks, or the first error (a task error or a panicked task).
    pub async fn run_all<F, Fut, E>(&self, epochs: RangeInclusive<u64>, task: F) -> Result<u64, E>
    where
        F: Fn(u64) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: From<JoinError> + Send + 'static,
    {
        let mut pending = epochs;
        let mut join_set = JoinSet::new();
        let mut completed = 0u64;

        loop {
            while join_set.len() < self.size {
                match pending.next() {
                    Some(epoch) => {
                        join_set.spawn(task(epoch));
                    }
                    None => break,
                }
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };

            match joined {
                Ok(Ok(())) => completed += 1,
                Ok(Err(err)) => {
                    join_set.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    join_set.abort_all();
                    return Err(E::from(join_err));
                }
            }
        }

        Ok(completed)
    }
}
