//! Bounded worker pool for independent async tasks.
//!
//! At most `size` tasks are in flight at once. Results come back in
//! completion order, not input order.
//!
//! Two flavours:
//! - [`WorkerPool::run_optional`] — per-task errors are logged, counted, and
//!   dropped (enrichment lookups).
//! - [`WorkerPool::run_required`] — every task still runs to completion, then
//!   the first error is returned (reference tables an adapter cannot do
//!   without).

use std::future::Future;

use anyhow::Result;
use futures::stream::{self, StreamExt};

/// What came back from an optional fan-out.
#[derive(Debug)]
pub struct PoolOutcome<T> {
    pub completed: Vec<T>,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// A pool running up to `size` tasks concurrently (minimum 1).
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn run_optional<I, T, F, Fut>(&self, label: &str, inputs: I, task: F) -> PoolOutcome<T>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let results: Vec<Result<T>> = stream::iter(inputs)
            .map(task)
            .buffer_unordered(self.size)
            .collect()
            .await;

        let mut completed = Vec::with_capacity(results.len());
        let mut failed = 0;
        for result in results {
            match result {
                Ok(v) => completed.push(v),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(task = %label, error = %format!("{:#}", e), "optional task failed");
                }
            }
        }

        PoolOutcome { completed, failed }
    }

    pub async fn run_required<I, T, F, Fut>(&self, label: &str, inputs: I, task: F) -> Result<Vec<T>>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let results: Vec<Result<T>> = stream::iter(inputs)
            .map(task)
            .buffer_unordered(self.size)
            .collect()
            .await;

        let mut completed = Vec::with_capacity(results.len());
        let mut first_err = None;
        for result in results {
            match result {
                Ok(v) => completed.push(v),
                Err(e) => {
                    tracing::warn!(task = %label, error = %format!("{:#}", e), "required task failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e.context(format!("{} failed", label))),
            None => Ok(completed),
        }
    }
}
