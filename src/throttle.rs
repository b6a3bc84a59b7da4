//! Bounded-concurrency batch runner.
//!
//! [`run_bounded`] is the engine's only way of running many fetches at once.
//! Every task waits on a shared semaphore, all tasks run to completion, and
//! the outcomes come back in the order the tasks were given so callers can
//! zip them against their inputs.

use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

/// Why one task of a batch produced no value.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Run `tasks` with at most `max_concurrency` of them in flight.
///
/// Equivalent to a gather that collects exceptions instead of raising: a
/// failing or panicking task is reported in its slot and never cancels its
/// siblings. `max_concurrency` of zero is treated as one.
///
/// # Returns
///
/// One outcome per task, index-aligned with the input.
///
/// # Examples
///
/// ```ignore
/// let pages = run_bounded(8, urls.iter().map(|u| fetcher.fetch(u, &[]))).await;
/// for (url, page) in urls.iter().zip(pages) { ... }
/// ```
#[instrument(level = "debug", skip_all, fields(max_concurrency = max_concurrency))]
pub async fn run_bounded<I, F, T, E>(max_concurrency: usize, tasks: I) -> Vec<Result<T, TaskError<E>>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let semaphore = Semaphore::new(max_concurrency.max(1));
    let semaphore = &semaphore;

    let guarded = tasks.into_iter().map(|task| async move {
        // the semaphore is never closed, so acquisition only fails in theory
        let _permit = semaphore.acquire().await.ok();
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TaskError::Failed(e)),
            Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
        }
    });

    let outcomes = join_all(guarded).await;
    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    if failed > 0 {
        warn!(total = outcomes.len(), failed, "Bounded batch finished with failures");
    } else {
        debug!(total = outcomes.len(), "Bounded batch finished");
    }
    outcomes
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
