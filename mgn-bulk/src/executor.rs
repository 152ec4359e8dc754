use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, error};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::BulkConfig;
use crate::errors::UnitError;
use crate::rate_limiter::RateLimiter;

/// Output of one unit, at the same index as its input
pub type UnitOutcome<T, E> = Result<T, UnitError<E>>;

/// Runs an operation over many inputs with at most `max_concurrent` units
/// in flight, each admitted through a shared [`RateLimiter`].
///
/// Outputs line up with inputs by index whatever order the units finish
/// in. A failing or panicking unit only affects its own slot.
#[derive(Clone, Debug)]
pub struct ConcurrentExecutor {
    max_concurrent: usize,
    rate_limiter: Arc<RateLimiter>,
}

impl ConcurrentExecutor {
    pub fn new(max_concurrent: usize, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            rate_limiter,
        }
    }

    pub fn from_config(config: &BulkConfig) -> Self {
        Self::new(
            config.max_concurrent,
            Arc::new(RateLimiter::new(config.rate_limit_calls, config.rate_limit_window)),
        )
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub async fn run<I, T, E, F, Fut, P>(&self, inputs: Vec<I>, op: F, on_progress: P) -> Vec<UnitOutcome<T, E>>
    where
        I: Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        P: FnMut(usize, usize),
    {
        self.run_cancellable(inputs, op, on_progress, CancellationToken::new())
            .await
    }

    /// Like [`ConcurrentExecutor::run`], but stops starting new units once
    /// `cancel` fires. Units already past admission run to completion;
    /// the rest come back as [`UnitError::Cancelled`] and are not reported
    /// to `on_progress`.
    pub async fn run_cancellable<I, T, E, F, Fut, P>(
        &self,
        inputs: Vec<I>,
        op: F,
        mut on_progress: P,
        cancel: CancellationToken,
    ) -> Vec<UnitOutcome<T, E>>
    where
        I: Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        P: FnMut(usize, usize),
    {
        let total = inputs.len();
        let op = Arc::new(op);
        let mut outputs: Vec<Option<UnitOutcome<T, E>>> = (0..total).map(|_| None).collect();
        let mut pending = inputs.into_iter().enumerate();
        let mut join_set: JoinSet<(usize, UnitOutcome<T, E>)> = JoinSet::new();
        let mut completed = 0;

        loop {
            // Top up the in-flight set unless cancelled
            while join_set.len() < self.max_concurrent && !cancel.is_cancelled() {
                let Some((index, input)) = pending.next() else {
                    break;
                };
                let op = op.clone();
                let limiter = self.rate_limiter.clone();
                let cancel = cancel.clone();

                join_set.spawn(async move {
                    limiter.acquire().await;
                    if cancel.is_cancelled() {
                        return (index, Err(UnitError::Cancelled));
                    }
                    let outcome = AssertUnwindSafe(async move { op(input).await })
                        .catch_unwind()
                        .await;
                    let outcome = match outcome {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(UnitError::Failed(e)),
                        Err(panic) => Err(UnitError::Panicked(panic_message(panic))),
                    };
                    (index, outcome)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };

            match joined {
                Ok((index, outcome)) => {
                    match &outcome {
                        Ok(_) => debug!("Unit {index} succeeded"),
                        Err(UnitError::Cancelled) => debug!("Unit {index} cancelled"),
                        Err(e) => error!("Unit {index} failed: {e}"),
                    }
                    let finished = !matches!(outcome, Err(UnitError::Cancelled));
                    outputs[index] = Some(outcome);
                    if finished {
                        completed += 1;
                        on_progress(completed, total);
                    }
                }
                Err(e) => error!("Executor task did not finish: {e}"),
            }
        }

        outputs
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(UnitError::Cancelled)))
            .collect()
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
