/*!
 * Bounded fan-out with positional results.
 *
 * Work items run as futures driven by `buffer_unordered`, so at most `limit`
 * are in flight at once. Results are re-sorted by input index before they are
 * returned, which keeps ordinal order independent of completion order.
 */

use std::future::Future;

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::PipelineError;

/// Result of one unit of work
#[derive(Debug)]
pub enum WorkOutcome<T> {
    Completed(T),
    Failed(PipelineError),
    Cancelled,
}

impl<T> WorkOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl<T> From<Result<T, PipelineError>> for WorkOutcome<T> {
    fn from(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(PipelineError::Cancelled) => Self::Cancelled,
            Err(error) => Self::Failed(error),
        }
    }
}

/// Concurrency-limited runner for independent work items
#[derive(Debug, Clone)]
pub struct FanOut {
    limit: usize,
    cancel: CancellationToken,
    fail_fast: bool,
    interrupt: bool,
}

impl FanOut {
    /// Create a runner; a limit of zero is raised to one
    pub fn new(limit: usize, cancel: CancellationToken) -> Self {
        Self {
            limit: limit.max(1),
            cancel,
            fail_fast: false,
            interrupt: true,
        }
    }

    /// Cancel the shared token on the first failure
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Whether items already running are dropped when the token is cancelled.
    ///
    /// Items that own follow-up work of their own (such as writing a sidecar
    /// after an inner join) set this to false and watch the token themselves.
    pub fn interrupt_in_flight(mut self, interrupt: bool) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `f` over every item and wait for all of them.
    ///
    /// The returned vector has one outcome per input item, at the item's
    /// input position. Items that have not started when the token is
    /// cancelled come back as `Cancelled` without `f` being called; items in
    /// flight race their future against the token.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, f: F) -> Vec<WorkOutcome<T>>
    where
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let total = items.len();
        let f = &f;

        let mut results = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                let cancel = self.cancel.clone();
                let fail_fast = self.fail_fast;
                let interrupt = self.interrupt;

                async move {
                    if cancel.is_cancelled() {
                        return (index, WorkOutcome::Cancelled);
                    }

                    let outcome: WorkOutcome<T> = if interrupt {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => WorkOutcome::Cancelled,
                            result = f(index, item) => result.into(),
                        }
                    } else {
                        f(index, item).await.into()
                    };

                    if let WorkOutcome::Failed(error) = &outcome {
                        if fail_fast && !cancel.is_cancelled() {
                            warn!("Cancelling remaining work after failure: {}", error);
                            cancel.cancel();
                        }
                    }

                    (index, outcome)
                }
            })
            .buffer_unordered(self.limit)
            .collect::<Vec<_>>()
            .await;

        // Sort results by index to restore input order
        results.sort_by_key(|(index, _)| *index);
        debug!("Fan-out joined {} item(s) with limit {}", total, self.limit);

        results.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
