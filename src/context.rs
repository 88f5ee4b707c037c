//! Per-request execution context shared by the leaf stage and the reducer.

use crate::progress::{NoProgress, ProgressSink};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The request was cancelled before the next summarizer call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("summarisation cancelled")]
pub struct Cancelled;

/// Where to report progress, when to stop, and how many calls may overlap.
#[derive(Clone)]
pub struct RunContext<'a> {
    progress: &'a dyn ProgressSink,
    cancel: CancellationToken,
    concurrency: usize,
}

impl Default for RunContext<'static> {
    fn default() -> Self {
        Self {
            progress: &NoProgress,
            cancel: CancellationToken::new(),
            concurrency: 1,
        }
    }
}

impl<'a> RunContext<'a> {
    pub fn new(progress: &'a dyn ProgressSink) -> Self {
        Self {
            progress,
            cancel: CancellationToken::new(),
            concurrency: 1,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Summarizer calls allowed in flight at once; results keep input order
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn progress(&self) -> &'a dyn ProgressSink {
        self.progress
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check-and-return point before every summarizer invocation
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.cancel.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
