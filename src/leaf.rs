//! Leaf stage: summarise every chunk on its own, skipping failures.

use crate::agent::Summarizer;
use crate::context::{Cancelled, RunContext};
use crate::progress::ProgressEvent;
use crate::segment::TextSegment;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// A chunk whose summary could not be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafFailure {
    /// 0-based position of the chunk in the input
    pub index: usize,
    pub error: String,
}

/// Result of the leaf stage
#[derive(Debug, Clone, Default)]
pub struct LeafOutcome {
    /// Summaries of the chunks that succeeded, in input order
    pub summaries: Vec<String>,
    /// Chunks that failed, in input order
    pub failures: Vec<LeafFailure>,
    /// Number of chunks given to the stage
    pub total: usize,
}

impl LeafOutcome {
    pub fn succeeded(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

/// Summarise each segment independently through `summarizer`.
///
/// A failing chunk is reported and dropped; it never aborts the stage.
/// Progress is emitted after every chunk, in input order, whether it
/// succeeded or not. Only cancellation stops the stage early.
pub async fn summarize_each(
    segments: &[TextSegment],
    summarizer: &dyn Summarizer,
    ctx: &RunContext<'_>,
) -> Result<LeafOutcome, Cancelled> {
    let total = segments.len();
    let progress = ctx.progress();
    let mut outcome = LeafOutcome {
        total,
        ..LeafOutcome::default()
    };

    let mut calls = stream::iter(segments.iter().enumerate())
        .map(|(index, segment)| async move {
            ctx.check()?;
            progress.emit(ProgressEvent::ChunkStarted { index, total });
            let result = summarizer.invoke(std::slice::from_ref(segment)).await;
            Ok::<_, Cancelled>((index, result))
        })
        .buffered(ctx.concurrency());

    let mut done = 0usize;
    while let Some(call) = calls.next().await {
        let (index, result) = call?;
        done += 1;
        match result {
            Ok(summary) => {
                outcome.summaries.push(summary);
                progress.emit(ProgressEvent::ChunkSummarized { index, done, total });
            }
            Err(e) => {
                warn!(chunk = index + 1, total, error = %e, "chunk summary failed, skipping");
                outcome.failures.push(LeafFailure {
                    index,
                    error: e.to_string(),
                });
                progress.emit(ProgressEvent::ChunkFailed {
                    index,
                    done,
                    total,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        total,
        succeeded = outcome.succeeded(),
        failed = outcome.failures.len(),
        "leaf stage finished"
    );
    Ok(outcome)
}
