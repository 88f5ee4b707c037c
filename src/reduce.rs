//! Recursive batch reduction of summaries into one final summary.
//!
//! Each intermediate level groups the current summaries into contiguous,
//! left-to-right batches of `batch_size`, reduces every batch with one
//! non-streaming call, and hands the survivors to the next level. Once a
//! level fits into a single batch it is reduced with the streaming call,
//! falling back once to a plain call if the stream fails.
//!
//! The levels are walked with a loop rather than recursion, so depth is
//! bounded by memory only.

use crate::agent::{Summarizer, SummarizerError};
use crate::context::{Cancelled, RunContext};
use crate::progress::ProgressEvent;
use crate::segment::TextSegment;
use futures::stream::{self, StreamExt};
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("no summary could be produced: nothing left to reduce")]
    EmptyInput,
    #[error("invalid batch size: {0}")]
    InvalidBatchSize(String),
    #[error("final summary failed: streaming ({stream}), then single call ({fallback})")]
    StreamingFailed {
        stream: SummarizerError,
        fallback: SummarizerError,
    },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// An intermediate batch that was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// 1-based level the batch belonged to
    pub level: usize,
    /// 0-based batch index within the level
    pub batch: usize,
    /// Indices of the level's summaries the batch covered
    pub covers: Range<usize>,
    pub error: String,
}

/// Outcome of a successful reduction
#[derive(Debug, Clone)]
pub struct Reduced {
    /// The final summary
    pub text: String,
    /// Number of summaries at each level, starting with the input
    pub level_sizes: Vec<usize>,
    pub failed_batches: Vec<BatchFailure>,
    /// The streaming call failed and the single-call fallback produced `text`
    pub used_fallback: bool,
}

impl Reduced {
    pub fn levels(&self) -> usize {
        self.level_sizes.len()
    }
}

/// Reduce `summaries` to one summary, `batch_size` summaries per call.
///
/// Fails with [`ReduceError::EmptyInput`] without calling the summarizer
/// when `summaries` is empty, and with the same error when every batch of
/// an intermediate level fails. A `batch_size` of 1 is accepted for a
/// single summary (it is streamed as-is) but rejected for more, since
/// singleton batches never shrink a level.
pub async fn reduce(
    summaries: Vec<String>,
    summarizer: &dyn Summarizer,
    batch_size: usize,
    ctx: &RunContext<'_>,
) -> Result<Reduced, ReduceError> {
    if batch_size == 0 {
        return Err(ReduceError::InvalidBatchSize(
            "batch size must be at least 1".to_string(),
        ));
    }
    if summaries.is_empty() {
        return Err(ReduceError::EmptyInput);
    }
    if batch_size == 1 && summaries.len() > 1 {
        return Err(ReduceError::InvalidBatchSize(format!(
            "batch size 1 cannot reduce {} summaries",
            summaries.len()
        )));
    }

    let progress = ctx.progress();
    let mut level: Vec<TextSegment> = summaries.into_iter().map(TextSegment::new).collect();
    let mut level_sizes = Vec::new();
    let mut failed_batches = Vec::new();
    let mut depth = 1usize;

    loop {
        if level.is_empty() {
            warn!(level = depth, "every batch of the previous level failed");
            return Err(ReduceError::EmptyInput);
        }
        level_sizes.push(level.len());

        if level.len() <= batch_size {
            progress.emit(ProgressEvent::FinalStarted {
                level: depth,
                inputs: level.len(),
            });
            info!(level = depth, inputs = level.len(), "streaming final summary");
            let (text, used_fallback) = finalize(&level, summarizer, ctx).await?;
            progress.emit(ProgressEvent::FinalCompleted { text: text.clone() });
            return Ok(Reduced {
                text,
                level_sizes,
                failed_batches,
                used_fallback,
            });
        }

        let batches = level.len().div_ceil(batch_size);
        progress.emit(ProgressEvent::LevelStarted {
            level: depth,
            inputs: level.len(),
            batches,
        });
        info!(level = depth, inputs = level.len(), batches, "reducing level");

        let mut next_level = Vec::with_capacity(batches);
        {
            let mut calls = stream::iter(level.chunks(batch_size).enumerate())
                .map(|(batch, segments)| async move {
                    ctx.check()?;
                    debug!(level = depth, batch, size = segments.len(), "reducing batch");
                    Ok::<_, Cancelled>((batch, summarizer.invoke(segments).await))
                })
                .buffered(ctx.concurrency());

            while let Some(call) = calls.next().await {
                let (batch, result) = call?;
                match result {
                    Ok(summary) => next_level.push(TextSegment::new(summary)),
                    Err(e) => {
                        let start = batch * batch_size;
                        let covers = start..(start + batch_size).min(level.len());
                        warn!(level = depth, batch, error = %e, "batch summary failed, dropping it");
                        progress.emit(ProgressEvent::BatchFailed {
                            level: depth,
                            batch,
                            error: e.to_string(),
                        });
                        failed_batches.push(BatchFailure {
                            level: depth,
                            batch,
                            covers,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        level = next_level;
        depth += 1;
    }
}

/// Stream the final reduction, falling back once to a single call
async fn finalize(
    segments: &[TextSegment],
    summarizer: &dyn Summarizer,
    ctx: &RunContext<'_>,
) -> Result<(String, bool), ReduceError> {
    ctx.check()?;
    let stream_error = match stream_final(segments, summarizer, ctx).await {
        Ok(text) => return Ok((text, false)),
        Err(e) => e,
    };

    warn!(error = %stream_error, "streaming failed, retrying with a single call");
    ctx.progress().emit(ProgressEvent::FinalReset {
        error: stream_error.to_string(),
    });

    ctx.check()?;
    match summarizer.invoke(segments).await {
        Ok(text) => Ok((text, true)),
        Err(fallback) => Err(ReduceError::StreamingFailed {
            stream: stream_error,
            fallback,
        }),
    }
}

/// Accumulate tokens, publishing the running text after each one
async fn stream_final(
    segments: &[TextSegment],
    summarizer: &dyn Summarizer,
    ctx: &RunContext<'_>,
) -> Result<String, SummarizerError> {
    let mut tokens = summarizer.stream(segments).await?;
    let mut text = String::new();
    while let Some(token) = tokens.next().await {
        text.push_str(&token?);
        ctx.progress().emit(ProgressEvent::FinalPartial { text: text.clone() });
    }
    Ok(text)
}
