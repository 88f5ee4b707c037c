//! Progress events emitted by the leaf stage and the reducer.
//!
//! The pipeline never talks to a terminal or widget directly; callers pass a
//! [`ProgressSink`] and render the events however they like.

use tokio::sync::mpsc::UnboundedSender;

/// Something observable happened during summarisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The source document was fetched and parsed
    DocumentLoaded {
        title: Option<String>,
        chars: usize,
        /// Leading text of the document
        preview: String,
    },
    /// The document was split into `chunks` chunks
    DocumentSplit { chunks: usize, largest: usize },
    /// A leaf chunk is about to be summarised (`index` is 0-based)
    ChunkStarted { index: usize, total: usize },
    /// A leaf chunk was summarised; `done` counts processed chunks so far
    ChunkSummarized { index: usize, done: usize, total: usize },
    /// A leaf chunk failed and was skipped
    ChunkFailed {
        index: usize,
        done: usize,
        total: usize,
        error: String,
    },
    /// An intermediate level is being reduced
    LevelStarted {
        level: usize,
        inputs: usize,
        batches: usize,
    },
    /// A batch at an intermediate level failed and was dropped
    BatchFailed {
        level: usize,
        batch: usize,
        error: String,
    },
    /// The final streaming reduction started over `inputs` summaries
    FinalStarted { level: usize, inputs: usize },
    /// Running text of the final summary after another token arrived
    FinalPartial { text: String },
    /// The stream failed; any partial text shown so far is void
    FinalReset { error: String },
    /// The final summary is complete
    FinalCompleted { text: String },
}

impl ProgressEvent {
    /// Fraction of leaf chunks processed, for chunk events
    pub fn fraction(&self) -> Option<f32> {
        match self {
            ProgressEvent::ChunkSummarized { done, total, .. }
            | ProgressEvent::ChunkFailed { done, total, .. } => {
                Some(if *total == 0 { 1.0 } else { *done as f32 / *total as f32 })
            }
            _ => None,
        }
    }
}

/// Receives progress events. Must be cheap; it is called inline.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(event);
    }
}
