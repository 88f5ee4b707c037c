//! End-to-end request: load, split, summarise chunks, reduce.

use crate::agent::Summarizer;
use crate::context::{Cancelled, RunContext};
use crate::leaf::{summarize_each, LeafFailure};
use crate::progress::ProgressEvent;
use crate::reduce::{reduce, BatchFailure, ReduceError};
use crate::scraper::{DocumentLoader, LoadError};
use crate::segment::TextSegment;
use crate::splitter::{ChunkingError, TextSplitter};
use thiserror::Error;
use tracing::info;

/// Characters of the loaded document shown before chunking
pub const PREVIEW_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to load document: {0}")]
    Load(#[from] LoadError),
    #[error("failed to split document: {0}")]
    Chunking(#[from] ChunkingError),
    #[error("no chunk could be summarised ({failed} of {total} failed)")]
    NoLeafSummaries { total: usize, failed: usize },
    #[error(transparent)]
    Reduce(ReduceError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<ReduceError> for PipelineError {
    fn from(error: ReduceError) -> Self {
        match error {
            ReduceError::Cancelled(c) => PipelineError::Cancelled(c),
            other => PipelineError::Reduce(other),
        }
    }
}

/// What happened during one request
#[derive(Debug, Clone)]
pub struct Report {
    pub url: String,
    pub title: Option<String>,
    pub chunks: usize,
    /// Length of the largest chunk, in characters
    pub largest_chunk: usize,
    pub leaf_summaries: usize,
    pub leaf_failures: Vec<LeafFailure>,
    /// Summaries per reduction level, starting with the leaf summaries
    pub level_sizes: Vec<usize>,
    pub failed_batches: Vec<BatchFailure>,
    pub used_fallback: bool,
    pub summary: String,
}

/// Wires the collaborators of a summarisation request together.
pub struct Pipeline<'a> {
    loader: &'a dyn DocumentLoader,
    summarizer: &'a dyn Summarizer,
    splitter: TextSplitter,
    batch_size: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        loader: &'a dyn DocumentLoader,
        summarizer: &'a dyn Summarizer,
        splitter: TextSplitter,
        batch_size: usize,
    ) -> Self {
        Self {
            loader,
            summarizer,
            splitter,
            batch_size,
        }
    }

    /// Load `url` and split it into chunks
    pub async fn chunks(
        &self,
        url: &str,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<TextSegment>, PipelineError> {
        let document = self.loader.load(url).await?;
        ctx.progress().emit(ProgressEvent::DocumentLoaded {
            title: document.first().and_then(|s| s.meta().title.clone()),
            chars: document.iter().map(TextSegment::char_len).sum(),
            preview: document
                .first()
                .map(|s| s.preview(PREVIEW_CHARS).to_string())
                .unwrap_or_default(),
        });

        let chunks = self.splitter.split_segments(&document)?;
        let largest = chunks.iter().map(TextSegment::char_len).max().unwrap_or(0);
        ctx.progress().emit(ProgressEvent::DocumentSplit {
            chunks: chunks.len(),
            largest,
        });
        info!(url, chunks = chunks.len(), largest, "document split");
        Ok(chunks)
    }

    /// Run the whole request, returning a best-effort summary
    pub async fn run(&self, url: &str, ctx: &RunContext<'_>) -> Result<Report, PipelineError> {
        let chunks = self.chunks(url, ctx).await?;
        let title = chunks.first().and_then(|c| c.meta().title.clone());
        let largest_chunk = chunks.iter().map(TextSegment::char_len).max().unwrap_or(0);

        let leaves = summarize_each(&chunks, self.summarizer, ctx).await?;
        if leaves.is_empty() {
            return Err(PipelineError::NoLeafSummaries {
                total: leaves.total,
                failed: leaves.failures.len(),
            });
        }

        let leaf_summaries = leaves.succeeded();
        let reduced = reduce(leaves.summaries, self.summarizer, self.batch_size, ctx).await?;

        Ok(Report {
            url: url.to_string(),
            title,
            chunks: chunks.len(),
            largest_chunk,
            leaf_summaries,
            leaf_failures: leaves.failures,
            level_sizes: reduced.level_sizes,
            failed_batches: reduced.failed_batches,
            used_fallback: reduced.used_fallback,
            summary: reduced.text,
        })
    }
}
