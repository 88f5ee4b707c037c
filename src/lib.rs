//! # Recap
//!
//! Web article summarisation with LLMs, one chunk at a time.
//!
//! ## Features
//!
//! - **Map-reduce summaries**: every chunk is summarised on its own, then the
//!   summaries are reduced in fixed-size batches until one remains
//! - **Streaming**: the final reduction streams tokens as they arrive
//! - **Best effort**: failed chunks and batches are skipped and reported
//! - **Provider agnostic**: any OpenAI-compatible chat-completions API (Groq, OpenAI)

pub mod agent;
pub mod config;
pub mod context;
pub mod leaf;
pub mod pipeline;
pub mod progress;
pub mod reduce;
pub mod scraper;
pub mod segment;
pub mod splitter;
pub mod sse;

pub use agent::{extract_text, ChatClient, Summarizer, SummarizerError, TokenStream};
pub use config::Config;
pub use context::{Cancelled, RunContext};
pub use leaf::{summarize_each, LeafOutcome};
pub use pipeline::{Pipeline, PipelineError, Report};
pub use progress::{NoProgress, ProgressEvent, ProgressSink};
pub use reduce::{reduce, ReduceError, Reduced};
pub use scraper::{DocumentLoader, WebLoader};
pub use segment::TextSegment;
pub use splitter::TextSplitter;

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` picks warn, info or debug.
/// Calling it twice is harmless.
pub fn setup_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
