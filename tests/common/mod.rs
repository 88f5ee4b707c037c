#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use recap::scraper::{DocumentLoader, LoadError};
use recap::{ProgressEvent, ProgressSink, Summarizer, SummarizerError, TextSegment, TokenStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Invoke,
    Stream,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub texts: Vec<String>,
}

type Predicate = Box<dyn Fn(&[TextSegment]) -> bool + Send + Sync>;
type Delay = Box<dyn Fn(&[TextSegment]) -> Duration + Send + Sync>;

/// Scripted summarizer.
///
/// `invoke` returns `S<n>` for the n-th successful invoke call. `stream`
/// yields the input texts separated by `|` tokens.
pub struct MockSummarizer {
    calls: Mutex<Vec<Call>>,
    invoked: AtomicUsize,
    fail_invoke: Predicate,
    fail_stream_open: bool,
    fail_stream_after: Option<usize>,
    delay: Option<Delay>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            invoked: AtomicUsize::new(0),
            fail_invoke: Box::new(|_| false),
            fail_stream_open: false,
            fail_stream_after: None,
            delay: None,
            cancel_after: None,
        }
    }

    /// Fail every invoke call whose input matches
    pub fn fail_invoke_when(
        mut self,
        predicate: impl Fn(&[TextSegment]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail_invoke = Box::new(predicate);
        self
    }

    pub fn fail_stream_open(mut self) -> Self {
        self.fail_stream_open = true;
        self
    }

    /// Yield `tokens` tokens, then fail the stream
    pub fn fail_stream_after(mut self, tokens: usize) -> Self {
        self.fail_stream_after = Some(tokens);
        self
    }

    pub fn with_delay(
        mut self,
        delay: impl Fn(&[TextSegment]) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Cancel `token` while making the `calls`-th call of any kind
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    fn record(&self, kind: CallKind, segments: &[TextSegment]) {
        let made = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                kind,
                texts: segments.iter().map(|s| s.text().to_string()).collect(),
            });
            calls.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if made >= *after {
                token.cancel();
            }
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn invoke(&self, segments: &[TextSegment]) -> Result<String, SummarizerError> {
        self.record(CallKind::Invoke, segments);
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(segments)).await;
        }
        if (self.fail_invoke)(segments) {
            return Err(SummarizerError::RequestFailed("scripted failure".to_string()));
        }
        let n = self.invoked.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("S{n}"))
    }

    async fn stream(&self, segments: &[TextSegment]) -> Result<TokenStream, SummarizerError> {
        self.record(CallKind::Stream, segments);
        if self.fail_stream_open {
            return Err(SummarizerError::Stream("scripted open failure".to_string()));
        }

        let mut tokens: Vec<Result<String, SummarizerError>> = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                tokens.push(Ok("|".to_string()));
            }
            tokens.push(Ok(segment.text().to_string()));
        }
        if let Some(after) = self.fail_stream_after {
            tokens.truncate(after);
            tokens.push(Err(SummarizerError::Stream("scripted mid-stream failure".to_string())));
        }
        Ok(stream::iter(tokens).boxed())
    }
}

/// Collects every progress event
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for Recorder {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Loader serving fixed text, or a fixed failure
pub struct StaticLoader {
    pub text: Option<String>,
}

#[async_trait]
impl DocumentLoader for StaticLoader {
    async fn load(&self, url: &str) -> Result<Vec<TextSegment>, LoadError> {
        match &self.text {
            Some(text) => Ok(vec![TextSegment::with_meta(
                text.clone(),
                recap::segment::SegmentMeta {
                    origin: Some(url.to_string()),
                    title: Some("Static".to_string()),
                    ..Default::default()
                },
            )]),
            None => Err(LoadError::NoContent),
        }
    }
}

pub fn segments(texts: &[&str]) -> Vec<TextSegment> {
    texts.iter().map(|t| TextSegment::new(*t)).collect()
}

/// `L0`, `L1`, ... as leaf summaries
pub fn leaves(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("L{i}")).collect()
}
