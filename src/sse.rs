//! Server-Sent Events framing for streaming chat completions.
//!
//! Handles frames split across TCP chunks and several frames in one read.
//! Payload interpretation lives with the client; this module only frames.

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// The joined `data:` lines of a frame
    Data(String),
    /// The `[DONE]` end-of-stream sentinel
    Done,
}

/// Stateful SSE parser that buffers incomplete frames across chunk boundaries.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of text and returns every frame it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(end) = self.find_event_boundary() {
            let event_text: String = self.buffer.drain(..end).collect();
            if let Some(frame) = Self::parse_event(&event_text) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Text buffered while waiting for the rest of a frame
    pub fn remaining_buffer(&self) -> &str {
        &self.buffer
    }

    /// Parses whatever is left once the input has ended.
    ///
    /// A server may close the connection without the trailing blank line
    /// of its last frame.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        Self::parse_event(&rest)
    }

    /// Finds the end of the first complete event, including its blank line.
    fn find_event_boundary(&self) -> Option<usize> {
        let lf = self.buffer.find("\n\n").map(|p| p + 2);
        let crlf = self.buffer.find("\r\n\r\n").map(|p| p + 4);
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn parse_event(event_text: &str) -> Option<SseFrame> {
        let data_lines: Vec<&str> = event_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(':'))
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .filter(|data| !data.is_empty())
            .collect();

        if data_lines.is_empty() {
            return None;
        }

        let data = data_lines.join("\n");
        if data == "[DONE]" {
            return Some(SseFrame::Done);
        }
        Some(SseFrame::Data(data))
    }
}
