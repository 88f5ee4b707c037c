//! Recursive character text splitter.
//!
//! Splits on the coarsest separator that occurs in the text (paragraphs, then
//! lines, then words, then characters), greedily merging the pieces back
//! into chunks of at most `chunk_size` characters with `overlap` characters
//! shared between neighbouring chunks.

use crate::segment::{SegmentMeta, TextSegment};
use std::collections::VecDeque;
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be positive")]
    ZeroChunkSize,
    #[error("overlap {overlap} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
    #[error("splitter produced no chunks")]
    NoChunks,
}

/// Splitter configured with a chunk size and overlap, both in characters.
///
/// Chunks are always slices of the input, separator runs included, so
/// every chunk knows exactly where it came from.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split raw text into chunk strings, in document order
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.chunk_ranges(text)
            .into_iter()
            .map(|range| text[range].to_string())
            .collect()
    }

    /// Split every segment, recording origin and character offsets on each chunk.
    ///
    /// Fails with [`ChunkingError::NoChunks`] when nothing survives, which
    /// includes an empty input.
    pub fn split_segments(&self, segments: &[TextSegment]) -> Result<Vec<TextSegment>, ChunkingError> {
        let mut chunks = Vec::new();
        for segment in segments {
            let text = segment.text();
            let parent_start = segment.meta().start.unwrap_or(0);
            let mut byte_cursor = 0;
            let mut char_cursor = 0;
            for range in self.chunk_ranges(text) {
                if range.start < byte_cursor {
                    byte_cursor = 0;
                    char_cursor = 0;
                }
                char_cursor += char_len(&text[byte_cursor..range.start]);
                byte_cursor = range.start;

                let chunk = &text[range];
                let start = parent_start + char_cursor;
                let meta = SegmentMeta {
                    origin: segment.meta().origin.clone(),
                    title: segment.meta().title.clone(),
                    start: Some(start),
                    end: Some(start + char_len(chunk)),
                };
                chunks.push(TextSegment::with_meta(chunk, meta));
            }
        }

        if chunks.is_empty() {
            return Err(ChunkingError::NoChunks);
        }
        debug!(
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.overlap,
            "split document"
        );
        Ok(chunks)
    }

    /// Byte ranges of the chunks of `text`, in document order
    fn chunk_ranges(&self, text: &str) -> Vec<Range<usize>> {
        self.split_recursive(text, 0..text.len(), &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, range: Range<usize>, separators: &[&str]) -> Vec<Range<usize>> {
        let slice = &text[range.clone()];
        // Pick the first separator present in the text; "" always matches.
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || slice.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(index + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut good: Vec<Range<usize>> = Vec::new();
        for piece in pieces(text, range, separator) {
            if char_len(&text[piece.clone()]) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(text, &good));
                good.clear();
            }
            if remaining.is_empty() {
                push_trimmed(&mut chunks, text, piece);
            } else {
                chunks.extend(self.split_recursive(text, piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge(text, &good));
        }
        chunks
    }

    /// Greedily merge neighbouring pieces into spans of at most `chunk_size`
    fn merge(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<Range<usize>> = VecDeque::new();

        for piece in pieces {
            if let Some(span) = outer(&current) {
                if char_len(&text[span.start..piece.end]) > self.chunk_size {
                    push_trimmed(&mut chunks, text, span);
                    // Drop pieces from the front until what is left fits as overlap.
                    while let Some(span) = outer(&current) {
                        let kept = char_len(&text[span.clone()]);
                        let grown = char_len(&text[span.start..piece.end]);
                        if kept <= self.overlap && grown <= self.chunk_size {
                            break;
                        }
                        current.pop_front();
                    }
                }
            }
            current.push_back(piece.clone());
        }
        if let Some(span) = outer(&current) {
            push_trimmed(&mut chunks, text, span);
        }
        chunks
    }
}

/// Ranges of the non-empty pieces of `text[range]` between `separator`s
fn pieces(text: &str, range: Range<usize>, separator: &str) -> Vec<Range<usize>> {
    let base = range.start;
    let slice = &text[range];
    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }

    let mut out = Vec::new();
    let mut start = 0;
    for (at, _) in slice.match_indices(separator) {
        if at > start {
            out.push(base + start..base + at);
        }
        start = at + separator.len();
    }
    if slice.len() > start {
        out.push(base + start..base + slice.len());
    }
    out
}

/// From the start of the first piece to the end of the last
fn outer(current: &VecDeque<Range<usize>>) -> Option<Range<usize>> {
    Some(current.front()?.start..current.back()?.end)
}

fn push_trimmed(chunks: &mut Vec<Range<usize>>, text: &str, span: Range<usize>) {
    let slice = &text[span.clone()];
    let start = span.start + (slice.len() - slice.trim_start().len());
    let end = span.end - (slice.len() - slice.trim_end().len());
    if start < end {
        chunks.push(start..end);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{i:03}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(300, 50).unwrap();
        assert_eq!(splitter.split_text("  hello world  "), vec!["hello world"]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = words(200);
        let splitter = TextSplitter::new(100, 20).unwrap();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 100, "chunk too long: {}", chunk.len());
        }
        // Neighbouring chunks share their boundary word.
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').next_back().unwrap();
            assert!(pair[1].contains(last_word));
        }
        assert!(chunks[0].starts_with("word000"));
        assert!(chunks.last().unwrap().ends_with("word199"));
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let para = "a".repeat(60);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let splitter = TextSplitter::new(130, 0).unwrap();
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks, vec![format!("{para}\n\n{para}"), para.clone()]);
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(250);
        let splitter = TextSplitter::new(100, 0).unwrap();
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(char_len(&chunks[2]), 50);
    }

    #[test]
    fn segments_get_offsets_and_origin() {
        let text = words(120);
        let parent = TextSegment::with_meta(
            text.clone(),
            SegmentMeta {
                origin: Some("https://example.com".to_string()),
                ..SegmentMeta::default()
            },
        );
        let splitter = TextSplitter::new(120, 30).unwrap();
        let chunks = splitter.split_segments(&[parent]).unwrap();
        for chunk in &chunks {
            let start = chunk.meta().start.unwrap();
            let end = chunk.meta().end.unwrap();
            let slice: String = text.chars().skip(start).take(end - start).collect();
            assert_eq!(slice, chunk.text());
            assert_eq!(chunk.meta().origin.as_deref(), Some("https://example.com"));
        }
    }

    #[test]
    fn repeated_passages_get_distinct_offsets() {
        let para = "b".repeat(200);
        let text = vec![para.as_str(); 6].join("\n\n");
        let splitter = TextSplitter::new(450, 50).unwrap();
        let chunks = splitter.split_segments(&[TextSegment::new(text)]).unwrap();
        let starts: Vec<usize> = chunks.iter().map(|c| c.meta().start.unwrap()).collect();
        assert_eq!(starts, vec![0, 404, 808]);
    }

    #[test]
    fn separator_runs_are_kept() {
        let text = format!("{}\n\n\n\n{}\n\n\nccc", "a".repeat(50), "b".repeat(50));
        let splitter = TextSplitter::new(300, 0).unwrap();
        let chunks = splitter.split_segments(&[TextSegment::new(text.clone())]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text(), text);
        assert_eq!(chunks[0].meta().start, Some(0));
        assert_eq!(chunks[0].meta().end, Some(text.chars().count()));

        // Split across chunks, every chunk is still a slice of the parent.
        let splitter = TextSplitter::new(60, 10).unwrap();
        let chunks = splitter.split_segments(&[TextSegment::new(text.clone())]).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text().ends_with("\n\n\nccc"));
        for chunk in &chunks {
            let start = chunk.meta().start.unwrap();
            let end = chunk.meta().end.unwrap();
            let slice: String = text.chars().skip(start).take(end - start).collect();
            assert_eq!(slice, chunk.text());
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        let splitter = TextSplitter::new(300, 100).unwrap();
        assert_eq!(splitter.split_segments(&[]), Err(ChunkingError::NoChunks));
        assert_eq!(
            splitter.split_segments(&[TextSegment::new("   ")]),
            Err(ChunkingError::NoChunks)
        );
    }

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(TextSplitter::new(0, 0).unwrap_err(), ChunkingError::ZeroChunkSize);
        assert!(matches!(
            TextSplitter::new(100, 100),
            Err(ChunkingError::OverlapTooLarge { .. })
        ));
    }
}
