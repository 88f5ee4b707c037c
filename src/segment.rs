//! TextSegment - the unit of text passed between loader, splitter and summarizer.

use serde::{Deserialize, Serialize};

/// Where a segment came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Source URL or other origin label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Page title, when the loader found one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Character offset of the first character within the parent text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    /// Character offset one past the last character within the parent text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

/// An immutable unit of text with optional metadata.
///
/// Summaries are fed back into the reducer as segments of the next level,
/// so the same type flows through every stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    text: String,
    #[serde(default)]
    meta: SegmentMeta,
}

impl TextSegment {
    /// Create a segment without metadata
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            meta: SegmentMeta::default(),
        }
    }

    /// Create a segment with metadata
    pub fn with_meta(text: impl Into<String>, meta: SegmentMeta) -> Self {
        Self {
            text: text.into(),
            meta,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    /// Length in characters, not bytes
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// The first `max_chars` characters, cut on a character boundary
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((end, _)) => &self.text[..end],
            None => &self.text,
        }
    }

    /// Check if the segment has no visible content
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl From<String> for TextSegment {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for TextSegment {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_len_counts_characters() {
        let seg = TextSegment::new("héllo");
        assert_eq!(seg.char_len(), 5);
        assert_eq!(seg.text().len(), 6);
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        let seg = TextSegment::new("ééééé");
        assert_eq!(seg.preview(3), "ééé");
        assert_eq!(seg.preview(10), "ééééé");
        assert_eq!(seg.preview(0), "");
    }

    #[test]
    fn blank_detection() {
        assert!(TextSegment::new(" \n\t").is_blank());
        assert!(!TextSegment::new(" a ").is_blank());
    }

    #[test]
    fn meta_is_omitted_when_empty() {
        let seg = TextSegment::new("x");
        let json = serde_json::to_string(&seg).unwrap();
        assert_eq!(json, r#"{"text":"x","meta":{}}"#);
    }
}
