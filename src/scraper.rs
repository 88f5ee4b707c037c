//! Web scraping module for document loading.
//!
//! Uses reqwest for fetching and scraper for HTML parsing.

use crate::segment::{SegmentMeta, TextSegment};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// User-Agent string identifying this scraper
const USER_AGENT: &str = concat!("recap/", env!("CARGO_PKG_VERSION"));

/// Default timeout for HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Paragraph-like elements shorter than this are navigation noise
const MIN_BLOCK_CHARS: usize = 20;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to fetch URL: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("server returned {status} for {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("no content found at URL")]
    NoContent,
}

/// Turns a source location into ordered text segments.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Vec<TextSegment>, LoadError>;
}

/// Extracted content from a webpage
#[derive(Debug, Clone)]
pub struct WebContent {
    /// The original URL
    pub url: String,
    /// Page title
    pub title: Option<String>,
    /// Main text content
    pub text: String,
}

impl WebContent {
    /// Convert into a single segment carrying the URL and title
    pub fn into_segment(self) -> TextSegment {
        let end = self.text.chars().count();
        TextSegment::with_meta(
            self.text,
            SegmentMeta {
                origin: Some(self.url),
                title: self.title,
                start: Some(0),
                end: Some(end),
            },
        )
    }
}

/// Loads web pages over HTTP
#[derive(Debug, Clone)]
pub struct WebLoader {
    client: Client,
}

impl WebLoader {
    pub fn new() -> Result<Self, LoadError> {
        Ok(Self {
            client: create_client()?,
        })
    }

    /// Fetch and extract content from a URL
    pub async fn fetch_content(&self, url: &str) -> Result<WebContent, LoadError> {
        debug!(url, "fetching page");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await?;
        let content = parse_page(url, &html)?;
        info!(
            url,
            chars = content.text.chars().count(),
            "extracted page text"
        );
        Ok(content)
    }
}

#[async_trait]
impl DocumentLoader for WebLoader {
    async fn load(&self, url: &str) -> Result<Vec<TextSegment>, LoadError> {
        let content = self.fetch_content(url).await?;
        Ok(vec![content.into_segment()])
    }
}

/// Create a configured HTTP client for scraping
fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Extract title and readable text from an HTML document
pub fn parse_page(url: &str, html: &str) -> Result<WebContent, LoadError> {
    let document = Html::parse_document(html);
    let title = extract_title(&document);
    let text = extract_text(&document);

    if text.trim().is_empty() {
        return Err(LoadError::NoContent);
    }

    Ok(WebContent {
        url: url.to_string(),
        title,
        text,
    })
}

/// Extract the page title from <title> or <h1>
fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].into_iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        let element = document.select(&selector).next()?;
        let title: String = element.text().collect();
        let title = title.trim();
        (!title.is_empty()).then(|| title.to_string())
    })
}

/// Extract readable text content from the page
fn extract_text(document: &Html) -> String {
    // Try to find main content areas first
    let main_selectors = ["article", "main", "[role='main']", ".content", "#content"];

    for selector_str in main_selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = extract_text_from_element(&Html::parse_fragment(&element.html()));
                if !text.trim().is_empty() {
                    return text;
                }
            }
        }
    }

    // Fall back to extracting from body, excluding scripts/styles
    extract_text_from_element(document)
}

/// Extract text from paragraphs and headings, excluding scripts and styles
fn extract_text_from_element(document: &Html) -> String {
    let Ok(content_selector) = Selector::parse("p, h1, h2, h3, h4, h5, h6, li, pre") else {
        return String::new();
    };

    let mut paragraphs: Vec<String> = Vec::new();

    for element in document.select(&content_selector) {
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if cleaned.chars().count() > MIN_BLOCK_CHARS {
            paragraphs.push(cleaned);
        }
    }

    paragraphs.join("\n\n")
}
