//! LLM agent module: the summarizer boundary and its chat-completions client.
//!
//! Everything above this module sees only the [`Summarizer`] trait. The
//! concrete [`ChatClient`] speaks the OpenAI-compatible chat-completions
//! protocol (Groq, OpenAI), with SSE for the streaming variant.

use crate::config::{Config, ConfigError};
use crate::segment::TextSegment;
use crate::sse::{SseFrame, SseParser};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SummarizerError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("LLM API error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

impl From<reqwest::Error> for SummarizerError {
    fn from(error: reqwest::Error) -> Self {
        SummarizerError::RequestFailed(error.to_string())
    }
}

/// Lazy, finite, non-restartable sequence of text fragments.
pub type TokenStream = BoxStream<'static, Result<String, SummarizerError>>;

/// Maps an ordered set of text segments to one summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarise `segments` and return the whole text at once.
    async fn invoke(&self, segments: &[TextSegment]) -> Result<String, SummarizerError>;

    /// Summarise `segments`, yielding fragments whose concatenation equals
    /// what [`Summarizer::invoke`] would return.
    async fn stream(&self, segments: &[TextSegment]) -> Result<TokenStream, SummarizerError>;
}

/// Normalise a summarizer response into its text.
///
/// Accepts a bare string, an object with an `output` field, a chat
/// completion (`choices[0].message.content`), a streaming chunk
/// (`choices[0].delta.content`) or a legacy completion (`choices[0].text`).
pub fn extract_text(response: &Value) -> Option<String> {
    match response {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if let Some(output) = map.get("output") {
                return extract_text(output);
            }
            let choice = map.get("choices")?.as_array()?.first()?;
            choice
                .pointer("/message/content")
                .or_else(|| choice.pointer("/delta/content"))
                .or_else(|| choice.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        _ => None,
    }
}

/// Error message carried by an API error payload, if the value is one
fn extract_error(response: &Value) -> Option<String> {
    let error = response.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Chat-completions client shared read-only by every call in a request
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    prompt: String,
}

impl ChatClient {
    /// Build a client from the configuration; fails when no API key is available
    pub fn new(config: &Config) -> Result<Self, SummarizerError> {
        let api_key = config.api_key()?.to_string();
        let http = Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url().trim_end_matches('/')),
            api_key,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            prompt: config.llm.prompt.clone(),
        })
    }

    /// Stuff the segments into the prompt template, separated by blank lines
    pub fn render_prompt(&self, segments: &[TextSegment]) -> String {
        let context = segments
            .iter()
            .map(TextSegment::text)
            .collect::<Vec<_>>()
            .join("\n\n");
        self.prompt.replace("{context}", &context)
    }

    fn request_body(&self, segments: &[TextSegment], stream: bool) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": stream,
            "messages": [
                { "role": "system", "content": self.render_prompt(segments) }
            ]
        })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, SummarizerError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                format!("failed to read error response body: {e}")
            });
            return Err(SummarizerError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Summarizer for ChatClient {
    async fn invoke(&self, segments: &[TextSegment]) -> Result<String, SummarizerError> {
        let start = Instant::now();
        let body = self.request_body(segments, false);
        debug!(segments = segments.len(), model = %self.model, "LLM call starting");

        let response = self.send(&body).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| SummarizerError::ParseError(e.to_string()))?;
        let text = extract_text(&json)
            .ok_or_else(|| SummarizerError::ParseError(format!("no text in response: {json}")))?;

        info!(
            "LLM call completed - duration={:.2}s, response_length={} chars",
            start.elapsed().as_secs_f32(),
            text.len()
        );
        Ok(text)
    }

    async fn stream(&self, segments: &[TextSegment]) -> Result<TokenStream, SummarizerError> {
        let body = self.request_body(segments, true);
        debug!(segments = segments.len(), model = %self.model, "LLM stream starting");

        let response = self.send(&body).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(token_stream(bytes))
    }
}

type ByteStream = BoxStream<'static, Result<Vec<u8>, reqwest::Error>>;

struct SseState {
    bytes: ByteStream,
    parser: SseParser,
    pending: VecDeque<SseFrame>,
    utf8_buffer: Vec<u8>,
    /// `[DONE]` or a `finish_reason` arrived
    completed: bool,
    input_ended: bool,
    finished: bool,
}

impl SseState {
    /// Feed raw bytes, keeping an incomplete trailing UTF-8 sequence buffered
    fn feed(&mut self, bytes: &[u8]) -> Result<(), SummarizerError> {
        self.utf8_buffer.extend_from_slice(bytes);
        let valid_up_to = match std::str::from_utf8(&self.utf8_buffer) {
            Ok(_) => self.utf8_buffer.len(),
            Err(e) if e.error_len().is_some() => {
                return Err(SummarizerError::Stream(
                    "invalid UTF-8 in streaming response".to_string(),
                ))
            }
            Err(e) => e.valid_up_to(),
        };
        let valid: Vec<u8> = self.utf8_buffer.drain(..valid_up_to).collect();
        let text = String::from_utf8(valid)
            .map_err(|e| SummarizerError::Stream(e.to_string()))?;
        self.pending.extend(self.parser.feed(&text));
        Ok(())
    }
}

/// Turn an SSE byte stream into text fragments
fn token_stream(bytes: ByteStream) -> TokenStream {
    let state = SseState {
        bytes,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        utf8_buffer: Vec::new(),
        completed: false,
        input_ended: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            while let Some(frame) = st.pending.pop_front() {
                let data = match frame {
                    SseFrame::Done => {
                        st.completed = true;
                        st.finished = true;
                        return None;
                    }
                    SseFrame::Data(data) => data,
                };
                let json: Value = match serde_json::from_str(&data) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(error = %e, "skipping non-JSON SSE frame");
                        continue;
                    }
                };
                if let Some(message) = extract_error(&json) {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(SummarizerError::Stream(message)), st));
                }
                if json["choices"][0]["finish_reason"].is_string() {
                    st.completed = true;
                }
                match extract_text(&json) {
                    Some(token) if !token.is_empty() => return Some((Ok(token), st)),
                    _ => continue,
                }
            }

            if st.finished {
                return None;
            }
            if st.input_ended {
                st.finished = true;
                if st.completed {
                    return None;
                }
                return Some((
                    Err(SummarizerError::Stream(
                        "stream closed before the answer was complete".to_string(),
                    )),
                    st,
                ));
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = st.feed(&chunk) {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((
                        Err(SummarizerError::Stream(format!(
                            "error reading streaming response: {e}"
                        ))),
                        st,
                    ));
                }
                None => {
                    st.input_ended = true;
                    if !st.utf8_buffer.is_empty() {
                        warn!("LLM stream ended inside a UTF-8 sequence");
                    }
                    st.pending.extend(st.parser.finish());
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(prompt: &str) -> ChatClient {
        let mut config = Config::default();
        config.api.groq_key = Some("test-key".to_string());
        config.llm.prompt = prompt.to_string();
        ChatClient::new(&config).unwrap()
    }

    fn byte_stream(chunks: Vec<&'static str>) -> ByteStream {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))).boxed()
    }

    #[test]
    fn extract_text_handles_every_shape() {
        assert_eq!(extract_text(&json!("plain")), Some("plain".to_string()));
        assert_eq!(
            extract_text(&json!({ "output": "wrapped" })),
            Some("wrapped".to_string())
        );
        assert_eq!(
            extract_text(&json!({ "choices": [{ "message": { "content": "full" } }] })),
            Some("full".to_string())
        );
        assert_eq!(
            extract_text(&json!({ "choices": [{ "delta": { "content": "tok" } }] })),
            Some("tok".to_string())
        );
        assert_eq!(extract_text(&json!({ "choices": [{ "delta": {} }] })), None);
        assert_eq!(extract_text(&json!(42)), None);
    }

    #[test]
    fn prompt_stuffs_segments_in_order() {
        let client = client("Summarise:\n\n{context}");
        let segments = vec![TextSegment::new("first"), TextSegment::new("second")];
        assert_eq!(client.render_prompt(&segments), "Summarise:\n\nfirst\n\nsecond");

        let body = client.request_body(&segments, true);
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["model"], json!("llama3-8b-8192"));
        assert_eq!(body["messages"][0]["role"], json!("system"));
    }

    #[test]
    fn endpoint_follows_provider() {
        let client = client(crate::config::DEFAULT_PROMPT);
        assert_eq!(client.endpoint, "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn client_requires_api_key() {
        let config = Config::default();
        assert!(matches!(
            ChatClient::new(&config),
            Err(SummarizerError::ConfigError(ConfigError::MissingApiKey(_)))
        ));
    }

    #[tokio::test]
    async fn token_stream_yields_deltas_until_done() {
        let bytes = byte_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":",
            "[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);
        let tokens: Vec<String> = token_stream(bytes)
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn token_stream_reports_error_payload() {
        let bytes = byte_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"rate limited\"}}\n\n",
        ]);
        let items: Vec<_> = token_stream(bytes).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial");
        match &items[1] {
            Err(SummarizerError::Stream(msg)) => assert_eq!(msg, "rate limited"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let bytes = byte_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"The agent \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"plans and\"}}]}",
        ]);
        let items: Vec<_> = token_stream(bytes).collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_deref().unwrap(), "The agent ");
        assert_eq!(items[1].as_deref().unwrap(), "plans and");
        assert!(matches!(items[2], Err(SummarizerError::Stream(_))));
    }

    #[tokio::test]
    async fn finish_reason_completes_without_done() {
        let bytes = byte_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Short.\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}",
        ]);
        let tokens: Vec<String> = token_stream(bytes)
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["Short."]);
    }

    /// Streams a body that is cut off mid-answer
    struct CutOff;

    #[async_trait]
    impl Summarizer for CutOff {
        async fn invoke(&self, _segments: &[TextSegment]) -> Result<String, SummarizerError> {
            Ok("The agent plans and acts.".to_string())
        }

        async fn stream(&self, _segments: &[TextSegment]) -> Result<TokenStream, SummarizerError> {
            Ok(token_stream(byte_stream(vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"The agent \"}}]}\n\n",
            ])))
        }
    }

    #[tokio::test]
    async fn reducer_falls_back_when_stream_is_cut_off() {
        let reduced = crate::reduce::reduce(
            vec!["a".to_string(), "b".to_string()],
            &CutOff,
            8,
            &crate::context::RunContext::default(),
        )
        .await
        .unwrap();
        assert!(reduced.used_fallback);
        assert_eq!(reduced.text, "The agent plans and acts.");
    }

    #[tokio::test]
    async fn empty_stream_is_an_error() {
        let items: Vec<_> = token_stream(byte_stream(vec![])).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn multibyte_split_across_chunks() {
        let full = "data: {\"choices\":[{\"delta\":{\"content\":\"é\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = full.as_bytes();
        let split = full.find('é').unwrap() + 1;
        let parts: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(bytes[..split].to_vec()),
            Ok(bytes[split..].to_vec()),
        ];
        let tokens: Vec<String> = token_stream(stream::iter(parts).boxed())
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["é"]);
    }
}
