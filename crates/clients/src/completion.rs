//! Completion-backend adapter — streaming FIM completions.
//!
//! Issues one streaming POST per completion and exposes the response as a
//! [`BoxStream`] of [`CompletionEvent`]s. Failing to connect (or any error
//! before the first chunk) is `BackendUnavailable`; once the stream exists,
//! transport errors surface *through* the stream so already-received chunks
//! stay usable.

use serde::Deserialize;

use ca_domain::config::CompletionConfig;
use ca_domain::error::{Error, Result};
use ca_domain::stream::{BoxStream, CompletionEvent};

use crate::sse::sse_response_stream;
use crate::util::{from_reqwest, resolve_api_key};

/// Streams completions for a rendered FIM prompt.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn stream(&self, prompt: String) -> Result<BoxStream<'static, Result<CompletionEvent>>>;
}

/// HTTP adapter for the completion backend (SSE streaming).
pub struct HttpCompletionClient {
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn from_config(cfg: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            api_key: resolve_api_key(&cfg.api_key_env),
            client,
        })
    }
}

/// One SSE `data:` payload from the backend.
#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Parse one `data:` payload into stream events. `[DONE]` is the end
/// sentinel; anything unparseable is an in-stream error event rather than a
/// stream abort, matching the partial-results contract.
fn parse_data(data: &str) -> Vec<Result<CompletionEvent>> {
    if data == "[DONE]" {
        return vec![Ok(CompletionEvent::Done {
            finish_reason: None,
        })];
    }

    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(payload) => {
            let mut events = Vec::new();
            if !payload.text.is_empty() {
                events.push(Ok(CompletionEvent::Chunk {
                    text: payload.text,
                }));
            }
            if let Some(reason) = payload.finish_reason {
                events.push(Ok(CompletionEvent::Done {
                    finish_reason: Some(reason),
                }));
            }
            events
        }
        Err(e) => vec![Ok(CompletionEvent::Error {
            message: format!("unparseable chunk: {e}"),
        })],
    }
}

#[async_trait::async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn stream(&self, prompt: String) -> Result<BoxStream<'static, Result<CompletionEvent>>> {
        let url = format!("{}/v1/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        let mut request = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        // Everything up to here is "before the first chunk": connect errors,
        // timeouts, and HTTP-level rejections all mean no partial result
        // can exist yet.
        let response = request
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(from_reqwest(e).to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::BackendUnavailable(format!("HTTP {status}: {text}")));
        }

        Ok(sse_response_stream(response, parse_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chunk_payload() {
        let events = parse_data(r#"{"text":"fn main"}"#);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Ok(CompletionEvent::Chunk { ref text }) if text == "fn main"
        ));
    }

    #[test]
    fn parse_done_sentinel() {
        let events = parse_data("[DONE]");
        assert!(matches!(events[0], Ok(CompletionEvent::Done { .. })));
    }

    #[test]
    fn parse_finish_reason_emits_done() {
        let events = parse_data(r#"{"text":"}","finish_reason":"stop"}"#);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(CompletionEvent::Chunk { .. })));
        assert!(matches!(
            events[1],
            Ok(CompletionEvent::Done { finish_reason: Some(ref r) }) if r == "stop"
        ));
    }

    #[test]
    fn parse_garbage_is_in_stream_error() {
        let events = parse_data("{broken");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(CompletionEvent::Error { .. })));
    }

    #[test]
    fn parse_empty_text_emits_nothing() {
        let events = parse_data(r#"{"text":""}"#);
        assert!(events.is_empty());
    }
}
