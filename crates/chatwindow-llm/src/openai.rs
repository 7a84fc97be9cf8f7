//! OpenAI-compatible chat completions provider with SSE streaming

use crate::provider::{ByteStream, CompletionProvider, LlmError, LlmResult};
use crate::types::{ApiErrorBody, ChatCompletionChunk, CompletionRequest};
use bytes::Bytes;
use chatwindow_core::config::DEFAULT_API_HOST;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const DONE_MARKER: &str = "[DONE]";

pub struct OpenAiProvider {
    client: Client,
    api_host: String,
    fallback_key: Option<String>,
    organization: Option<String>,
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new(DEFAULT_API_HOST)
    }
}

impl OpenAiProvider {
    pub fn new(api_host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_host: api_host.into(),
            fallback_key: None,
            organization: None,
        }
    }

    /// Key used when a request arrives with an empty one.
    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        self.fallback_key = key;
        self
    }

    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.api_host.trim_end_matches('/'), COMPLETIONS_PATH)
    }

    fn resolve_key(&self, key: &str) -> LlmResult<String> {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
        self.fallback_key.clone().ok_or(LlmError::MissingApiKey)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn open(
        &self,
        request: CompletionRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<ByteStream> {
        let key = self.resolve_key(&request.key)?;
        let body = request.to_body();

        debug!(
            "OpenAI request: model={} messages={} max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens
        );

        let mut builder = self.client.post(self.endpoint()).bearer_auth(&key).json(&body);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = match &cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LlmError::Cancelled),
                sent = builder.send() => sent?,
            },
            None => builder.send().await?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI error {}: {}", status, error_text);
            return Err(error_from_body(status, &error_text));
        }

        Ok(Box::pin(parse_sse_stream(response.bytes_stream(), cancel)))
    }
}

/// Classify a non-success response. Structured error bodies become
/// `LlmError::Api`; anything else is a plain request failure.
pub(crate) fn error_from_body(status: StatusCode, text: &str) -> LlmError {
    if let Ok(body) = serde_json::from_str::<ApiErrorBody>(text) {
        return LlmError::Api {
            message: body.error.message,
            kind: body.error.kind,
            param: body.error.param,
            code: body.error.code,
        };
    }
    let detail = if text.trim().is_empty() {
        status.canonical_reason().unwrap_or(status.as_str()).to_string()
    } else {
        text.to_string()
    };
    LlmError::RequestFailed(format!("OpenAI API returned an error: {}", detail))
}

/// Turn an SSE byte stream into the generated text, chunk by chunk.
pub(crate) fn parse_sse_stream<S, E>(
    bytes_stream: S,
    cancel: Option<CancellationToken>,
) -> impl Stream<Item = LlmResult<Bytes>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let events = bytes_stream.eventsource();
        tokio::pin!(events);
        let cancel = cancel.unwrap_or_default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Completion stream cancelled");
                    break;
                }
                next = events.next() => next,
            };

            let Some(event) = next else { break };
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    break;
                }
            };

            if event.data == DONE_MARKER {
                break;
            }

            match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                Ok(chunk) => {
                    if let Some(text) = chunk.text().filter(|t| !t.is_empty()) {
                        yield Ok(Bytes::from(text.to_owned()));
                    }
                }
                Err(e) => {
                    yield Err(LlmError::InvalidResponse(e.to_string()));
                    break;
                }
            }
        }
    }
}
