//! Completion provider trait

use crate::types::CompletionRequest;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The service answered with a structured error body.
    #[error("{message}")]
    Api {
        message: String,
        kind: Option<String>,
        param: Option<String>,
        code: Option<String>,
    },

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("missing api key")]
    MissingApiKey,

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl LlmError {
    /// Message from the service itself, safe to relay to the caller.
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            LlmError::Api { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Generated output as raw UTF-8 chunks, single pass.
pub type ByteStream = Pin<Box<dyn Stream<Item = LlmResult<Bytes>> + Send>>;

/// Completion provider trait
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Open a completion stream. If `cancel` is provided and triggered,
    /// the underlying HTTP connection is dropped and the stream ends.
    async fn open(
        &self,
        request: CompletionRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<ByteStream>;
}

impl From<LlmError> for chatwindow_core::Error {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Api { message, .. } => chatwindow_core::Error::upstream(message),
            other => chatwindow_core::Error::Internal(other.to_string()),
        }
    }
}
