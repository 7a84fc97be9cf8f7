//! Chatwindow LLM - Completion provider adapters with streaming support

pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::{ByteStream, CompletionProvider, LlmError, LlmResult};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
