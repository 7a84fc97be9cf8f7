//! Completion request types

use chatwindow_core::{Message, ModelDescriptor};
use serde::{Deserialize, Serialize};

/// Everything the provider needs for one completion call.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub model: ModelDescriptor,
    pub system_prompt: String,
    pub temperature: f32,
    /// Bearer credential; empty means "use the provider's fallback".
    pub key: String,
    /// Selected history window, chronological.
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

/// Chat completion body as sent on the wire.
#[derive(Clone, Debug, Serialize)]
pub struct ChatCompletionBody<'a> {
    pub model: &'a str,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

impl CompletionRequest {
    /// System prompt first, then the window.
    pub fn wire_messages(&self) -> Vec<Message> {
        std::iter::once(Message::system(self.system_prompt.clone()))
            .chain(self.messages.iter().cloned())
            .collect()
    }

    pub fn to_body(&self) -> ChatCompletionBody<'_> {
        ChatCompletionBody {
            model: &self.model.id,
            messages: self.wire_messages(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        }
    }
}

/// One streamed chunk of a chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    pub fn text(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

/// `{ "error": { ... } }` body returned on failure.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
}

fn string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
