//! Error types for Chatwindow

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("tokenizer init failed: {0}")]
    TokenizerInit(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("upstream completion error: {message}")]
    Upstream { message: String },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest(reason.into())
    }

    /// Detail that may be relayed to the caller. Only upstream rejections
    /// carry one; everything else surfaces as a bare failure.
    pub fn public_detail(&self) -> Option<&str> {
        match self {
            Self::Upstream { message } => Some(message),
            _ => None,
        }
    }
}
