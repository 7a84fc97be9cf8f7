//! Chatwindow Core - Wire types, configuration, and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::{ChatConfig, ExhaustedPolicy, TrimStrategy};
pub use error::{Error, Result};
pub use types::*;
