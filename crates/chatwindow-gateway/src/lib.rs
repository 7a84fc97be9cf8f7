//! Chatwindow Gateway - HTTP chat endpoint with token-budgeted history

pub mod chat;
pub mod server;

pub use chat::{prepare_completion, ApiError, CancelOnDrop};
pub use server::{router, start_gateway, AppState};
