//! Chatwindow Window - Token budgeting and history window selection

pub mod budget;
pub mod selector;
pub mod tokenizer;

pub use budget::{remaining_budget, Budget};
pub use selector::{select_window, SelectionReport, SelectorConfig, WindowSelection};
pub use tokenizer::{
    CharEstimateEncoder, Encoder, EncoderPool, EncodingKind, TiktokenEncoder, TokenizerError,
    TokenizerLease, TokenizerResult,
};
