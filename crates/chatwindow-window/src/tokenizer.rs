//! Tokenizer adapter: BPE encoders handed out as per-request leases
//!
//! The compiled encoder is immutable and shared. Each request takes a
//! [`TokenizerLease`] from the [`EncoderPool`] and gives it back on drop,
//! so release happens on every exit path, including errors and
//! cancellation.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// Supported BPE encodings.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EncodingKind {
    Cl100kBase,
    O200kBase,
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cl100kBase => f.write_str("cl100k_base"),
            Self::O200kBase => f.write_str("o200k_base"),
        }
    }
}

impl FromStr for EncodingKind {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cl100k_base" => Ok(Self::Cl100kBase),
            "o200k_base" => Ok(Self::O200kBase),
            other => Err(TokenizerError::UnknownEncoding(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to load encoding {kind}")]
    LoadEncoding {
        kind: EncodingKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    #[error("encoder loader task failed: {0}")]
    LoaderTask(String),
}

pub type TokenizerResult<T> = Result<T, TokenizerError>;

impl From<TokenizerError> for chatwindow_core::Error {
    fn from(e: TokenizerError) -> Self {
        chatwindow_core::Error::TokenizerInit(e.to_string())
    }
}

/// Text to token ids. Deterministic for a given input.
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Vec<u32>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Thin wrapper around a `tiktoken_rs::CoreBPE`.
pub struct TiktokenEncoder {
    kind: EncodingKind,
    inner: CoreBPE,
}

impl TiktokenEncoder {
    /// Build the encoder tables. This is the expensive step.
    pub fn load(kind: EncodingKind) -> TokenizerResult<Self> {
        let loader: fn() -> anyhow::Result<CoreBPE> = match kind {
            EncodingKind::Cl100kBase => tiktoken_rs::cl100k_base,
            EncodingKind::O200kBase => tiktoken_rs::o200k_base,
        };
        let inner = loader().map_err(|source| TokenizerError::LoadEncoding { kind, source })?;
        Ok(Self { kind, inner })
    }
}

impl Encoder for TiktokenEncoder {
    fn name(&self) -> &str {
        match self.kind {
            EncodingKind::Cl100kBase => "cl100k_base",
            EncodingKind::O200kBase => "o200k_base",
        }
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        self.inner.encode_ordinary(text).into_iter().collect()
    }
}

impl fmt::Debug for TiktokenEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TiktokenEncoder {{ kind: {} }}", self.kind)
    }
}

/// `ceil(chars / chars_per_token)` pseudo tokens. No vocabulary needed.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimateEncoder {
    chars_per_token: usize,
}

impl CharEstimateEncoder {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharEstimateEncoder {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Encoder for CharEstimateEncoder {
    fn name(&self) -> &str {
        "char_estimate"
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        (0..self.count(text) as u32).collect()
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

type Loader = Arc<dyn Fn() -> TokenizerResult<Arc<dyn Encoder>> + Send + Sync>;

/// Lazily loads one shared encoder and leases it out per request.
pub struct EncoderPool {
    label: String,
    loader: Loader,
    encoder: OnceCell<Arc<dyn Encoder>>,
    outstanding: Arc<AtomicUsize>,
}

impl EncoderPool {
    /// Pool backed by a tiktoken encoding, loaded on first acquire.
    pub fn tiktoken(kind: EncodingKind) -> Self {
        Self::from_loader(kind.to_string(), move || {
            let encoder: Arc<dyn Encoder> = Arc::new(TiktokenEncoder::load(kind)?);
            Ok(encoder)
        })
    }

    /// Pool around an encoder that is already built.
    pub fn with_encoder(encoder: Arc<dyn Encoder>) -> Self {
        let label = encoder.name().to_string();
        Self {
            label,
            loader: Arc::new(|| Err(TokenizerError::LoaderTask("preloaded pool".into()))),
            encoder: OnceCell::new_with(Some(encoder)),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_loader<F>(label: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> TokenizerResult<Arc<dyn Encoder>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            loader: Arc::new(loader),
            encoder: OnceCell::new(),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire a lease, loading the encoder on first use. A failed load
    /// is not cached; the next caller tries again.
    pub async fn acquire(&self) -> TokenizerResult<TokenizerLease> {
        let encoder = self
            .encoder
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                debug!("Loading encoder {}", self.label);
                tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| TokenizerError::LoaderTask(e.to_string()))?
            })
            .await?;

        let active = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Tokenizer lease acquired ({} outstanding)", active);
        Ok(TokenizerLease {
            encoder: Arc::clone(encoder),
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_loaded(&self) -> bool {
        self.encoder.initialized()
    }

    /// Leases handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

/// Scoped access to the shared encoder. Released on drop.
pub struct TokenizerLease {
    encoder: Arc<dyn Encoder>,
    outstanding: Arc<AtomicUsize>,
}

impl TokenizerLease {
    /// Release explicitly. Equivalent to dropping the lease.
    pub fn release(self) {
        drop(self);
    }
}

impl Encoder for TokenizerLease {
    fn name(&self) -> &str {
        self.encoder.name()
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        self.encoder.encode(text)
    }

    fn count(&self, text: &str) -> usize {
        self.encoder.count(text)
    }
}

impl Drop for TokenizerLease {
    fn drop(&mut self) {
        let remaining = self.outstanding.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        trace!("Tokenizer lease released ({} outstanding)", remaining);
    }
}
