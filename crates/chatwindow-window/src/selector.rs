//! History window selection with token counting
//!
//! Walks the history newest-first and keeps whatever fits the remaining
//! budget. A message that overflows is cut from the front in two phases:
//! a one-shot estimate of how much to remove, then fixed-size chunks until
//! the re-encoded remainder fits.

use crate::tokenizer::Encoder;
use chatwindow_core::config::WindowConfig;
use chatwindow_core::{ExhaustedPolicy, Message, TrimStrategy};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectorConfig {
    pub chars_per_token: usize,
    pub chunk_chars: usize,
    pub strategy: TrimStrategy,
    pub on_exhausted: ExhaustedPolicy,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            chunk_chars: 500,
            strategy: TrimStrategy::Proportional,
            on_exhausted: ExhaustedPolicy::StopScan,
        }
    }
}

impl From<&WindowConfig> for SelectorConfig {
    fn from(config: &WindowConfig) -> Self {
        Self {
            chars_per_token: config.chars_per_token.max(1),
            chunk_chars: config.trim_chunk_chars.max(1),
            strategy: config.strategy,
            on_exhausted: config.on_exhausted,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionReport {
    pub considered: usize,
    pub kept: usize,
    pub truncated: usize,
    pub dropped: usize,
    pub used_tokens: usize,
    /// A message trimmed to nothing ended the scan.
    pub stopped_early: bool,
}

#[derive(Clone, Debug)]
pub struct WindowSelection {
    /// Chronological order.
    pub messages: Vec<Message>,
    pub report: SelectionReport,
}

impl WindowSelection {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Select the newest suffix of `messages` that fits in `remaining` tokens,
/// truncating the oldest kept message where needed.
pub fn select_window<E>(
    messages: Vec<Message>,
    remaining: i64,
    encoder: &E,
    config: &SelectorConfig,
) -> WindowSelection
where
    E: Encoder + ?Sized,
{
    let total = messages.len();
    let mut report = SelectionReport::default();

    if remaining <= 0 {
        report.dropped = total;
        debug!("No history budget ({}), window empty", remaining);
        return WindowSelection {
            messages: Vec::new(),
            report,
        };
    }

    let budget = usize::try_from(remaining).unwrap_or(usize::MAX);
    let mut used = 0usize;
    let mut kept = Vec::with_capacity(total);

    for mut message in messages.into_iter().rev() {
        report.considered += 1;
        let tokens = encoder.count(&message.content);

        if used + tokens <= budget {
            used += tokens;
            kept.push(message);
            continue;
        }

        match trim_to_fit(&mut message.content, tokens, budget - used, encoder, config) {
            Some(trimmed) => {
                used += trimmed;
                report.truncated += 1;
                kept.push(message);
            }
            None => match config.on_exhausted {
                ExhaustedPolicy::StopScan => {
                    report.stopped_early = true;
                    break;
                }
                ExhaustedPolicy::SkipMessage => continue,
            },
        }
    }

    kept.reverse();
    report.kept = kept.len();
    report.dropped = total - kept.len();
    report.used_tokens = used;

    debug!(
        "Selected window: kept={} truncated={} dropped={} used={}/{} stopped_early={}",
        report.kept, report.truncated, report.dropped, used, budget, report.stopped_early
    );

    WindowSelection {
        messages: kept,
        report,
    }
}

/// Cut `content` from the front until it encodes to at most `allowance`
/// tokens. Returns the new token count, or `None` once nothing is left.
fn trim_to_fit<E>(
    content: &mut String,
    tokens: usize,
    allowance: usize,
    encoder: &E,
    config: &SelectorConfig,
) -> Option<usize>
where
    E: Encoder + ?Sized,
{
    let overflow = tokens - allowance;
    let chars = content.chars().count();

    let estimate = match config.strategy {
        TrimStrategy::Proportional => (chars * overflow).div_ceil(tokens),
        TrimStrategy::CharEstimate => {
            let cut = overflow.saturating_mul(config.chars_per_token);
            if cut >= chars {
                content.clear();
                return None;
            }
            cut
        }
    };
    drop_front_chars(content, estimate);

    let chunk = config.chunk_chars.max(1);
    loop {
        if content.is_empty() {
            return None;
        }
        let count = encoder.count(content);
        if count <= allowance {
            return Some(count);
        }
        drop_front_chars(content, chunk);
    }
}

fn drop_front_chars(content: &mut String, n: usize) {
    match content.char_indices().nth(n) {
        Some((idx, _)) => {
            content.drain(..idx);
        }
        None => content.clear(),
    }
}
