//! Tests for chatwindow-window: tokenizer leases, budget, and window selection

use chatwindow_core::{ExhaustedPolicy, Message, Role, TrimStrategy};
use chatwindow_window::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// ceil(chars / 4) plus a fixed framing cost for any non-empty text.
struct FramedEncoder {
    overhead: usize,
}

impl Encoder for FramedEncoder {
    fn name(&self) -> &str {
        "framed"
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        (0..self.count(text) as u32).collect()
    }

    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            0
        } else {
            CharEstimateEncoder::default().count(text) + self.overhead
        }
    }
}

fn cl100k() -> TiktokenEncoder {
    TiktokenEncoder::load(EncodingKind::Cl100kBase).expect("cl100k_base should load")
}

/// Deterministic mixed-length history for invariant checks.
fn history(n: usize) -> Vec<Message> {
    (0..n)
        .map(|i| {
            let filler = "lorem ipsum dolor ".repeat((i * 7) % 40 + 1);
            let body = format!("message {} says {} ", i, filler);
            if i % 2 == 0 {
                Message::user(body)
            } else {
                Message::assistant(body)
            }
        })
        .collect()
}

// ===========================================================================
// Tokenizer
// ===========================================================================

#[test]
fn tiktoken_encodes_known_text() {
    let enc = cl100k();
    assert_eq!(enc.name(), "cl100k_base");
    assert_eq!(enc.encode("hello world"), vec![15339, 1917]);
    assert_eq!(enc.count("hello world"), 2);
}

#[test]
fn empty_text_is_zero_tokens() {
    assert_eq!(cl100k().count(""), 0);
    assert_eq!(CharEstimateEncoder::default().count(""), 0);
    let o200k = TiktokenEncoder::load(EncodingKind::O200kBase).unwrap();
    assert_eq!(o200k.count(""), 0);
}

#[test]
fn tiktoken_is_deterministic() {
    let enc = cl100k();
    let text = "The quick brown fox jumps over the lazy dog.";
    assert_eq!(enc.encode(text), enc.encode(text));
}

#[tokio::test]
async fn pool_loads_once_and_tracks_leases() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let pool = EncoderPool::from_loader("test", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let enc: Arc<dyn Encoder> = Arc::new(CharEstimateEncoder::default());
        Ok(enc)
    });
    assert!(!pool.is_loaded());
    assert_eq!(pool.label(), "test");

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert!(pool.is_loaded());
    assert_eq!(pool.outstanding(), 2);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(a.count("hello"), 2);

    a.release();
    assert_eq!(pool.outstanding(), 1);
    drop(b);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn pool_load_failure_is_not_cached() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let pool = EncoderPool::from_loader("flaky", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(TokenizerError::UnknownEncoding("first try".into()))
        } else {
            let enc: Arc<dyn Encoder> = Arc::new(CharEstimateEncoder::default());
            Ok(enc)
        }
    });

    assert!(pool.acquire().await.is_err());
    assert_eq!(pool.outstanding(), 0);
    assert!(!pool.is_loaded());

    let lease = pool.acquire().await.unwrap();
    assert_eq!(lease.name(), "char_estimate");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pool_tiktoken_lease() {
    let pool = EncoderPool::tiktoken(EncodingKind::Cl100kBase);
    let lease = pool.acquire().await.unwrap();
    assert_eq!(lease.count("hello world"), 2);
    drop(lease);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn pool_with_preloaded_encoder() {
    let pool = EncoderPool::with_encoder(Arc::new(CharEstimateEncoder::new(2)));
    assert!(pool.is_loaded());
    assert_eq!(pool.label(), "char_estimate");
    let lease = pool.acquire().await.unwrap();
    assert_eq!(lease.count("abcd"), 2);
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn scenario_a_everything_fits() {
    let enc = CharEstimateEncoder::default();
    let budget = Budget::new(4096, 1000, 50);
    assert_eq!(budget.remaining(), 3046);

    let messages = vec![
        Message::user("a".repeat(280)),
        Message::assistant("b".repeat(240)),
        Message::user("c".repeat(280)),
    ];
    let total: usize = messages.iter().map(|m| enc.count(&m.content)).sum();
    assert_eq!(total, 200);

    let selection =
        select_window(messages.clone(), budget.remaining(), &enc, &SelectorConfig::default());
    assert_eq!(selection.messages, messages);
    assert_eq!(selection.report.kept, 3);
    assert_eq!(selection.report.truncated, 0);
    assert_eq!(selection.report.used_tokens, 200);
    assert!(!selection.report.stopped_early);
}

#[test]
fn scenario_b_latest_message_truncated_not_dropped() {
    let enc = cl100k();
    let budget = Budget::new(2048, 1000, 900);
    assert_eq!(budget.remaining(), 148);

    let long = format!("start{}", " hello".repeat(1999));
    let original_tokens = enc.count(&long);
    assert!(original_tokens >= 1900, "got {}", original_tokens);

    let messages = vec![
        Message::user("an older question"),
        Message::assistant("an older answer"),
        Message::user(long.clone()),
    ];
    let selection = select_window(messages, budget.remaining(), &enc, &SelectorConfig::default());

    assert_eq!(selection.messages.len(), 1);
    let kept = &selection.messages[0];
    assert_eq!(kept.role, Role::User);
    assert!(!kept.content.is_empty());
    assert!(long.ends_with(&kept.content), "truncation must keep the suffix");
    let kept_tokens = enc.count(&kept.content);
    assert!(kept_tokens <= 148, "got {}", kept_tokens);
    assert_eq!(selection.report.truncated, 1);
    assert_eq!(selection.report.dropped, 2);
}

#[test]
fn scenario_c_zero_budget_is_empty() {
    let enc = CharEstimateEncoder::default();
    let budget = Budget::new(2048, 1000, 1048);
    assert_eq!(budget.remaining(), 0);

    let messages = vec![
        Message::user("hi"),
        Message::user(""),
        Message::assistant("x".repeat(5000)),
    ];
    let selection = select_window(messages, budget.remaining(), &enc, &SelectorConfig::default());
    assert!(selection.is_empty());
    assert_eq!(selection.report.considered, 0);
    assert_eq!(selection.report.dropped, 3);
}

#[test]
fn scenario_c_negative_budget_is_empty() {
    let enc = CharEstimateEncoder::default();
    let selection =
        select_window(vec![Message::user("hi")], -500, &enc, &SelectorConfig::default());
    assert!(selection.is_empty());
}

#[test]
fn scenario_d_latest_trims_to_nothing() {
    let enc = FramedEncoder { overhead: 10 };
    // 400 chars -> 110 tokens; proportional cut leaves 72 chars (28 tokens),
    // then one 500-char chunk empties it.
    let messages = vec![Message::user("hi"), Message::user("a".repeat(400))];
    let selection = select_window(messages, 20, &enc, &SelectorConfig::default());

    assert!(selection.is_empty());
    assert_eq!(selection.report.considered, 1);
    assert!(selection.report.stopped_early);
    assert_eq!(selection.report.dropped, 2);
}

// ===========================================================================
// Policy variants
// ===========================================================================

#[test]
fn skip_policy_keeps_scanning_after_exhausted_message() {
    let enc = FramedEncoder { overhead: 10 };
    let config = SelectorConfig {
        on_exhausted: ExhaustedPolicy::SkipMessage,
        ..Default::default()
    };
    let messages = vec![Message::user("hi"), Message::user("a".repeat(400))];
    let selection = select_window(messages, 20, &enc, &config);

    assert_eq!(selection.messages, vec![Message::user("hi")]);
    assert_eq!(selection.report.considered, 2);
    assert!(!selection.report.stopped_early);
    assert_eq!(selection.report.used_tokens, 11);
}

#[test]
fn char_estimate_strategy_respects_budget() {
    let enc = cl100k();
    let config = SelectorConfig {
        strategy: TrimStrategy::CharEstimate,
        ..Default::default()
    };
    let messages = history(30);
    for remaining in [1i64, 50, 300, 1200] {
        let selection = select_window(messages.clone(), remaining, &enc, &config);
        let used: usize = selection.messages.iter().map(|m| enc.count(&m.content)).sum();
        assert!(used as i64 <= remaining, "used {} > {}", used, remaining);
        assert_eq!(used, selection.report.used_tokens);
    }
}

#[test]
fn char_estimate_strategy_drops_short_overflowing_message() {
    let enc = CharEstimateEncoder::default();
    let config = SelectorConfig {
        strategy: TrimStrategy::CharEstimate,
        on_exhausted: ExhaustedPolicy::SkipMessage,
        ..Default::default()
    };
    // newest fills the budget exactly; the 12-char message overflows by 3
    // tokens = 12 chars and is dropped whole, the empty one still fits.
    let messages = vec![
        Message::user(""),
        Message::assistant("x".repeat(12)),
        Message::user("y".repeat(40)),
    ];
    let selection = select_window(messages, 10, &enc, &config);
    assert_eq!(selection.messages.len(), 2);
    assert_eq!(selection.messages[0].content, "");
    assert_eq!(selection.messages[1].content, "y".repeat(40));
}

#[test]
fn selector_config_from_window_config() {
    let mut window = chatwindow_core::config::WindowConfig::default();
    window.trim_chunk_chars = 0;
    window.strategy = TrimStrategy::CharEstimate;
    let config = SelectorConfig::from(&window);
    assert_eq!(config.chunk_chars, 1);
    assert_eq!(config.chars_per_token, 4);
    assert_eq!(config.strategy, TrimStrategy::CharEstimate);
    assert_eq!(config.on_exhausted, ExhaustedPolicy::StopScan);
}

// ===========================================================================
// Invariants
// ===========================================================================

#[test]
fn window_never_exceeds_budget() {
    let enc = cl100k();
    let messages = history(40);
    for remaining in [1i64, 7, 64, 148, 500, 2000, 100_000] {
        let selection =
            select_window(messages.clone(), remaining, &enc, &SelectorConfig::default());
        let used: usize = selection.messages.iter().map(|m| enc.count(&m.content)).sum();
        assert!(used as i64 <= remaining, "used {} > {}", used, remaining);
        assert_eq!(used, selection.report.used_tokens);
    }
}

#[test]
fn window_preserves_order_and_only_cuts_prefixes() {
    let enc = cl100k();
    let messages = history(25);
    let selection = select_window(messages.clone(), 400, &enc, &SelectorConfig::default());
    assert!(!selection.is_empty());

    // Canonical policy keeps a contiguous newest suffix.
    let offset = messages.len() - selection.messages.len();
    for (kept, original) in selection.messages.iter().zip(&messages[offset..]) {
        assert_eq!(kept.role, original.role);
        assert!(original.content.ends_with(&kept.content));
        assert!(kept.content.chars().count() <= original.content.chars().count());
        assert!(enc.count(&kept.content) <= enc.count(&original.content));
        assert!(!kept.content.is_empty());
    }
    // The newest message fits on its own, so it is never cut.
    assert_eq!(selection.messages.last(), messages.last());
}

#[test]
fn large_budget_keeps_everything_untouched() {
    let enc = cl100k();
    let messages = history(10);
    let selection = select_window(messages.clone(), 1_000_000, &enc, &SelectorConfig::default());
    assert_eq!(selection.messages, messages);
    assert_eq!(selection.report.dropped, 0);
}

#[test]
fn empty_history_is_empty_window() {
    let enc = CharEstimateEncoder::default();
    let selection = select_window(Vec::new(), 100, &enc, &SelectorConfig::default());
    assert!(selection.is_empty());
    assert_eq!(selection.report, SelectionReport::default());
}

#[test]
fn multibyte_content_trims_on_char_boundaries() {
    let enc = cl100k();
    let text = "日本語のテキストです。".repeat(200);
    let config = SelectorConfig {
        chunk_chars: 5,
        ..Default::default()
    };
    let selection = select_window(vec![Message::user(text.clone())], 50, &enc, &config);
    assert_eq!(selection.messages.len(), 1);
    let kept = &selection.messages[0].content;
    assert!(text.ends_with(kept.as_str()));
    assert!(enc.count(kept) <= 50);
}
