//! Token budget for message history

/// `token_limit - reserved_reply - prompt_tokens`, signed so a prompt that
/// alone overflows the model shows up as a negative budget.
pub fn remaining_budget(token_limit: u32, reserved_reply: u32, prompt_tokens: usize) -> i64 {
    let prompt = i64::try_from(prompt_tokens).unwrap_or(i64::MAX);
    i64::from(token_limit) - i64::from(reserved_reply) - prompt
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    pub token_limit: u32,
    pub reserved_reply: u32,
    pub prompt_tokens: usize,
}

impl Budget {
    pub fn new(token_limit: u32, reserved_reply: u32, prompt_tokens: usize) -> Self {
        Self {
            token_limit,
            reserved_reply,
            prompt_tokens,
        }
    }

    pub fn remaining(&self) -> i64 {
        remaining_budget(self.token_limit, self.reserved_reply, self.prompt_tokens)
    }

    /// No history can be sent at all.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() <= 0
    }
}
