//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, plus a fixed
//! per-entry overhead for role and framing on the wire. Budgets are compared
//! against these estimates, never against real tokenizer counts.

/// Tokens charged per entry for role name and delimiters.
pub const ENTRY_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for one entry including overhead.
pub fn estimate_entry_tokens(content: &str) -> usize {
    ENTRY_OVERHEAD + estimate_tokens(content)
}
