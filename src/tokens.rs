//! Token counting collaborator.
//!
//! The optimizer treats token counts as opaque costs. Hosts with a real
//! tokenizer implement [`TokenCounter`]; the heuristic counter is the default.

/// Counts tokens in a piece of text. Must be deterministic for identical input.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Approximates tokens as `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenCounter {
    chars_per_token: usize,
}

impl HeuristicTokenCounter {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(self.chars_per_token)
    }
}
