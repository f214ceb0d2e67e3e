//! Token counting used to size chunks.
//!
//! With the default `token-count-tiktoken` feature the `o200k_base` BPE
//! (the GPT-4o vocabulary) is used; without it a cheap characters/4
//! heuristic keeps the splitter functional for offline builds.

use std::sync::Arc;

/// Counts tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens `text` encodes to.
    fn count(&self, text: &str) -> usize;
}

/// Approximate counter assuming four characters per token.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

#[cfg(feature = "token-count-tiktoken")]
mod tiktoken {
    use super::TokenCounter;
    use tiktoken_rs::CoreBPE;

    /// Exact counter backed by the `o200k_base` BPE.
    pub struct TiktokenCounter {
        bpe: CoreBPE,
    }

    impl TiktokenCounter {
        /// Builds the counter; fails only if the embedded vocabulary cannot
        /// be loaded.
        pub fn new() -> Result<Self, String> {
            let bpe = tiktoken_rs::o200k_base().map_err(|err| err.to_string())?;
            Ok(Self { bpe })
        }
    }

    impl TokenCounter for TiktokenCounter {
        fn count(&self, text: &str) -> usize {
            self.bpe.encode_with_special_tokens(text).len()
        }
    }
}

#[cfg(feature = "token-count-tiktoken")]
pub use tiktoken::TiktokenCounter;

/// Returns the best counter available for the compiled feature set.
pub fn default_counter() -> Arc<dyn TokenCounter> {
    #[cfg(feature = "token-count-tiktoken")]
    {
        match TiktokenCounter::new() {
            Ok(counter) => return Arc::new(counter),
            Err(err) => {
                tracing::warn!(error = %err, "tiktoken unavailable, using heuristic counter");
            }
        }
    }
    Arc::new(HeuristicCounter)
}
