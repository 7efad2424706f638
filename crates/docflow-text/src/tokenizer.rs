//! Text tokenization shared by index builds and query parsing.
//!
//! Both sides must tokenize identically, otherwise positions computed at build
//! time would not line up with phrase tokens computed at query time.

use docflow_core::config::EngineConfig;

/// English stop words dropped when `stop_words` is enabled.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "in", "is", "it", "its", "of", "on", "or", "she", "that", "the", "their",
    "there", "they", "this", "to", "was", "were", "will", "with",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenizer {
    min_len: usize,
    stop_words: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            min_len: 1,
            stop_words: false,
        }
    }
}

impl Tokenizer {
    pub fn new(min_len: usize, stop_words: bool) -> Self {
        Self {
            min_len: min_len.max(1),
            stop_words,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(cfg.text_min_token_len, cfg.text_stop_words)
    }

    /// Tokenize text into searchable terms:
    /// - Lowercase
    /// - Split on non-alphanumeric characters
    /// - Drop tokens shorter than `min_len` chars, and stop words if enabled
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_positions(text)
            .into_iter()
            .map(|(_, token)| token)
            .collect()
    }

    /// Like [`tokenize`](Self::tokenize), paired with each token's position
    /// among all words of `text`. Dropped words still take a position, so
    /// two kept tokens are adjacent only if they are adjacent in the text.
    pub fn tokenize_positions(&self, text: &str) -> Vec<(u32, String)> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .enumerate()
            .filter(|(_, s)| self.keeps(s))
            .map(|(pos, s)| (pos as u32, s.to_string()))
            .collect()
    }

    fn keeps(&self, word: &str) -> bool {
        word.chars().count() >= self.min_len && !(self.stop_words && STOP_WORDS.contains(&word))
    }
}
