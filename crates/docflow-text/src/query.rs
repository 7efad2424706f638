//! `$search` string parsing.
//!
//! Syntax: bare words are terms, `"..."` spans are phrases, and a word with a
//! leading `-` is a negation. An unterminated quote runs to the end of the
//! string.

use crate::tokenizer::Tokenizer;

/// A quoted phrase: its tokens and each token's offset from the first one.
/// Offsets differ from `0, 1, 2, ...` when the tokenizer dropped words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub tokens: Vec<String>,
    pub offsets: Vec<u32>,
}

impl Phrase {
    fn from_positions(positions: Vec<(u32, String)>) -> Option<Phrase> {
        let base = positions.first()?.0;
        let (offsets, tokens) = positions.into_iter().map(|(pos, t)| (pos - base, t)).unzip();
        Some(Phrase { tokens, offsets })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextQuery {
    /// Distinct bare terms in first-appearance order.
    pub terms: Vec<String>,
    /// Quoted phrases; empty phrases are dropped.
    pub phrases: Vec<Phrase>,
    /// Tokens that exclude a document when present.
    pub negated: Vec<String>,
}

impl TextQuery {
    pub fn parse(search: &str, tokenizer: &Tokenizer) -> Self {
        let mut query = TextQuery::default();
        let mut rest = search;

        while !rest.is_empty() {
            match rest.find('"') {
                Some(open) => {
                    query.add_words(&rest[..open], tokenizer);
                    let after = &rest[open + 1..];
                    let (phrase, next) = match after.find('"') {
                        Some(close) => (&after[..close], &after[close + 1..]),
                        None => (after, ""),
                    };
                    let tokens = tokenizer.tokenize_positions(phrase);
                    if let Some(phrase) = Phrase::from_positions(tokens) {
                        query.phrases.push(phrase);
                    }
                    rest = next;
                }
                None => {
                    query.add_words(rest, tokenizer);
                    rest = "";
                }
            }
        }
        query
    }

    fn add_words(&mut self, text: &str, tokenizer: &Tokenizer) {
        for word in text.split_whitespace() {
            match word.strip_prefix('-') {
                Some(negated) if !negated.is_empty() => {
                    for token in tokenizer.tokenize(negated) {
                        push_unique(&mut self.negated, token);
                    }
                }
                _ => {
                    for token in tokenizer.tokenize(word) {
                        push_unique(&mut self.terms, token);
                    }
                }
            }
        }
    }

    /// Distinct tokens that contribute to relevance: terms, then phrase tokens.
    pub fn scoring_tokens(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for token in self.terms.iter().chain(self.phrases.iter().flat_map(|p| &p.tokens)) {
            if !out.contains(&token.as_str()) {
                out.push(token);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.phrases.is_empty()
    }
}

fn push_unique(into: &mut Vec<String>, token: String) {
    if !into.contains(&token) {
        into.push(token);
    }
}
