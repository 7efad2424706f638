//! Positional inverted index over the text fields of one collection.
//!
//! Each indexed string (a field value, or one string element of an array
//! field) is a *slot*. Postings record the token positions per
//! `(document, slot)`, which is what phrase matching needs: a phrase matches
//! only when its tokens sit at consecutive positions of the same slot.
//!
//! Postings for a term are kept ordered by `(doc, slot)` because the build
//! walks the collection in order; lookups rely on that for binary search.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use docflow_core::collection::Collection;
use docflow_core::id::DocId;
use docflow_core::path::FieldPath;
use docflow_core::value::Value;
use serde::Serialize;

use crate::query::{Phrase, TextQuery};
use crate::scorer::{Scorer, TfIdfScorer};
use crate::tokenizer::Tokenizer;

/// Occurrences of one term within one slot of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc: DocId,
    pub slot: u32,
    /// Ascending token positions within the slot.
    pub positions: Vec<u32>,
}

/// A matching document and its relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextHit {
    pub doc: DocId,
    pub score: f64,
}

pub struct TextIndex {
    fields: Vec<FieldPath>,
    tokenizer: Tokenizer,
    postings: HashMap<String, Vec<Posting>>,
    doc_freqs: HashMap<String, usize>,
    total_docs: usize,
    scorer: Arc<dyn Scorer>,
}

impl TextIndex {
    /// Build the index in one pass over `collection`.
    pub fn build(collection: &Collection, fields: Vec<FieldPath>, tokenizer: Tokenizer) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();

        for (doc_id, doc) in collection.enumerate() {
            let mut slot = 0u32;
            for field in &fields {
                for text in slot_texts(doc.resolve(field)) {
                    let mut per_term: HashMap<String, Vec<u32>> = HashMap::new();
                    for (pos, token) in tokenizer.tokenize_positions(&text) {
                        per_term.entry(token).or_default().push(pos);
                    }
                    for (term, positions) in per_term {
                        postings.entry(term).or_default().push(Posting {
                            doc: doc_id,
                            slot,
                            positions,
                        });
                    }
                    slot += 1;
                }
            }
        }

        let doc_freqs = postings
            .iter()
            .map(|(term, list)| {
                let mut docs = 0;
                let mut last = None;
                for p in list {
                    if last != Some(p.doc) {
                        docs += 1;
                        last = Some(p.doc);
                    }
                }
                (term.clone(), docs)
            })
            .collect();

        Self {
            fields,
            tokenizer,
            postings,
            doc_freqs,
            total_docs: collection.len(),
            scorer: Arc::new(TfIdfScorer),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn fields(&self) -> &[FieldPath] {
        &self.fields
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn total_docs(&self) -> usize {
        self.total_docs
    }

    pub fn distinct_terms(&self) -> usize {
        self.postings.len()
    }

    /// Number of documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freqs.get(term).copied().unwrap_or(0)
    }

    /// Occurrences of `term` in `doc` across every indexed slot.
    pub fn term_frequency(&self, term: &str, doc: DocId) -> u32 {
        self.doc_postings(term, doc)
            .iter()
            .map(|p| p.positions.len() as u32)
            .sum()
    }

    fn contains(&self, term: &str, doc: DocId) -> bool {
        !self.doc_postings(term, doc).is_empty()
    }

    fn doc_postings(&self, term: &str, doc: DocId) -> &[Posting] {
        let Some(list) = self.postings.get(term) else {
            return &[];
        };
        let start = list.partition_point(|p| p.doc < doc);
        let end = list.partition_point(|p| p.doc <= doc);
        &list[start..end]
    }

    /// True when `phrase` occurs in order within one slot of `doc`, each token
    /// at its offset from the first.
    pub fn phrase_matches(&self, phrase: &Phrase, doc: DocId) -> bool {
        let Some((first, rest)) = phrase.tokens.split_first() else {
            return false;
        };
        for head in self.doc_postings(first, doc) {
            for &start in &head.positions {
                let mut others = rest.iter().zip(phrase.offsets.iter().skip(1));
                let contiguous = others.all(|(token, &offset)| {
                    let want = start + offset;
                    self.doc_postings(token, doc)
                        .iter()
                        .any(|p| p.slot == head.slot && p.positions.binary_search(&want).is_ok())
                });
                if contiguous {
                    return true;
                }
            }
        }
        false
    }

    /// Relevance of `doc` for `query`: the sum of the scorer's contribution for
    /// every distinct term and phrase token.
    pub fn score(&self, query: &TextQuery, doc: DocId) -> f64 {
        query
            .scoring_tokens()
            .into_iter()
            .map(|token| {
                self.scorer.term_score(
                    self.term_frequency(token, doc),
                    self.doc_freq(token),
                    self.total_docs,
                )
            })
            .sum()
    }

    /// Matching documents in collection order.
    ///
    /// A document matches when it contains any bare term or satisfies every
    /// phrase; with `phrases_required` and at least one phrase, it must
    /// satisfy every phrase. A negated token always excludes.
    pub fn search(&self, query: &TextQuery, phrases_required: bool) -> Vec<TextHit> {
        let mut candidates: BTreeSet<DocId> = BTreeSet::new();
        for token in query.scoring_tokens() {
            if let Some(list) = self.postings.get(token) {
                candidates.extend(list.iter().map(|p| p.doc));
            }
        }

        let mut hits = Vec::new();
        for doc in candidates {
            if query.negated.iter().any(|t| self.contains(t, doc)) {
                continue;
            }
            let phrases_ok = !query.phrases.is_empty()
                && query.phrases.iter().all(|ph| self.phrase_matches(ph, doc));
            let matched = if phrases_required && !query.phrases.is_empty() {
                phrases_ok
            } else {
                phrases_ok || query.terms.iter().any(|t| self.contains(t, doc))
            };
            if matched {
                hits.push(TextHit {
                    doc,
                    score: self.score(query, doc),
                });
            }
        }
        hits
    }
}

impl fmt::Debug for TextIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextIndex")
            .field("fields", &self.fields)
            .field("total_docs", &self.total_docs)
            .field("distinct_terms", &self.postings.len())
            .field("scorer", &self.scorer.name())
            .finish()
    }
}

/// Strings indexed for one field value: the string itself, or each string
/// element of an array. Anything else is not text.
fn slot_texts(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
