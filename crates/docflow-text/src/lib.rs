#![forbid(unsafe_code)]
//! docflow-text: text indexing and relevance-ranked lookup.
//!
//! - `tokenizer`: lower-case, split on non-alphanumeric boundaries, optional stop words.
//! - `query`: parse a `$search` string into bare terms, quoted phrases, and negations.
//! - `index`: positional inverted index over one or more string fields of a collection.
//! - `scorer`: pluggable relevance scoring; the default is TF-IDF.
//!
//! An index is built once per collection snapshot and is read-only afterwards,
//! so any number of concurrent pipelines may share it behind an `Arc`.

pub mod index;
pub mod query;
pub mod scorer;
pub mod tokenizer;

pub use index::{Posting, TextHit, TextIndex};
pub use query::{Phrase, TextQuery};
pub use scorer::{Scorer, TfIdfScorer};
pub use tokenizer::Tokenizer;
