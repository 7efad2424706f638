//! Relevance scoring.
//!
//! A scorer turns per-term statistics into a contribution; the index sums the
//! contributions over the distinct query tokens present in a document. Any
//! implementation must be monotonic in `tf`, decreasing in `df`, and pure.

/// Pluggable per-term relevance function.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Contribution of one query token to one document.
    ///
    /// `tf` is the token's frequency in the document (all indexed fields),
    /// `df` the number of documents containing it, `total_docs` the corpus size.
    fn term_score(&self, tf: u32, df: usize, total_docs: usize) -> f64;
}

/// `tf × ln(1 + N / df)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdfScorer;

impl Scorer for TfIdfScorer {
    fn name(&self) -> &'static str {
        "tf-idf"
    }

    fn term_score(&self, tf: u32, df: usize, total_docs: usize) -> f64 {
        if tf == 0 || df == 0 {
            return 0.0;
        }
        let idf = (1.0 + total_docs as f64 / df as f64).ln();
        tf as f64 * idf
    }
}
