//! Named, ordered collections of documents.
//!
//! A collection is immutable once built; the engine swaps whole collections
//! behind an `Arc` instead of editing them in place.

use crate::id::DocId;
use crate::value::Document;

#[derive(Debug, Clone, Default)]
pub struct Collection {
    name: String,
    docs: Vec<Document>,
}

impl Collection {
    pub fn new(name: impl Into<String>, docs: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            docs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        self.docs.get(id.get() as usize)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents paired with their positional ids, in collection order.
    pub fn enumerate(&self) -> impl Iterator<Item = (DocId, &Document)> {
        self.docs
            .iter()
            .enumerate()
            .map(|(i, d)| (DocId::new(i as u64), d))
    }
}
