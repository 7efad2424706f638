//! Collection catalog.
//!
//! Each name maps to an immutable `CatalogEntry` (collection + optional text
//! index) behind an `Arc`. Writers build the replacement entry completely,
//! index included, and only then swap it in, so a run never observes a
//! collection paired with an index built for a different version of it.
//! Runs take a `Snapshot` (a copy of the map of `Arc`s) at start and ignore
//! later swaps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use docflow_core::collection::Collection;
use docflow_core::path::FieldPath;
use docflow_core::value::Document;
use docflow_operators::CollectionProvider;
use docflow_text::{TextIndex, Tokenizer};

#[derive(Debug)]
pub struct CatalogEntry {
    pub collection: Arc<Collection>,
    pub text_index: Option<Arc<TextIndex>>,
}

impl CatalogEntry {
    fn text_fields(&self) -> Option<Vec<FieldPath>> {
        self.text_index.as_ref().map(|idx| idx.fields().to_vec())
    }
}

#[derive(Default)]
pub struct Catalog {
    entries: RwLock<HashMap<String, Arc<CatalogEntry>>>,
    // Serializes writers so a rebuild never races a concurrent replace.
    writer: Mutex<()>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. A text index declared on the previous
    /// version is rebuilt over the new documents before the swap.
    pub fn insert(&self, name: &str, docs: Vec<Document>, tokenizer: &Tokenizer) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let fields = self.entry(name).and_then(|e| e.text_fields());
        let collection = Arc::new(Collection::new(name, docs));
        let text_index = fields.map(|fields| {
            Arc::new(TextIndex::build(&collection, fields, tokenizer.clone()))
        });
        self.swap(name, CatalogEntry {
            collection,
            text_index,
        });
    }

    /// Declare (or redeclare) the text index of `name`. Returns false when
    /// there is no such collection.
    pub fn create_text_index(&self, name: &str, fields: Vec<FieldPath>, tokenizer: &Tokenizer) -> bool {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = self.entry(name) else {
            return false;
        };
        let index = TextIndex::build(&current.collection, fields, tokenizer.clone());
        self.swap(name, CatalogEntry {
            collection: current.collection.clone(),
            text_index: Some(Arc::new(index)),
        });
        true
    }

    pub fn remove(&self, name: &str) -> bool {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn entry(&self, name: &str) -> Option<Arc<CatalogEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Collection names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn swap(&self, name: &str, entry: CatalogEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(entry));
    }
}

/// Point-in-time view of the catalog used for one run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: HashMap<String, Arc<CatalogEntry>>,
}

impl Snapshot {
    pub fn document_count(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|e| e.collection.len())
    }
}

impl CollectionProvider for Snapshot {
    fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.entries.get(name).map(|e| e.collection.clone())
    }

    fn text_index(&self, name: &str) -> Option<Arc<TextIndex>> {
        self.entries.get(name).and_then(|e| e.text_index.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notes(texts: &[&str]) -> Vec<Document> {
        texts
            .iter()
            .map(|t| Document::try_from(json!({"note_text": t})).unwrap())
            .collect()
    }

    #[test]
    fn replace_rebuilds_the_text_index() {
        let catalog = Catalog::new();
        let tokenizer = Tokenizer::default();
        catalog.insert("notes", notes(&["fatigue"]), &tokenizer);
        assert!(catalog.create_text_index(
            "notes",
            vec![FieldPath::parse("note_text").unwrap()],
            &tokenizer
        ));

        catalog.insert("notes", notes(&["nausea", "nausea again"]), &tokenizer);
        let entry = catalog.entry("notes").unwrap();
        let index = entry.text_index.as_ref().unwrap();
        assert_eq!(index.total_docs(), 2);
        assert_eq!(index.doc_freq("nausea"), 2);
        assert_eq!(index.doc_freq("fatigue"), 0);
    }

    #[test]
    fn snapshots_ignore_later_writes() {
        let catalog = Catalog::new();
        let tokenizer = Tokenizer::default();
        catalog.insert("notes", notes(&["a"]), &tokenizer);
        let snap = catalog.snapshot();
        catalog.insert("notes", notes(&["a", "b", "c"]), &tokenizer);
        assert_eq!(snap.document_count("notes"), Some(1));
        assert_eq!(catalog.snapshot().document_count("notes"), Some(3));
    }

    #[test]
    fn text_index_needs_a_collection() {
        let catalog = Catalog::new();
        assert!(!catalog.create_text_index("missing", vec![], &Tokenizer::default()));
        assert!(catalog.names().is_empty());
    }
}
