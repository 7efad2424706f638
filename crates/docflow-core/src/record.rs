//! Records: a document plus the per-document metadata that rides along with it.

use serde::{Deserialize, Serialize};

use crate::value::Document;

/// Metadata attached by stages rather than stored in the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Relevance score assigned by a text-search source; read via `{$meta: "textScore"}`.
    pub text_score: Option<f64>,
}

/// The unit that flows between stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub doc: Document,
    pub meta: Meta,
}

impl Record {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            meta: Meta::default(),
        }
    }

    pub fn with_text_score(mut self, score: f64) -> Self {
        self.meta.text_score = Some(score);
        self
    }

    /// Replace the document, keeping metadata.
    pub fn map_doc(self, doc: Document) -> Self {
        Self {
            doc,
            meta: self.meta,
        }
    }

    pub fn into_document(self) -> Document {
        self.doc
    }
}

impl From<Document> for Record {
    fn from(doc: Document) -> Self {
        Record::new(doc)
    }
}
