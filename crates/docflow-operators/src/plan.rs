//! Operator planning surface: `OpPlan`.
//!
//! This is what `explain` prints for each compiled stage; it is cheap to
//! build and carries no data.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpPlan {
    pub stage: String,

    /// Blocking stages materialize their whole input before emitting.
    pub blocking: bool,

    /// Collections this stage reads besides its input stream (`$lookup`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reads: Vec<String>,

    /// Short human-readable parameter summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OpPlan {
    pub fn new(stage: &str, blocking: bool) -> Self {
        Self {
            stage: stage.to_string(),
            blocking,
            reads: vec![],
            detail: None,
        }
    }

    pub fn with_reads(mut self, collections: Vec<String>) -> Self {
        self.reads = collections;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
