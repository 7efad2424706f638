//! Run manifest for audit/replay.
//!
//! The engine emits a manifest after every successful pipeline execution. A
//! fixed pipeline over fixed collections always yields the same
//! `pipeline_hash` and the same output count.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

/// One collection read by the run, as it was in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDigest {
    pub collection: String,
    pub documents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Stable hash of the pipeline description (stages and parameters).
    pub pipeline_hash: Hash256,

    /// Engine version string for provenance.
    pub engine_version: String,

    /// Source collection first, then `$lookup` targets in stage order.
    pub inputs: Vec<InputDigest>,

    pub output_documents: u64,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(pipeline_hash: Hash256, inputs: Vec<InputDigest>, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            pipeline_hash,
            engine_version: crate::VERSION.to_string(),
            inputs,
            output_documents: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, output_documents: u64) -> Self {
        self.finished_ms = finished_ms;
        self.output_documents = output_documents;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}
