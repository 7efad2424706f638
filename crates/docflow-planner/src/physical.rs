//! Physical pipeline: a chosen source plus the remaining stages.
//!
//! The exec runtime compiles `source` and each stage into operators; the
//! whole struct is hashed into the run manifest, so it stays serializable
//! and deterministic.

use docflow_core::dag::{Source, StageSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPipeline {
    pub source: Source,
    pub stages: Vec<StageSpec>,
}

impl PhysicalPipeline {
    pub fn new(source: Source, stages: Vec<StageSpec>) -> Self {
        Self { source, stages }
    }

    /// Indexes (into `stages`) of the stages that drain their input.
    pub fn blocking_barriers(&self) -> Vec<usize> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_blocking())
            .map(|(i, _)| i)
            .collect()
    }

    /// Source collection first, then every `$lookup` target, without repeats.
    pub fn collections_read(&self) -> Vec<&str> {
        let mut out = vec![self.source.collection()];
        for stage in &self.stages {
            if let StageSpec::Lookup(spec) = stage {
                if !out.contains(&spec.from.as_str()) {
                    out.push(spec.from.as_str());
                }
            }
        }
        out
    }
}
