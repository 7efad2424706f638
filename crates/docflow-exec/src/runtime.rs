//! Runtime: lower a pipeline, compile its operators, run it over a snapshot,
//! and emit a `RunManifest`.
//!
//! Execution is a single pull-based chain: the source stream feeds stage 0,
//! whose output feeds stage 1, and so on. Blocking stages drain their input
//! while the chain is being wired; streaming stages do their work as the
//! final drain pulls records through. The first error anywhere aborts the run
//! and is reported with the index of the stage that raised it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

use docflow_core::config::EngineConfig;
use docflow_core::dag::{LogicalPipeline, Source};
use docflow_core::hash::{hash_serde, Hash256};
use docflow_core::manifest::{InputDigest, RunManifest};
use docflow_core::path::FieldPath;
use docflow_core::value::Document;
use docflow_operators::{
    compile_stage, ExecContext, OpError, OpPlan, Operator, RecordStream, SourceOp,
};
use docflow_planner::{lower_to_physical, PhysicalPipeline, PlanError};
use docflow_text::Tokenizer;

use crate::catalog::{Catalog, Snapshot};
use crate::metrics;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("plan: {0}")]
    Plan(#[from] PlanError),

    #[error("stage {index} ({stage}): {source}")]
    Stage {
        index: usize,
        stage: &'static str,
        #[source]
        source: OpError,
    },

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("hashing error: {0}")]
    Hash(String),
}

impl ExecError {
    /// Index (in the submitted pipeline) of the stage that failed.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            ExecError::Stage { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// The operator-level error, if the failure came from a stage.
    pub fn op_error(&self) -> Option<&OpError> {
        match self {
            ExecError::Stage { source, .. } => Some(source),
            _ => None,
        }
    }

    fn from_op(err: OpError, fallback_index: usize, fallback_stage: &'static str) -> Self {
        match err {
            OpError::AtStage {
                index,
                stage,
                source,
            } => ExecError::Stage {
                index,
                stage,
                source: *source,
            },
            other => ExecError::Stage {
                index: fallback_index,
                stage: fallback_stage,
                source: other,
            },
        }
    }
}

/// Result documents plus the manifest describing the run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub documents: Vec<Document>,
    pub manifest: RunManifest,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageExplain {
    pub index: usize,
    #[serde(flatten)]
    pub plan: OpPlan,
}

/// What `explain` reports: the chosen source and the compiled stages.
#[derive(Debug, Clone, Serialize)]
pub struct Explain {
    pub pipeline_hash: Hash256,
    pub source: OpPlan,
    pub stages: Vec<StageExplain>,
    /// Indexes of the stages that drain their whole input.
    pub barriers: Vec<usize>,
}

/// A lowered pipeline with every operator compiled.
struct Prepared {
    physical: PhysicalPipeline,
    source: SourceOp,
    ops: Vec<Box<dyn Operator>>,
    /// Logical index of `ops[0]` (1 when the first `$match` became the source).
    offset: usize,
}

/// Engine owns the configuration and the collection catalog.
pub struct Engine {
    cfg: EngineConfig,
    catalog: Catalog,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            catalog: Catalog::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn tokenizer(&self) -> Tokenizer {
        Tokenizer::from_config(&self.cfg)
    }

    /// Insert or replace a collection. Its text index, if one was declared,
    /// is rebuilt before the new version becomes visible.
    pub fn insert_collection(&self, name: &str, docs: Vec<Document>) {
        #[cfg(feature = "tracing")]
        tracing::debug!(collection = name, documents = docs.len(), "insert collection");
        self.catalog.insert(name, docs, &self.tokenizer());
    }

    /// Build a text index over `fields` (dotted paths) of `collection`.
    pub fn create_text_index(&self, collection: &str, fields: &[&str]) -> Result<(), ExecError> {
        if fields.is_empty() {
            return Err(ExecError::Invalid("a text index needs at least one field".into()));
        }
        let fields = fields
            .iter()
            .map(|f| FieldPath::parse(f).map_err(|e| ExecError::Invalid(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        if !self.catalog.create_text_index(collection, fields, &self.tokenizer()) {
            return Err(ExecError::UnknownCollection(collection.to_string()));
        }
        metrics::emit_span("text_index", &[("collection", collection.to_string())]);
        Ok(())
    }

    fn prepare(&self, logical: &LogicalPipeline) -> Result<Prepared, ExecError> {
        let physical = lower_to_physical(logical)?;
        let offset = match physical.source {
            Source::TextSearch { .. } => 1,
            Source::Scan { .. } => 0,
        };
        let source = SourceOp::compile(&physical.source)
            .map_err(|e| ExecError::from_op(e, 0, "$match"))?;
        let ops = physical
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                compile_stage(stage).map_err(|e| ExecError::from_op(e, i + offset, stage.name()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Prepared {
            physical,
            source,
            ops,
            offset,
        })
    }

    /// Lower and compile without touching any collection.
    pub fn validate(&self, logical: &LogicalPipeline) -> Result<(), ExecError> {
        self.prepare(logical).map(|_| ())
    }

    pub fn explain(&self, logical: &LogicalPipeline) -> Result<Explain, ExecError> {
        let prepared = self.prepare(logical)?;
        let stages = prepared
            .ops
            .iter()
            .enumerate()
            .map(|(i, op)| StageExplain {
                index: i + prepared.offset,
                plan: op.plan(),
            })
            .collect();
        let barriers = prepared
            .physical
            .blocking_barriers()
            .into_iter()
            .map(|i| i + prepared.offset)
            .collect();
        Ok(Explain {
            pipeline_hash: pipeline_hash(&prepared.physical)?,
            source: prepared.source.plan(),
            stages,
            barriers,
        })
    }

    /// Run with the engine's configuration.
    pub fn run(&self, logical: &LogicalPipeline) -> Result<RunOutput, ExecError> {
        self.run_with(logical, &self.cfg)
    }

    /// Run with per-run settings (phrase policy, buffering cap). Tokenization
    /// is fixed when an index is built and is not affected by `cfg`.
    pub fn run_with(
        &self,
        logical: &LogicalPipeline,
        cfg: &EngineConfig,
    ) -> Result<RunOutput, ExecError> {
        cfg.validate().map_err(|e| ExecError::Invalid(e.to_string()))?;
        let prepared = self.prepare(logical)?;
        let snapshot = self.catalog.snapshot();

        let source_collection = prepared.source.collection().to_string();
        if snapshot.document_count(&source_collection).is_none() {
            return Err(ExecError::UnknownCollection(source_collection));
        }

        let started_ms = now_millis();
        let manifest = RunManifest::new(
            pipeline_hash(&prepared.physical)?,
            input_digests(&prepared.physical, &snapshot),
            started_ms,
        );

        let ctx = ExecContext::new(&snapshot, cfg);
        let documents = execute(&prepared, ctx)?;

        let manifest = manifest.finish(now_millis(), documents.len() as u64);
        metrics::record_run(
            &source_collection,
            manifest.output_documents,
            manifest.elapsed_ms(),
        );
        Ok(RunOutput {
            documents,
            manifest,
        })
    }
}

fn execute(prepared: &Prepared, ctx: ExecContext<'_>) -> Result<Vec<Document>, ExecError> {
    let mut stream: RecordStream<'_> = prepared
        .source
        .open(ctx)
        .map_err(|e| ExecError::from_op(e, 0, "$match"))?;
    if prepared.offset == 1 {
        // Residual-filter errors belong to the `$match` the source came from.
        stream = Box::new(stream.map(|r| r.map_err(|e| e.at_stage(0, "$match"))));
    }

    for (i, op) in prepared.ops.iter().enumerate() {
        let index = i + prepared.offset;
        let name = op.name();
        metrics::record_stage(index, name, op.is_blocking());
        let output = op
            .execute(stream, ctx)
            .map_err(|e| ExecError::from_op(e.at_stage(index, name), index, name))?;
        stream = Box::new(output.map(move |r| r.map_err(|e| e.at_stage(index, name))));
    }

    let last = prepared.offset + prepared.ops.len();
    stream
        .map(|r| {
            r.map(|record| record.into_document())
                .map_err(|e| ExecError::from_op(e, last, "output"))
        })
        .collect()
}

fn pipeline_hash(physical: &PhysicalPipeline) -> Result<Hash256, ExecError> {
    hash_serde(physical).map_err(|e| ExecError::Hash(e.to_string()))
}

fn input_digests(physical: &PhysicalPipeline, snapshot: &Snapshot) -> Vec<InputDigest> {
    physical
        .collections_read()
        .into_iter()
        .filter_map(|name| {
            snapshot.document_count(name).map(|n| InputDigest {
                collection: name.to_string(),
                documents: n as u64,
            })
        })
        .collect()
}

// --- helpers ---

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
