//! Operator trait + common interfaces.
//!
//! The exec runtime compiles every stage descriptor into an `Operator`, asks
//! each for its `OpPlan`, then chains `execute(...)` calls so that each stage
//! consumes the stream produced by its predecessor.
//!
//! Streams are pull-based iterators of `Result<Record, OpError>`. Streaming
//! stages map or filter lazily; blocking stages drain their input inside
//! `execute` before returning their own stream.

use std::collections::HashMap;
use std::sync::Arc;

use docflow_core::collection::Collection;
use docflow_core::config::EngineConfig;
use docflow_core::record::Record;
use docflow_core::value::Value;
use docflow_text::TextIndex;
use thiserror::Error;

use crate::plan::OpPlan;

/// A lazily evaluated stream of records flowing between stages.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, OpError>> + 'a>;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("{op}: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero in {expr}")]
    DivisionByZero { expr: String },

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("collection '{0}' has no text index")]
    TextIndexMissing(String),

    #[error("invalid stage parameters: {0}")]
    Plan(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("stage {index} ({stage}): {source}")]
    AtStage {
        index: usize,
        stage: &'static str,
        #[source]
        source: Box<OpError>,
    },
}

impl OpError {
    pub(crate) fn type_mismatch(
        op: &'static str,
        expected: &'static str,
        found: Option<&Value>,
    ) -> Self {
        OpError::TypeMismatch {
            op,
            expected,
            found: found.map_or("missing", |v| v.type_name()),
        }
    }

    /// Attach the offending stage. An error already attributed to an earlier
    /// stage keeps its original attribution.
    pub fn at_stage(self, index: usize, stage: &'static str) -> Self {
        match self {
            OpError::AtStage { .. } => self,
            other => OpError::AtStage {
                index,
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage index this error was attributed to, if any.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            OpError::AtStage { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// The underlying error with any stage attribution stripped.
    pub fn root(&self) -> &OpError {
        match self {
            OpError::AtStage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Read access to the named collections of one snapshot.
///
/// Implementations must hand out the same collection for the whole run;
/// operators may call these methods while building their state.
pub trait CollectionProvider: Send + Sync {
    fn collection(&self, name: &str) -> Option<Arc<Collection>>;

    fn text_index(&self, name: &str) -> Option<Arc<TextIndex>>;
}

/// Plain map of collections without text indexes.
impl CollectionProvider for HashMap<String, Arc<Collection>> {
    fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.get(name).cloned()
    }

    fn text_index(&self, _name: &str) -> Option<Arc<TextIndex>> {
        None
    }
}

/// Everything an operator may consult while executing.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub collections: &'a dyn CollectionProvider,
    pub config: &'a EngineConfig,
}

impl<'a> ExecContext<'a> {
    pub fn new(collections: &'a dyn CollectionProvider, config: &'a EngineConfig) -> Self {
        Self {
            collections,
            config,
        }
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>, OpError> {
        self.collections
            .collection(name)
            .ok_or_else(|| OpError::UnknownCollection(name.to_string()))
    }

    pub fn text_index(&self, name: &str) -> Result<Arc<TextIndex>, OpError> {
        self.collections
            .text_index(name)
            .ok_or_else(|| OpError::TextIndexMissing(name.to_string()))
    }
}

/// Trait that all stage operators must implement.
///
/// Invariants:
/// - `execute` never mutates a record shared with another stage; it consumes
///   records and produces new ones.
/// - Output order is deterministic for a given input order and snapshot.
pub trait Operator: Send + Sync {
    /// Stage name as written in a pipeline (stable).
    fn name(&self) -> &'static str;

    /// Blocking operators drain their whole input before emitting.
    fn is_blocking(&self) -> bool {
        false
    }

    /// Static description used by `explain`.
    fn plan(&self) -> OpPlan {
        OpPlan::new(self.name(), self.is_blocking())
    }

    /// Transform `input` into this stage's output stream.
    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError>;
}

/// Pull every record from `input`, failing on the first error, and enforce
/// the configured buffering cap.
pub(crate) fn drain(
    input: RecordStream<'_>,
    stage: &'static str,
    cap: Option<usize>,
) -> Result<Vec<Record>, OpError> {
    let mut out = Vec::new();
    for item in input {
        out.push(item?);
        check_cap(stage, out.len(), cap)?;
    }
    Ok(out)
}

pub(crate) fn check_cap(
    stage: &'static str,
    buffered: usize,
    cap: Option<usize>,
) -> Result<(), OpError> {
    match cap {
        Some(max) if buffered > max => Err(OpError::Exec(format!(
            "{stage} buffered more than {max} documents (max_stage_docs)"
        ))),
        _ => Ok(()),
    }
}
