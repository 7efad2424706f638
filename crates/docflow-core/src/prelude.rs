//! Convenient re-exports for downstream crates.

pub use crate::collection::Collection;
pub use crate::config::EngineConfig;
pub use crate::dag::{
    GroupSpec, LogicalPipeline, LookupSpec, SortDirection, SortKey, Source, StageSpec,
    TextSearchSpec, UnwindSpec,
};
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::DocId;
pub use crate::manifest::{InputDigest, ManifestId, RunManifest};
pub use crate::path::FieldPath;
pub use crate::record::{Meta, Record};
pub use crate::value::{Document, Value, ValueKind};
