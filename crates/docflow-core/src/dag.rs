//! Pipeline descriptions.
//!
//! A front end hands the engine a `LogicalPipeline`: a source collection plus
//! an ordered list of stage descriptors whose parameters are still raw
//! `Value`s. The planner lowers it to a physical pipeline (choosing the
//! source access path) and the exec crate compiles each descriptor into an
//! operator.

use serde::{Deserialize, Serialize};

use crate::path::FieldPath;
use crate::value::{Document, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
    /// `{$meta: "textScore"}`: by relevance, highest first.
    TextScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: FieldPath,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Group key expression (scalar or document template).
    pub id: Value,
    /// Output field → accumulator spec (`{$sum: 1}`, `{$avg: "$x"}`, ...).
    pub accumulators: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupSpec {
    pub from: String,
    pub local_field: FieldPath,
    pub foreign_field: FieldPath,
    pub as_field: FieldPath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnwindSpec {
    pub path: FieldPath,
    #[serde(default)]
    pub include_array_index: Option<FieldPath>,
    #[serde(default)]
    pub preserve_null_and_empty_arrays: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearchSpec {
    pub search: String,
}

/// One stage descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSpec {
    Match(Document),
    Project(Document),
    AddFields(Document),
    Group(GroupSpec),
    Sort(Vec<SortKey>),
    Limit(u64),
    Skip(u64),
    Lookup(LookupSpec),
    Unwind(UnwindSpec),
    Count(String),
}

impl StageSpec {
    /// Stage name as written in a pipeline (stable; used in errors and traces).
    pub fn name(&self) -> &'static str {
        match self {
            StageSpec::Match(_) => "$match",
            StageSpec::Project(_) => "$project",
            StageSpec::AddFields(_) => "$addFields",
            StageSpec::Group(_) => "$group",
            StageSpec::Sort(_) => "$sort",
            StageSpec::Limit(_) => "$limit",
            StageSpec::Skip(_) => "$skip",
            StageSpec::Lookup(_) => "$lookup",
            StageSpec::Unwind(_) => "$unwind",
            StageSpec::Count(_) => "$count",
        }
    }

    /// Blocking stages must drain their input before emitting anything.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            StageSpec::Group(_) | StageSpec::Sort(_) | StageSpec::Count(_)
        )
    }

    /// `$match` filters carrying a top-level `$text` clause.
    pub fn text_search(&self) -> Option<&Value> {
        match self {
            StageSpec::Match(filter) => filter.get("$text"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalPipeline {
    pub collection: String,
    pub stages: Vec<StageSpec>,
}

impl LogicalPipeline {
    pub fn new(collection: impl Into<String>, stages: Vec<StageSpec>) -> Self {
        Self {
            collection: collection.into(),
            stages,
        }
    }

    /// Every collection the pipeline reads: the source, then `$lookup` targets.
    pub fn collections_read(&self) -> Vec<&str> {
        let mut out = vec![self.collection.as_str()];
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

/// Where a physical pipeline's records come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// Every document of the collection, in collection order.
    Scan { collection: String },
    /// Documents matched through the collection's text index, in collection
    /// order with `text_score` set; `residual` holds the non-`$text` part of
    /// the originating `$match`.
    TextSearch {
        collection: String,
        search: TextSearchSpec,
        residual: Option<Document>,
    },
}

impl Source {
    pub fn collection(&self) -> &str {
        match self {
            Source::Scan { collection } | Source::TextSearch { collection, .. } => collection,
        }
    }
}
