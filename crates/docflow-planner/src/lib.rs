#![forbid(unsafe_code)]
//! docflow-planner: pipeline files → `LogicalPipeline` → `PhysicalPipeline`.
//!
//! - `dsl`: JSON / YAML pipeline files (`{collection, pipeline | find, config}`)
//!   and the stage-document syntax (`{"$group": {...}}`).
//! - `find`: lowering of the collection `find()` form to an ordinary pipeline.
//! - `lower`: source selection (scan vs. text index) and placement checks.
//!
//! Stage parameters stay as `Value`s here; expressions are compiled by the
//! operators crate, so this crate has no dependency on it.

pub mod dsl;
pub mod error;
pub mod find;
pub mod lower;
pub mod physical;

pub use dsl::json::parse_json_pipeline;
pub use dsl::stages::{parse_pipeline, parse_stage};
pub use dsl::yaml::parse_yaml_pipeline;
pub use dsl::{ParsedPipeline, PipelineConfig};
pub use error::{PlanError, Result};
pub use find::FindQuery;
pub use lower::lower_to_physical;
pub use physical::PhysicalPipeline;
