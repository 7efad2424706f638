#![forbid(unsafe_code)]
//! docflow-operators: the expression language and one operator per stage.
//!
//! - `expr`: compile aggregation expressions once, evaluate per record.
//! - `filter`: the `$match` query language.
//! - stage operators: `$match`, `$project`, `$addFields`, `$group`, `$sort`,
//!   `$limit`, `$skip`, `$lookup`, `$unwind`, `$count`.
//! - `source`: collection scan or text-index lookup feeding the first stage.
//!
//! Operators are synchronous and pull-based. Streaming stages transform one
//! record at a time; `$group`, `$sort` and `$count` drain their input first.

pub mod plan;
pub mod registry;
pub mod traits;

pub mod expr;
pub mod filter;
pub mod source;

pub mod add_fields;
pub mod count;
pub mod group;
pub mod join;
pub mod limit;
pub mod project;
pub mod sort;
pub mod unwind;

#[cfg(test)]
mod testing;

pub use plan::OpPlan;
pub use registry::compile_stage;
pub use source::SourceOp;
pub use traits::{CollectionProvider, ExecContext, OpError, Operator, RecordStream};
