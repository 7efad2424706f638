#![forbid(unsafe_code)]
//! docflow-exec: the engine callers talk to.
//!
//! - `catalog`: named collections and their text indexes; runs read a snapshot.
//! - `runtime`: `Engine` (lower, compile, run, explain) and `ExecError`.
//! - `metrics`: tracing hooks, compiled out without the `tracing` feature.

pub mod catalog;
pub mod metrics;
pub mod runtime;

pub use catalog::{Catalog, CatalogEntry, Snapshot};
pub use runtime::{Engine, ExecError, Explain, RunOutput, StageExplain};
