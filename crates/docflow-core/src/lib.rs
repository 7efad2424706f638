#![forbid(unsafe_code)]
//! docflow-core: the shared vocabulary of the engine.
//!
//! - `value`: the closed `Value` union and insertion-ordered `Document`.
//! - `path`: dotted field paths with array broadcast, plus non-mutating `set`/`remove`.
//! - `record`/`collection`: what flows between stages and what they read from.
//! - `dag`: the structured pipeline description handed to us by a front end.
//! - `config`/`manifest`/`hash`: engine knobs, run provenance, stable fingerprints.
//!
//! No I/O and no execution logic lives here.

pub mod collection;
pub mod config;
pub mod dag;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod path;
pub mod prelude;
pub mod record;
pub mod value;

/// Engine version recorded in every run manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
