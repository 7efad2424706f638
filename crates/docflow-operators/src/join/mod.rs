//! Joins against another collection of the snapshot.

pub mod hash;

pub use hash::LookupOp;
