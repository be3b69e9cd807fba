//! Batch processing of e-filed returns into a SQLite EAV store.
//!
//! The `tally` binary wires these modules together; they are exposed as a
//! library so the driver can be exercised against an in-memory store.

pub mod batch;
pub mod config;
pub mod discover;
