//! Core types and trait definitions for the Tally filing pipeline.
//!
//! This crate has no XML or database dependencies. The codec, transform,
//! store and CLI crates all depend on it.

// Native `async fn` in traits; the returned futures carry explicit `Send`
// bounds where it matters.
#![allow(async_fn_in_trait)]

pub mod concordance;
pub mod error;
pub mod filing;
pub mod store;
pub mod value;

pub use error::{Error, Result};
