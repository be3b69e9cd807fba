//! Concordance registry, repeating-group detection and the per-document
//! transform for Tally.
//!
//! Pure synchronous; a [`Transformer`] is built once per run and shared
//! across worker threads.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tally_transform::{Concordance, DetectorConfig, Transformer};
//!
//! let concordance = Arc::new(Concordance::load("concordance.csv").unwrap());
//! let transformer = Transformer::new(concordance, DetectorConfig::default()).unwrap();
//! let filing = transformer.transform_file("201900001_public.xml").unwrap();
//! println!("{} groups", filing.groups.len());
//! ```

pub mod concordance;
pub mod detect;
pub mod error;
mod metadata;
pub mod tables;
mod transform;

#[cfg(test)]
pub(crate) mod fixtures;

pub use concordance::Concordance;
pub use detect::{Detector, DetectorConfig, GroupRecord};
pub use error::{ConcordanceError, Error, Result};
pub use metadata::{extract_metadata, extract_organization};
pub use transform::Transformer;
