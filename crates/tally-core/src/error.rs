//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown data type: {0:?}")]
  UnknownDataType(String),

  #[error("unknown cardinality: {0:?}")]
  UnknownCardinality(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
