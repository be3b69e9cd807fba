//! Error types for `tally-transform`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The document could not be read or is not well-formed XML.
  #[error(transparent)]
  Parse(#[from] tally_xml::Error),

  /// A field every filing must carry was not found.
  #[error("required metadata field {field} not found")]
  Metadata { field: &'static str },

  #[error(transparent)]
  Concordance(#[from] ConcordanceError),

  #[error("invalid name pattern: {0}")]
  Pattern(#[from] regex::Error),
}

/// Failure to load the mapping table. Fatal for a whole run.
#[derive(Debug, Error)]
pub enum ConcordanceError {
  #[error("concordance file not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("failed to read concordance {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("concordance has no header row")]
  Empty,

  #[error("concordance is missing required column {0:?}")]
  MissingColumn(&'static str),

  #[error("concordance line {line}: {message}")]
  Malformed { line: usize, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
