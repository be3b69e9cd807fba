//! Error types for the tally-xml codec.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to read {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed XML: {0}")]
  Malformed(String),

  #[error("document has no root element")]
  NoRootElement,

  #[error("document has more than one root element")]
  MultipleRoots,

  #[error("element <{0}> is never closed")]
  UnclosedElement(String),

  #[error(transparent)]
  Path(#[from] PathError),
}

/// Failure to parse or evaluate a location expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
  #[error("{message} at offset {offset} in {expr:?}")]
  Syntax {
    expr:    String,
    offset:  usize,
    message: String,
  },

  #[error("namespace prefix {0:?} is not declared in the document")]
  UnboundPrefix(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
