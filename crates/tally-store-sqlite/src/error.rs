//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  /// No connection could be opened or checked out.
  #[error("connection pool error: {0}")]
  Pool(#[from] r2d2::Error),

  /// The blocking task running a database call panicked or was cancelled.
  #[error("database task failed: {0}")]
  Task(#[from] tokio::task::JoinError),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row breaks an invariant the schema is supposed to enforce.
  #[error("invalid stored row: {0}")]
  InvalidRow(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
