//! XML document loading and namespace-tolerant field location for Tally.
//!
//! Pure synchronous; no database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use tally_xml::{Document, locate};
//!
//! let doc = Document::parse("filing.xml").unwrap();
//! let ein = locate(&doc, "/irs:Return/irs:ReturnHeader/irs:Filer/irs:EIN");
//! println!("ein={ein:?}");
//! ```

pub mod document;
pub mod error;
mod locate;
pub mod path;

pub use document::{Document, NodeId};
pub use error::{Error, PathError, Result};
pub use locate::{locate, locate_from, variants};
pub use path::{Expr, Item};

/// Read and parse the document at `path`.
pub fn parse(path: impl AsRef<std::path::Path>) -> Result<Document> {
  Document::parse(path)
}
