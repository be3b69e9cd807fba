//! Finding input documents.

use std::{
  fs, io,
  path::{Path, PathBuf},
};

use tracing::debug;

/// Every `*.xml` file below `dir` (recursively, extension matched
/// case-insensitively), sorted by path.
pub fn discover_documents(dir: &Path) -> io::Result<Vec<PathBuf>> {
  let mut found = Vec::new();
  let mut pending = vec![dir.to_path_buf()];

  while let Some(current) = pending.pop() {
    for entry in fs::read_dir(&current)? {
      let entry = entry?;
      let path = entry.path();
      let file_type = entry.file_type()?;
      if file_type.is_dir() {
        pending.push(path);
      } else if is_xml(&path) {
        found.push(path);
      }
    }
  }

  found.sort();
  debug!(dir = %dir.display(), documents = found.len(), "documents discovered");
  Ok(found)
}

fn is_xml(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}
