//! Parent/child relations between confirmed groups, from structural paths
//! alone.

/// `true` when `ancestor` is a strict prefix of `path` that ends on a step
/// boundary: `/a/b` is an ancestor of `/a/b/c` but not of `/a/bc` or
/// `/a/b[1]0`.
pub fn is_ancestor_path(ancestor: &str, path: &str) -> bool {
  path.len() > ancestor.len()
    && path.starts_with(ancestor)
    && path[ancestor.len()..].starts_with('/')
}

/// For each path, the index of its parent: the other path that is its
/// longest strict, segment-aligned prefix. `None` marks a top-level group.
pub fn build_hierarchy<S: AsRef<str>>(paths: &[S]) -> Vec<Option<usize>> {
  paths
    .iter()
    .enumerate()
    .map(|(i, path)| {
      let path = path.as_ref();
      paths
        .iter()
        .enumerate()
        .filter(|(j, candidate)| *j != i && is_ancestor_path(candidate.as_ref(), path))
        .max_by_key(|(_, candidate)| candidate.as_ref().len())
        .map(|(j, _)| j)
    })
    .collect()
}
