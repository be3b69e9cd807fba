//! Heuristic discovery of repeating groups.
//!
//! Nothing in a filing declares which substructures repeat, so groups are
//! found from names and shapes:
//!
//! 1. **Candidates**: an element whose name carries a group token (`Grp`,
//!    `Group`) and that has at least two same-named children; or the parent
//!    of an element whose name carries a domain keyword, when that parent
//!    has at least two same-named children.
//! 2. **Validation**: a candidate is kept only if at least two of its
//!    children share a row shape (the set of their children's names).
//! 3. **Hierarchy**: among the groups confirmed in one scope, those with a
//!    confirmed ancestor are left to the nested search below that ancestor.
//! 4. **Nesting**: the same search runs inside each group's subtree until
//!    `max_depth` levels exist.
//!
//! Detection is best effort: zero groups is a normal result.

mod hierarchy;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;
use tally_xml::{Document, NodeId};
use tracing::debug;

pub use hierarchy::{build_hierarchy, is_ancestor_path};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  /// Local name of the container that holds a filing's data; detection is
  /// limited to its subtree when present.
  pub body_element:    String,
  pub group_tokens:    Vec<String>,
  pub domain_keywords: Vec<String>,
  /// Number of levels reported, counting the top level.
  pub max_depth:       u32,
  pub max_sample_rows: usize,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    let strings = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
    Self {
      body_element:    "ReturnData".to_owned(),
      group_tokens:    strings(&["Grp", "Group"]),
      domain_keywords: strings(&[
        "Compensation",
        "Officer",
        "Director",
        "Highest",
        "Grant",
        "Expense",
        "Program",
        "Table",
        "List",
        "Schedule",
      ]),
      max_depth:       3,
      max_sample_rows: 3,
    }
  }
}

// ─── Detection result ────────────────────────────────────────────────────────

/// A representative field of a group: a name seen among row children and
/// the first non-empty value seen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSample {
  pub name:   String,
  pub sample: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
  Field(FieldSample),
  Group(GroupRecord),
}

/// A confirmed repeating group and, recursively, the groups nested in it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
  /// Handle of the group element in the document it was detected in.
  pub node:          NodeId,
  pub name:          String,
  pub path:          String,
  pub row_count:     usize,
  /// 0 for top-level groups.
  pub nesting_level: u32,
  pub parent_path:   Option<String>,
  pub members:       Vec<Member>,
  /// Up to `max_sample_rows` rows as (field, value) pairs.
  pub sample_rows:   Vec<Vec<(String, String)>>,
}

impl GroupRecord {
  pub fn fields(&self) -> impl Iterator<Item = &FieldSample> {
    self.members.iter().filter_map(|m| match m {
      Member::Field(f) => Some(f),
      Member::Group(_) => None,
    })
  }

  pub fn nested(&self) -> impl Iterator<Item = &GroupRecord> {
    self.members.iter().filter_map(|m| match m {
      Member::Group(g) => Some(g),
      Member::Field(_) => None,
    })
  }

  /// This group and every nested group, parents first.
  pub fn flatten(&self) -> Vec<&GroupRecord> {
    let mut out = vec![self];
    for child in self.nested() {
      out.extend(child.flatten());
    }
    out
  }
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Detector {
  config: DetectorConfig,
}

impl Detector {
  pub fn new(config: DetectorConfig) -> Self { Self { config } }

  pub fn config(&self) -> &DetectorConfig { &self.config }

  /// Detect every group in `doc`, top-level groups first with nested groups
  /// inside them.
  pub fn detect(&self, doc: &Document) -> Vec<GroupRecord> {
    let scope = self.body_scope(doc);
    let groups = self.detect_in(doc, scope, 0, None);
    debug!(
      scope = %doc.path_of(scope),
      top_level = groups.len(),
      "repeating group detection finished"
    );
    groups
  }

  /// The body container, or the document node when there is none.
  pub fn body_scope(&self, doc: &Document) -> NodeId {
    doc
      .find_by_local_name(&self.config.body_element)
      .unwrap_or(NodeId::DOCUMENT)
  }

  /// Confirmed groups strictly below `scope` that have no confirmed ancestor
  /// below `scope`, each with its nested groups filled in.
  pub fn detect_in(
    &self,
    doc: &Document,
    scope: NodeId,
    level: u32,
    parent_path: Option<&str>,
  ) -> Vec<GroupRecord> {
    let confirmed: Vec<(NodeId, String)> = self
      .candidates(doc, scope)
      .into_iter()
      .filter(|(node, _)| is_homogeneous(doc, *node))
      .collect();

    let paths: Vec<&str> = confirmed.iter().map(|(_, p)| p.as_str()).collect();
    let parents = build_hierarchy(&paths);

    confirmed
      .iter()
      .zip(parents)
      .filter(|(_, parent)| parent.is_none())
      .map(|((node, path), _)| {
        let mut record = self.describe(doc, *node, path.clone(), level, parent_path);
        if level + 1 < self.config.max_depth {
          let nested = self.detect_in(doc, *node, level + 1, Some(path.as_str()));
          record.members.extend(nested.into_iter().map(Member::Group));
        }
        debug!(
          group = %record.name,
          path = %record.path,
          rows = record.row_count,
          level,
          "repeating group confirmed"
        );
        record
      })
      .collect()
  }

  /// Candidate containers strictly below `scope`, deduplicated by path, in
  /// document order.
  pub fn candidates(&self, doc: &Document, scope: NodeId) -> Vec<(NodeId, String)> {
    let mut found: BTreeMap<NodeId, String> = BTreeMap::new();
    let mut seen_paths: BTreeSet<String> = BTreeSet::new();
    let mut add = |node: NodeId| {
      let path = doc.path_of(node);
      if seen_paths.insert(path.clone()) {
        found.insert(node, path);
      }
    };

    for node in doc.descendants(scope) {
      let name = doc.local_name(node);

      if self.has_token(name) && has_repeated_children(doc, node) {
        add(node);
      }

      if self.has_keyword(name)
        && let Some(parent) = doc.parent(node)
        && parent != scope
        && doc.is_ancestor(scope, parent)
        && has_repeated_children(doc, parent)
      {
        add(parent);
      }
    }

    found.into_iter().collect()
  }

  fn has_token(&self, name: &str) -> bool {
    self.config.group_tokens.iter().any(|t| name.contains(t.as_str()))
  }

  fn has_keyword(&self, name: &str) -> bool {
    self
      .config
      .domain_keywords
      .iter()
      .any(|k| name.contains(k.as_str()))
  }

  fn describe(
    &self,
    doc: &Document,
    node: NodeId,
    path: String,
    level: u32,
    parent_path: Option<&str>,
  ) -> GroupRecord {
    let rows = doc.children(node);

    let mut fields: Vec<FieldSample> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for &row in rows {
      for &cell in doc.children(row) {
        let name = doc.local_name(cell);
        let text = doc.text(cell);
        let slot = *index.entry(name.to_owned()).or_insert_with(|| {
          fields.push(FieldSample {
            name:   name.to_owned(),
            sample: None,
          });
          fields.len() - 1
        });
        if fields[slot].sample.is_none() && !text.is_empty() {
          fields[slot].sample = Some(text.to_owned());
        }
      }
    }

    let sample_rows = rows
      .iter()
      .take(self.config.max_sample_rows)
      .map(|&row| {
        doc
          .children(row)
          .iter()
          .map(|&cell| (doc.local_name(cell).to_owned(), doc.text(cell).to_owned()))
          .collect()
      })
      .collect();

    GroupRecord {
      node,
      name: doc.local_name(node).to_owned(),
      path,
      row_count: rows.len(),
      nesting_level: level,
      parent_path: parent_path.map(str::to_owned),
      members: fields.into_iter().map(Member::Field).collect(),
      sample_rows,
    }
  }
}

/// Some child name occurs at least twice.
pub fn has_repeated_children(doc: &Document, node: NodeId) -> bool {
  let mut seen = BTreeSet::new();
  doc
    .children(node)
    .iter()
    .any(|&c| !seen.insert(doc.local_name(c)))
}

/// At least two children share a row shape. A row without children of its
/// own is shaped by its name, so a list of text-only rows qualifies while a
/// run of unrelated scalar elements does not.
pub fn is_homogeneous(doc: &Document, node: NodeId) -> bool {
  let mut shapes: BTreeSet<Vec<&str>> = BTreeSet::new();
  doc.children(node).iter().any(|&row| {
    let cells: BTreeSet<&str> = doc
      .children(row)
      .iter()
      .map(|&c| doc.local_name(c))
      .collect();
    let shape: Vec<&str> = if cells.is_empty() {
      vec!["#leaf", doc.local_name(row)]
    } else {
      cells.into_iter().collect()
    };
    !shapes.insert(shape)
  })
}
