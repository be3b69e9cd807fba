//! In-memory element tree built from a quick-xml event stream.
//!
//! Nodes live in an arena and are addressed by [`NodeId`] handles, so callers
//! can hold on to positions without borrowing the tree. Node 0 is a virtual
//! document node whose only child is the root element; arena order is
//! document order.

use std::{
  collections::BTreeMap,
  path::Path,
  str::FromStr,
};

use quick_xml::{
  Reader,
  events::{BytesStart, Event},
};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Prefixes under which the default namespace is also reachable, so that
/// prefixed location expressions resolve against documents that only
/// declare `xmlns="…"`.
pub const DEFAULT_NAMESPACE_ALIASES: &[&str] = &["default", "irs"];

// ─── Handles ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
  /// The virtual node above the root element.
  pub const DOCUMENT: NodeId = NodeId(0);

  pub fn index(self) -> usize { self.0 }
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Attribute {
  pub prefix:    Option<String>,
  pub local:     String,
  pub namespace: Option<String>,
  pub value:     String,
}

#[derive(Debug, Clone, Default)]
struct Node {
  parent:     Option<NodeId>,
  children:   Vec<NodeId>,
  prefix:     Option<String>,
  local:      String,
  namespace:  Option<String>,
  attributes: Vec<Attribute>,
  text:       String,
}

// ─── Namespace map ───────────────────────────────────────────────────────────

/// Every namespace declared anywhere in a document. The first binding seen
/// for a prefix wins.
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
  default:  Option<String>,
  prefixes: BTreeMap<String, String>,
}

impl Namespaces {
  pub fn default_namespace(&self) -> Option<&str> { self.default.as_deref() }

  pub fn resolve(&self, prefix: &str) -> Option<&str> {
    self.prefixes.get(prefix).map(String::as_str)
  }

  /// Declared prefixes (including default-namespace aliases), sorted.
  pub fn prefixes(&self) -> impl Iterator<Item = &str> {
    self.prefixes.keys().map(String::as_str)
  }

  fn record(&mut self, prefix: Option<&str>, uri: &str) {
    match prefix {
      None => {
        if self.default.is_none() && !uri.is_empty() {
          self.default = Some(uri.to_owned());
        }
      }
      Some(p) => {
        self
          .prefixes
          .entry(p.to_owned())
          .or_insert_with(|| uri.to_owned());
      }
    }
  }

  fn alias_default(&mut self) {
    let Some(uri) = self.default.clone() else {
      return;
    };
    for alias in DEFAULT_NAMESPACE_ALIASES {
      self
        .prefixes
        .entry((*alias).to_owned())
        .or_insert_with(|| uri.clone());
    }
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Document {
  nodes:       Vec<Node>,
  namespaces:  Namespaces,
  source_hash: String,
}

impl Document {
  /// Read and parse the file at `path`.
  pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_bytes(&bytes)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    let mut builder = Builder::default();
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
      match reader.read_event_into(&mut buf) {
        Ok(Event::Start(ref e)) => builder.open(e)?,
        Ok(Event::Empty(ref e)) => {
          builder.open(e)?;
          builder.close(e.name().as_ref())?;
        }
        Ok(Event::End(ref e)) => builder.close(e.name().as_ref())?,
        Ok(Event::Text(ref t)) => {
          let text = t
            .unescape()
            .map_err(|err| Error::Malformed(err.to_string()))?;
          builder.text(&text);
        }
        Ok(Event::CData(c)) => {
          let raw = c.into_inner();
          builder.text(&String::from_utf8_lossy(&raw));
        }
        Ok(Event::Eof) => break,
        Err(err) => {
          return Err(Error::Malformed(format!(
            "at byte {}: {err}",
            reader.error_position()
          )));
        }
        _ => {}
      }
      buf.clear();
    }

    let mut doc = builder.finish()?;
    doc.source_hash = hex::encode(Sha256::digest(bytes));
    Ok(doc)
  }

  // ── Navigation ────────────────────────────────────────────────────────

  /// The document element.
  pub fn root(&self) -> NodeId {
    // `finish` guarantees exactly one child under the document node.
    self.nodes[0].children[0]
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> { self.nodes[id.0].parent }

  /// Element children in document order.
  pub fn children(&self, id: NodeId) -> &[NodeId] { &self.nodes[id.0].children }

  /// Element children whose local name is `local`.
  pub fn children_named<'a>(
    &'a self,
    id: NodeId,
    local: &'a str,
  ) -> impl Iterator<Item = NodeId> + 'a {
    self
      .children(id)
      .iter()
      .copied()
      .filter(move |c| self.local_name(*c) == local)
  }

  /// All elements strictly below `id`, in document order.
  pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
    while let Some(next) = stack.pop() {
      out.push(next);
      stack.extend(self.children(next).iter().rev().copied());
    }
    out
  }

  /// `true` when `ancestor` lies strictly above `id`.
  pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
    let mut cursor = self.parent(id);
    while let Some(p) = cursor {
      if p == ancestor {
        return true;
      }
      cursor = self.parent(p);
    }
    false
  }

  /// First element in document order with the given local name.
  pub fn find_by_local_name(&self, local: &str) -> Option<NodeId> {
    (1..self.nodes.len())
      .map(NodeId)
      .find(|id| self.local_name(*id) == local)
  }

  // ── Node data ─────────────────────────────────────────────────────────

  /// Local name; empty for the document node.
  pub fn local_name(&self, id: NodeId) -> &str { &self.nodes[id.0].local }

  pub fn prefix(&self, id: NodeId) -> Option<&str> {
    self.nodes[id.0].prefix.as_deref()
  }

  pub fn namespace(&self, id: NodeId) -> Option<&str> {
    self.nodes[id.0].namespace.as_deref()
  }

  /// Text directly inside the element (not its descendants).
  pub fn text(&self, id: NodeId) -> &str { &self.nodes[id.0].text }

  pub fn attributes(&self, id: NodeId) -> &[Attribute] {
    &self.nodes[id.0].attributes
  }

  /// Attribute value by local name, whatever its namespace.
  pub fn attribute(&self, id: NodeId, local: &str) -> Option<&str> {
    self
      .attributes(id)
      .iter()
      .find(|a| a.local == local)
      .map(|a| a.value.as_str())
  }

  pub fn root_attribute(&self, local: &str) -> Option<&str> {
    self.attribute(self.root(), local)
  }

  /// Structural path built from local names, e.g.
  /// `/Return/ReturnData/IRS990/Officers`. A 1-based `[n]` is added to any
  /// step that has same-named siblings.
  pub fn path_of(&self, id: NodeId) -> String {
    let mut segments = Vec::new();
    let mut cursor = Some(id);
    while let Some(node) = cursor {
      if node == NodeId::DOCUMENT {
        break;
      }
      let local = self.local_name(node);
      let segment = match self.parent(node) {
        Some(parent) => {
          let mut same = self.children_named(parent, local);
          let position = same.position(|s| s == node).map_or(1, |p| p + 1);
          let total = position + same.count();
          if total > 1 {
            format!("{local}[{position}]")
          } else {
            local.to_owned()
          }
        }
        None => local.to_owned(),
      };
      segments.push(segment);
      cursor = self.parent(node);
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
  }

  pub fn namespaces(&self) -> &Namespaces { &self.namespaces }

  /// Lowercase hex SHA-256 of the bytes the document was parsed from.
  pub fn source_hash(&self) -> &str { &self.source_hash }

  pub fn element_count(&self) -> usize { self.nodes.len() - 1 }
}

impl FromStr for Document {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::from_bytes(s.as_bytes()) }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

type Binding = (Option<String>, Option<String>);

struct Builder {
  nodes:      Vec<Node>,
  open:       Vec<NodeId>,
  /// Namespace declarations made on each open element.
  scopes:     Vec<Vec<Binding>>,
  namespaces: Namespaces,
}

impl Default for Builder {
  fn default() -> Self {
    Self {
      nodes:      vec![Node::default()],
      open:       Vec::new(),
      scopes:     Vec::new(),
      namespaces: Namespaces::default(),
    }
  }
}

fn split_qname(raw: &[u8]) -> (Option<String>, String) {
  let name = String::from_utf8_lossy(raw);
  match name.split_once(':') {
    Some((prefix, local)) => (Some(prefix.to_owned()), local.to_owned()),
    None => (None, name.to_string()),
  }
}

impl Builder {
  fn resolve(&self, prefix: Option<&str>) -> Option<String> {
    self
      .scopes
      .iter()
      .rev()
      .flat_map(|scope| scope.iter())
      .find(|(p, _)| p.as_deref() == prefix)
      .and_then(|(_, uri)| uri.clone())
  }

  fn open(&mut self, e: &BytesStart<'_>) -> Result<()> {
    let parent = self.open.last().copied().unwrap_or(NodeId::DOCUMENT);
    if parent == NodeId::DOCUMENT && !self.nodes[0].children.is_empty() {
      return Err(Error::MultipleRoots);
    }

    let (prefix, local) = split_qname(e.name().as_ref());

    let mut bindings = Vec::new();
    let mut raw_attrs = Vec::new();
    for attr in e.attributes() {
      let attr = attr.map_err(|err| Error::Malformed(err.to_string()))?;
      let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
      let value = attr
        .unescape_value()
        .map_err(|err| Error::Malformed(err.to_string()))?
        .into_owned();
      if key == "xmlns" {
        self.namespaces.record(None, &value);
        bindings.push((None, (!value.is_empty()).then_some(value)));
      } else if let Some(declared) = key.strip_prefix("xmlns:") {
        self.namespaces.record(Some(declared), &value);
        bindings.push((Some(declared.to_owned()), Some(value)));
      } else {
        raw_attrs.push((key, value));
      }
    }
    self.scopes.push(bindings);

    let namespace = self.resolve(prefix.as_deref());
    let attributes = raw_attrs
      .into_iter()
      .map(|(key, value)| {
        let (prefix, local) = split_qname(key.as_bytes());
        let namespace = prefix.as_deref().and_then(|p| self.resolve(Some(p)));
        Attribute {
          prefix,
          local,
          namespace,
          value,
        }
      })
      .collect();

    let id = NodeId(self.nodes.len());
    self.nodes.push(Node {
      parent: Some(parent),
      children: Vec::new(),
      prefix,
      local,
      namespace,
      attributes,
      text: String::new(),
    });
    self.nodes[parent.0].children.push(id);
    self.open.push(id);
    Ok(())
  }

  /// Close the innermost open element. The reader already rejects
  /// mismatched end tags; the check here keeps the tree sound without it.
  fn close(&mut self, raw_name: &[u8]) -> Result<()> {
    let found = String::from_utf8_lossy(raw_name);
    let Some(current) = self.open.pop() else {
      return Err(Error::Malformed(format!(
        "closing tag </{found}> has no matching start tag"
      )));
    };
    let node = &self.nodes[current.0];
    let expected = match &node.prefix {
      Some(prefix) => format!("{prefix}:{}", node.local),
      None => node.local.clone(),
    };
    if expected != found {
      return Err(Error::Malformed(format!(
        "closing tag </{found}> does not match <{expected}>"
      )));
    }
    self.scopes.pop();
    Ok(())
  }

  fn text(&mut self, text: &str) {
    let text = text.trim();
    if text.is_empty() {
      return;
    }
    // Text outside the root element carries no data.
    let Some(current) = self.open.last().copied() else {
      return;
    };
    let slot = &mut self.nodes[current.0].text;
    if !slot.is_empty() {
      slot.push(' ');
    }
    slot.push_str(text);
  }

  fn finish(mut self) -> Result<Document> {
    if let Some(unclosed) = self.open.last() {
      return Err(Error::UnclosedElement(self.nodes[unclosed.0].local.clone()));
    }
    if self.nodes[0].children.is_empty() {
      return Err(Error::NoRootElement);
    }
    self.namespaces.alias_default();
    Ok(Document {
      nodes:       self.nodes,
      namespaces:  self.namespaces,
      source_hash: String::new(),
    })
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
