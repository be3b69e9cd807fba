//! Location expressions: a small XPath 1.0 subset.
//!
//! Grammar:
//!
//! ```text
//! expr      := path ( '|' path )*
//! path      := ( '/' | '//' )? step ( ( '/' | '//' ) step )*
//! step      := '.' | '..' | '@' name | 'text()' | 'node()' | test pred*
//! test      := '*' | name | prefix ':' name | prefix ':' '*'
//! pred      := '[' ( number
//!                  | 'local-name()' '=' literal
//!                  | 'contains(local-name(),' literal ')'
//!                  | 'starts-with(local-name(),' literal ')' ) ']'
//! ```
//!
//! Name tests are namespace-strict: `p:x` matches elements in the namespace
//! bound to `p`, and an unprefixed `x` only matches elements in no namespace.
//! [`Expr::local_names_only`] produces the namespace-agnostic rewrite.

use std::{cmp::Ordering, collections::BTreeSet, fmt};

use crate::{
  document::{Document, NodeId},
  error::PathError,
};

// ─── AST ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
  source:   String,
  branches: Vec<LocationPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LocationPath {
  absolute: bool,
  steps:    Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
  axis:       Axis,
  test:       NodeTest,
  predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
  Child,
  DescendantOrSelf,
  SelfNode,
  Parent,
  Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
  /// `node()`, or the implicit test of `.`, `..` and `//`.
  AnyNode,
  /// `*`
  AnyElement,
  /// `p:*`
  AnyIn(String),
  Name {
    prefix: Option<String>,
    local:  String,
  },
  Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
  Position(usize),
  LocalNameEq(String),
  LocalNameContains(String),
  LocalNameStartsWith(String),
}

/// One selected item. Items order by document position: an element, then
/// its attributes, then its text, then anything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
  Element(NodeId),
  /// Attribute `n` of the element.
  Attribute(NodeId, usize),
  /// The direct text of the element.
  Text(NodeId),
}

impl Item {
  fn position(&self) -> (NodeId, u8, usize) {
    match *self {
      Item::Element(id) => (id, 0, 0),
      Item::Attribute(id, n) => (id, 1, n),
      Item::Text(id) => (id, 2, 0),
    }
  }

  /// String value of the item, trimmed.
  pub fn value<'d>(&self, doc: &'d Document) -> &'d str {
    match *self {
      Item::Element(id) | Item::Text(id) => doc.text(id).trim(),
      Item::Attribute(id, n) => doc
        .attributes(id)
        .get(n)
        .map_or("", |a| a.value.trim()),
    }
  }
}

// Node ids are assigned in document order while parsing.
impl Ord for Item {
  fn cmp(&self, other: &Self) -> Ordering { self.position().cmp(&other.position()) }
}

impl PartialOrd for Item {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

impl Expr {
  pub fn parse(source: &str) -> Result<Self, PathError> {
    Parser::new(source).expr()
  }

  pub fn source(&self) -> &str { &self.source }

  /// Every namespace prefix the expression mentions.
  pub fn prefixes(&self) -> BTreeSet<&str> {
    self
      .steps()
      .filter_map(|s| match &s.test {
        NodeTest::AnyIn(p) => Some(p.as_str()),
        NodeTest::Name {
          prefix: Some(p), ..
        } => Some(p.as_str()),
        _ => None,
      })
      .collect()
  }

  /// Local name of the last element name test, e.g. `EIN` for
  /// `/Return/ReturnHeader/Filer/EIN` or `//irs:EIN/text()`.
  pub fn leaf_name(&self) -> Option<&str> {
    self.branches.first().and_then(|branch| {
      branch.steps.iter().rev().find_map(|s| match &s.test {
        NodeTest::Name { local, .. } => Some(local.as_str()),
        _ => None,
      })
    })
  }

  /// Rewrite every element name test as `*[local-name()='x']`.
  pub fn local_names_only(&self) -> Self {
    self.map_tests(|step| match &step.test {
      NodeTest::Name { local, .. } if step.axis != Axis::Attribute => {
        let mut predicates = vec![Predicate::LocalNameEq(local.clone())];
        predicates.extend(step.predicates.iter().cloned());
        Step {
          axis: step.axis,
          test: NodeTest::AnyElement,
          predicates,
        }
      }
      NodeTest::AnyIn(_) => Step {
        axis:       step.axis,
        test:       NodeTest::AnyElement,
        predicates: step.predicates.clone(),
      },
      _ => step.clone(),
    })
  }

  /// Replace every prefix in the expression with `prefix`.
  pub fn with_prefix(&self, prefix: &str) -> Self {
    self.map_tests(|step| {
      let test = match &step.test {
        NodeTest::AnyIn(_) => NodeTest::AnyIn(prefix.to_owned()),
        NodeTest::Name {
          prefix: Some(_),
          local,
        } => NodeTest::Name {
          prefix: Some(prefix.to_owned()),
          local:  local.clone(),
        },
        other => other.clone(),
      };
      Step {
        axis: step.axis,
        test,
        predicates: step.predicates.clone(),
      }
    })
  }

  fn steps(&self) -> impl Iterator<Item = &Step> {
    self.branches.iter().flat_map(|b| b.steps.iter())
  }

  fn map_tests(&self, f: impl Fn(&Step) -> Step) -> Self {
    let branches: Vec<LocationPath> = self
      .branches
      .iter()
      .map(|b| LocationPath {
        absolute: b.absolute,
        steps:    b.steps.iter().map(&f).collect(),
      })
      .collect();
    let source = branches
      .iter()
      .map(ToString::to_string)
      .collect::<Vec<_>>()
      .join(" | ");
    Self { source, branches }
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source)
  }
}

impl fmt::Display for LocationPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    let mut pending_descendant = false;
    for step in &self.steps {
      if step.axis == Axis::DescendantOrSelf && step.test == NodeTest::AnyNode {
        pending_descendant = true;
        continue;
      }
      if pending_descendant {
        f.write_str("//")?;
      } else if !first || self.absolute {
        f.write_str("/")?;
      }
      pending_descendant = false;
      first = false;
      write!(f, "{step}")?;
    }
    if pending_descendant {
      f.write_str("//")?;
    } else if first && self.absolute {
      f.write_str("/")?;
    }
    Ok(())
  }
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (&self.axis, &self.test) {
      (Axis::SelfNode, _) => f.write_str(".")?,
      (Axis::Parent, _) => f.write_str("..")?,
      (Axis::Attribute, NodeTest::Name { local, .. }) => write!(f, "@{local}")?,
      (Axis::Attribute, _) => f.write_str("@*")?,
      (_, NodeTest::AnyNode) => f.write_str("node()")?,
      (_, NodeTest::AnyElement) => f.write_str("*")?,
      (_, NodeTest::AnyIn(p)) => write!(f, "{p}:*")?,
      (_, NodeTest::Name { prefix: Some(p), local }) => write!(f, "{p}:{local}")?,
      (_, NodeTest::Name { prefix: None, local }) => f.write_str(local)?,
      (_, NodeTest::Text) => f.write_str("text()")?,
    }
    for p in &self.predicates {
      match p {
        Predicate::Position(n) => write!(f, "[{n}]")?,
        Predicate::LocalNameEq(s) => write!(f, "[local-name()='{s}']")?,
        Predicate::LocalNameContains(s) => {
          write!(f, "[contains(local-name(),'{s}')]")?
        }
        Predicate::LocalNameStartsWith(s) => {
          write!(f, "[starts-with(local-name(),'{s}')]")?
        }
      }
    }
    Ok(())
  }
}

struct Parser<'a> {
  source: &'a str,
  chars:  Vec<char>,
  pos:    usize,
}

fn is_name_start(c: char) -> bool { c.is_alphabetic() || c == '_' }

fn is_name_char(c: char) -> bool {
  c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl<'a> Parser<'a> {
  fn new(source: &'a str) -> Self {
    Self {
      source,
      chars: source.chars().collect(),
      pos: 0,
    }
  }

  fn error(&self, message: impl Into<String>) -> PathError {
    PathError::Syntax {
      expr:    self.source.to_owned(),
      offset:  self.pos,
      message: message.into(),
    }
  }

  fn peek(&self) -> Option<char> { self.chars.get(self.pos).copied() }

  fn skip_ws(&mut self) {
    while self.peek().is_some_and(char::is_whitespace) {
      self.pos += 1;
    }
  }

  fn eat(&mut self, token: &str) -> bool {
    let len = token.chars().count();
    let matches = self.chars.len() >= self.pos + len
      && self.chars[self.pos..self.pos + len]
        .iter()
        .copied()
        .eq(token.chars());
    if matches {
      self.pos += len;
    }
    matches
  }

  fn expect(&mut self, token: &str) -> Result<(), PathError> {
    self.skip_ws();
    if self.eat(token) {
      Ok(())
    } else {
      Err(self.error(format!("expected `{token}`")))
    }
  }

  fn expr(mut self) -> Result<Expr, PathError> {
    let mut branches = vec![self.location_path()?];
    loop {
      self.skip_ws();
      if self.peek().is_none() {
        break;
      }
      if !self.eat("|") {
        return Err(self.error("unexpected character"));
      }
      branches.push(self.location_path()?);
    }
    Ok(Expr {
      source: self.source.trim().to_owned(),
      branches,
    })
  }

  fn location_path(&mut self) -> Result<LocationPath, PathError> {
    self.skip_ws();
    let mut steps = Vec::new();
    let absolute = if self.eat("//") {
      steps.push(descendant_or_self());
      true
    } else {
      self.eat("/")
    };

    // A lone `/` selects the document node.
    self.skip_ws();
    if absolute && steps.is_empty() && matches!(self.peek(), None | Some('|')) {
      return Ok(LocationPath { absolute, steps });
    }

    steps.push(self.step()?);
    loop {
      self.skip_ws();
      if self.eat("//") {
        steps.push(descendant_or_self());
      } else if !self.eat("/") {
        break;
      }
      steps.push(self.step()?);
    }
    Ok(LocationPath { absolute, steps })
  }

  fn name(&mut self) -> Result<String, PathError> {
    let start = self.pos;
    if !self.peek().is_some_and(is_name_start) {
      return Err(self.error("expected a name"));
    }
    while self.peek().is_some_and(is_name_char) {
      self.pos += 1;
    }
    Ok(self.chars[start..self.pos].iter().collect())
  }

  fn step(&mut self) -> Result<Step, PathError> {
    self.skip_ws();
    if self.eat("..") {
      return Ok(bare(Axis::Parent));
    }
    if self.eat(".") {
      return Ok(bare(Axis::SelfNode));
    }
    if self.eat("@") {
      let test = if self.eat("*") {
        NodeTest::AnyElement
      } else {
        let mut local = self.name()?;
        // Attribute prefixes are ignored; attributes match by local name.
        if self.eat(":") {
          local = self.name()?;
        }
        NodeTest::Name {
          prefix: None,
          local,
        }
      };
      return Ok(Step {
        axis: Axis::Attribute,
        test,
        predicates: Vec::new(),
      });
    }

    let test = if self.eat("*") {
      NodeTest::AnyElement
    } else {
      let first = self.name()?;
      if self.eat("::") {
        return Err(self.error("axis specifiers are not supported"));
      }
      if self.eat("()") {
        match first.as_str() {
          "text" => NodeTest::Text,
          "node" => NodeTest::AnyNode,
          other => return Err(self.error(format!("unsupported function {other}()"))),
        }
      } else if self.eat(":") {
        if self.eat("*") {
          NodeTest::AnyIn(first)
        } else {
          NodeTest::Name {
            prefix: Some(first),
            local:  self.name()?,
          }
        }
      } else {
        NodeTest::Name {
          prefix: None,
          local:  first,
        }
      }
    };

    let mut predicates = Vec::new();
    loop {
      self.skip_ws();
      if !self.eat("[") {
        break;
      }
      predicates.push(self.predicate()?);
      self.expect("]")?;
    }

    Ok(Step {
      axis: Axis::Child,
      test,
      predicates,
    })
  }

  fn predicate(&mut self) -> Result<Predicate, PathError> {
    self.skip_ws();
    if self.peek().is_some_and(|c| c.is_ascii_digit()) {
      let start = self.pos;
      while self.peek().is_some_and(|c| c.is_ascii_digit()) {
        self.pos += 1;
      }
      let digits: String = self.chars[start..self.pos].iter().collect();
      return match digits.parse::<usize>() {
        Ok(n) if n > 0 => Ok(Predicate::Position(n)),
        _ => Err(self.error("position must be a positive integer")),
      };
    }
    if self.eat("local-name()") {
      self.expect("=")?;
      return Ok(Predicate::LocalNameEq(self.literal()?));
    }
    let contains = if self.eat("contains") {
      true
    } else if self.eat("starts-with") {
      false
    } else {
      return Err(self.error("unsupported predicate"));
    };
    self.expect("(")?;
    self.expect("local-name()")?;
    self.expect(",")?;
    let needle = self.literal()?;
    self.expect(")")?;
    Ok(if contains {
      Predicate::LocalNameContains(needle)
    } else {
      Predicate::LocalNameStartsWith(needle)
    })
  }

  fn literal(&mut self) -> Result<String, PathError> {
    self.skip_ws();
    let quote = match self.peek() {
      Some(q @ ('\'' | '"')) => q,
      _ => return Err(self.error("expected a quoted literal")),
    };
    self.pos += 1;
    let start = self.pos;
    while self.peek().is_some_and(|c| c != quote) {
      self.pos += 1;
    }
    if self.peek().is_none() {
      return Err(self.error("unterminated literal"));
    }
    let value = self.chars[start..self.pos].iter().collect();
    self.pos += 1;
    Ok(value)
  }
}

fn descendant_or_self() -> Step { bare(Axis::DescendantOrSelf) }

fn bare(axis: Axis) -> Step {
  Step {
    axis,
    test: NodeTest::AnyNode,
    predicates: Vec::new(),
  }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

impl Expr {
  /// Evaluate against `doc`. Relative paths start at `context`; absolute
  /// paths at the document node. Results are in document order.
  pub fn select(
    &self,
    doc: &Document,
    context: NodeId,
  ) -> Result<Vec<Item>, PathError> {
    let mut out = BTreeSet::new();
    for branch in &self.branches {
      let start = if branch.absolute {
        NodeId::DOCUMENT
      } else {
        context
      };
      out.extend(branch.select(doc, start)?);
    }
    Ok(out.into_iter().collect())
  }
}

impl LocationPath {
  fn select(&self, doc: &Document, start: NodeId) -> Result<Vec<Item>, PathError> {
    let mut current = vec![Item::Element(start)];
    for step in &self.steps {
      let mut next = BTreeSet::new();
      for item in &current {
        // Only element items have further steps below them.
        let Item::Element(node) = *item else {
          continue;
        };
        next.extend(step.apply(doc, node)?);
      }
      current = next.into_iter().collect();
    }
    Ok(current)
  }
}

impl Step {
  fn apply(&self, doc: &Document, node: NodeId) -> Result<Vec<Item>, PathError> {
    let candidates: Vec<Item> = match self.axis {
      Axis::SelfNode => vec![Item::Element(node)],
      Axis::Parent => doc.parent(node).map(Item::Element).into_iter().collect(),
      Axis::DescendantOrSelf => std::iter::once(node)
        .chain(doc.descendants(node))
        .map(Item::Element)
        .collect(),
      Axis::Attribute => {
        if node == NodeId::DOCUMENT {
          Vec::new()
        } else {
          doc
            .attributes(node)
            .iter()
            .enumerate()
            .filter(|(_, a)| match &self.test {
              NodeTest::Name { local, .. } => &a.local == local,
              _ => true,
            })
            .map(|(n, _)| Item::Attribute(node, n))
            .collect()
        }
      }
      Axis::Child => match &self.test {
        NodeTest::Text => {
          if doc.text(node).is_empty() {
            Vec::new()
          } else {
            vec![Item::Text(node)]
          }
        }
        test => {
          let mut matched = Vec::new();
          for &child in doc.children(node) {
            if test.matches(doc, child)? {
              matched.push(Item::Element(child));
            }
          }
          matched
        }
      },
    };

    let mut items = candidates;
    for predicate in &self.predicates {
      items = predicate.filter(doc, items);
    }
    Ok(items)
  }
}

impl NodeTest {
  fn matches(&self, doc: &Document, id: NodeId) -> Result<bool, PathError> {
    Ok(match self {
      NodeTest::AnyNode | NodeTest::AnyElement => true,
      NodeTest::Text => false,
      NodeTest::AnyIn(prefix) => doc.namespace(id) == Some(bound(doc, prefix)?),
      NodeTest::Name {
        prefix: Some(prefix),
        local,
      } => {
        doc.local_name(id) == local
          && doc.namespace(id) == Some(bound(doc, prefix)?)
      }
      NodeTest::Name {
        prefix: None,
        local,
      } => doc.local_name(id) == local && doc.namespace(id).is_none(),
    })
  }
}

fn bound<'d>(doc: &'d Document, prefix: &str) -> Result<&'d str, PathError> {
  doc
    .namespaces()
    .resolve(prefix)
    .ok_or_else(|| PathError::UnboundPrefix(prefix.to_owned()))
}

impl Predicate {
  fn filter(&self, doc: &Document, items: Vec<Item>) -> Vec<Item> {
    let local = |item: &Item| match *item {
      Item::Element(id) => doc.local_name(id),
      Item::Attribute(id, n) => doc
        .attributes(id)
        .get(n)
        .map_or("", |a| a.local.as_str()),
      Item::Text(_) => "",
    };
    match self {
      Predicate::Position(n) => items.into_iter().nth(n - 1).into_iter().collect(),
      Predicate::LocalNameEq(s) => {
        items.into_iter().filter(|i| local(i) == s).collect()
      }
      Predicate::LocalNameContains(s) => items
        .into_iter()
        .filter(|i| local(i).contains(s.as_str()))
        .collect(),
      Predicate::LocalNameStartsWith(s) => items
        .into_iter()
        .filter(|i| local(i).starts_with(s.as_str()))
        .collect(),
    }
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  const DOC: &str = r#"<Return xmlns="urn:efile" xmlns:x="urn:extra" returnVersion="2020v4.1">
  <ReturnHeader><Filer><EIN>123456789</EIN></Filer></ReturnHeader>
  <ReturnData>
    <Officers><Nm>Ann</Nm></Officers>
    <Officers><Nm>Bob</Nm></Officers>
    <x:Note>extra</x:Note>
  </ReturnData>
</Return>"#;

  fn doc() -> Document { DOC.parse().unwrap() }

  fn values(doc: &Document, expr: &str) -> Vec<String> {
    Expr::parse(expr)
      .unwrap()
      .select(doc, NodeId::DOCUMENT)
      .unwrap()
      .iter()
      .map(|i| i.value(doc).to_owned())
      .collect()
  }

  #[test]
  fn prefixed_steps_resolve_through_default_alias() {
    let d = doc();
    assert_eq!(
      values(&d, "/irs:Return/irs:ReturnHeader/irs:Filer/irs:EIN"),
      ["123456789"]
    );
  }

  #[test]
  fn unprefixed_names_do_not_match_namespaced_elements() {
    let d = doc();
    assert!(values(&d, "/Return/ReturnHeader").is_empty());
  }

  #[test]
  fn local_name_rewrite_ignores_namespaces() {
    let d = doc();
    let expr = Expr::parse("/Return/ReturnHeader/Filer/EIN").unwrap();
    let rewritten = expr.local_names_only();
    assert_eq!(
      rewritten.source(),
      "/*[local-name()='Return']/*[local-name()='ReturnHeader']\
       /*[local-name()='Filer']/*[local-name()='EIN']"
    );
    let found = rewritten.select(&d, NodeId::DOCUMENT).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value(&d), "123456789");
  }

  #[test]
  fn descendant_and_position() {
    let d = doc();
    assert_eq!(values(&d, "//default:Officers/default:Nm"), ["Ann", "Bob"]);
    assert_eq!(values(&d, "//irs:Officers[2]/irs:Nm"), ["Bob"]);
    assert_eq!(values(&d, "//*[local-name()='Nm'][1]"), ["Ann", "Bob"]);
  }

  #[test]
  fn contains_and_starts_with() {
    let d = doc();
    assert_eq!(values(&d, "//*[contains(local-name(),'ote')]"), ["extra"]);
    assert_eq!(
      values(&d, "//*[starts-with(local-name(), 'EI')]"),
      ["123456789"]
    );
  }

  #[test]
  fn attributes_text_and_unions() {
    let d = doc();
    assert_eq!(values(&d, "/*/@returnVersion"), ["2020v4.1"]);
    assert_eq!(values(&d, "//x:Note/text()"), ["extra"]);
    assert_eq!(values(&d, "//irs:EIN | //x:Note"), ["123456789", "extra"]);
  }

  #[test]
  fn relative_paths_use_context() {
    let d = doc();
    let body = d.find_by_local_name("ReturnData").unwrap();
    let expr = Expr::parse("./*[local-name()='Officers']/..").unwrap();
    let found = expr.select(&d, body).unwrap();
    assert_eq!(found, [Item::Element(body)]);
  }

  #[test]
  fn unbound_prefix_is_an_evaluation_error() {
    let d = doc();
    let expr = Expr::parse("//efile:EIN").unwrap();
    assert_eq!(
      expr.select(&d, NodeId::DOCUMENT),
      Err(PathError::UnboundPrefix("efile".into()))
    );
  }

  #[test]
  fn prefix_substitution_and_leaf_name() {
    let expr = Expr::parse("/efile:Return/efile:ReturnData/efile:TotalAmt").unwrap();
    assert_eq!(
      expr.with_prefix("irs").source(),
      "/irs:Return/irs:ReturnData/irs:TotalAmt"
    );
    assert_eq!(expr.leaf_name(), Some("TotalAmt"));
    assert_eq!(expr.prefixes().into_iter().collect::<Vec<_>>(), ["efile"]);
  }

  #[test]
  fn syntax_errors_are_reported() {
    for bad in ["", "/a[", "/a[local-name()=x]", "child::a", "/a/@", "/a]"] {
      assert!(Expr::parse(bad).is_err(), "{bad:?} should not parse");
    }
  }
}
