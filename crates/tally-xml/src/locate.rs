//! Namespace-tolerant field lookup.
//!
//! The same concordance location has to work against documents whose
//! namespace bindings differ from the ones it was written for. `locate`
//! tries, in order:
//!
//! 1. the expression as written;
//! 2. the expression with every name test reduced to a local-name match;
//! 3. the expression with each other declared prefix swapped in.
//!
//! The first item with non-empty text wins.

use tracing::debug;

use crate::{
  document::{Document, NodeId},
  path::Expr,
};

/// Locate `expr` from the document node. `None` when nothing matches or the
/// expression cannot be parsed; neither is an error for the caller.
pub fn locate(doc: &Document, expr: &str) -> Option<String> {
  locate_from(doc, NodeId::DOCUMENT, expr)
}

/// Like [`locate`], with relative expressions evaluated from `context`.
pub fn locate_from(doc: &Document, context: NodeId, expr: &str) -> Option<String> {
  let parsed = match Expr::parse(expr) {
    Ok(parsed) => parsed,
    Err(err) => {
      debug!(expr, error = %err, "unparseable location expression");
      return None;
    }
  };
  variants(doc, &parsed)
    .find_map(|variant| first_text(doc, context, &variant))
}

/// The lookup variants of `expr`, in the order they are tried.
pub fn variants<'a>(
  doc: &'a Document,
  expr: &'a Expr,
) -> impl Iterator<Item = Expr> + 'a {
  let used = expr.prefixes();
  let substitutions = doc
    .namespaces()
    .prefixes()
    .filter(move |p| !used.contains(p))
    .map(move |p| expr.with_prefix(p));

  // Prefix substitution is meaningless for an expression with no prefixes.
  let substitutions = (!expr.prefixes().is_empty())
    .then_some(substitutions)
    .into_iter()
    .flatten();

  [expr.clone(), expr.local_names_only()]
    .into_iter()
    .chain(substitutions)
}

fn first_text(doc: &Document, context: NodeId, expr: &Expr) -> Option<String> {
  match expr.select(doc, context) {
    Ok(items) => items
      .iter()
      .map(|item| item.value(doc))
      .find(|text| !text.is_empty())
      .map(str::to_owned),
    Err(err) => {
      debug!(expr = %expr, error = %err, "location variant skipped");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn default_ns() -> Document {
    r#"<Return xmlns="http://www.irs.gov/efile" returnVersion="2020v4.1">
  <ReturnHeader>
    <Filer><EIN>123456789</EIN></Filer>
    <TaxPeriodEndDt>2020-12-31</TaxPeriodEndDt>
  </ReturnHeader>
</Return>"#
      .parse()
      .unwrap()
  }

  fn prefixed() -> Document {
    r#"<efile:Return xmlns:efile="urn:some-other-binding" returnVersion="2020v4.1">
  <efile:ReturnHeader>
    <efile:Filer><efile:EIN>123456789</efile:EIN></efile:Filer>
    <efile:TaxPeriodEndDt>2020-12-31</efile:TaxPeriodEndDt>
  </efile:ReturnHeader>
</efile:Return>"#
      .parse()
      .unwrap()
  }

  fn no_ns() -> Document {
    r#"<Return>
  <ReturnHeader>
    <Filer><EIN>123456789</EIN></Filer>
    <TaxPeriodEndDt>2020-12-31</TaxPeriodEndDt>
  </ReturnHeader>
</Return>"#
      .parse()
      .unwrap()
  }

  #[test]
  fn located_values_do_not_depend_on_namespace_binding() {
    let exprs = [
      "/irs:Return/irs:ReturnHeader/irs:Filer/irs:EIN",
      "/Return/ReturnHeader/Filer/EIN",
      "//efile:TaxPeriodEndDt",
      "//*[local-name()='TaxPeriodEndDt']",
      "//default:EIN",
    ];
    let docs = [default_ns(), prefixed(), no_ns()];
    for expr in exprs {
      let found: Vec<_> = docs.iter().map(|d| locate(d, expr)).collect();
      assert!(found[0].is_some(), "{expr} not found");
      assert!(found.iter().all(|f| f == &found[0]), "{expr}: {found:?}");
    }
  }

  #[test]
  fn missing_field_is_none() {
    assert_eq!(locate(&default_ns(), "//irs:WebsiteAddressTxt"), None);
  }

  #[test]
  fn unparseable_expression_is_none() {
    assert_eq!(locate(&default_ns(), "//irs:EIN["), None);
  }

  #[test]
  fn empty_elements_are_skipped() {
    let doc: Document = "<r><a/><a>x</a></r>".parse().unwrap();
    assert_eq!(locate(&doc, "//a").as_deref(), Some("x"));
  }

  #[test]
  fn relative_lookup_from_context() {
    let doc = default_ns();
    let header = doc.find_by_local_name("ReturnHeader").unwrap();
    assert_eq!(
      locate_from(&doc, header, "Filer/EIN").as_deref(),
      Some("123456789")
    );
  }

  #[test]
  fn root_attribute_lookup() {
    assert_eq!(locate(&prefixed(), "/*/@returnVersion").as_deref(), Some("2020v4.1"));
  }

  #[test]
  fn union_yields_the_earliest_item_in_the_document() {
    let doc: Document = "<R><A>first</A><B>second</B></R>".parse().unwrap();
    assert_eq!(locate(&doc, "/R/A/text() | /R/B").as_deref(), Some("first"));
    assert_eq!(locate(&doc, "/R/B | /R/A/text()").as_deref(), Some("first"));

    let doc: Document = r#"<R v="attr"><A>child</A></R>"#.parse().unwrap();
    assert_eq!(locate(&doc, "/R/@v | /R/A").as_deref(), Some("attr"));
    assert_eq!(locate(&doc, "/R/A | /R/@v").as_deref(), Some("attr"));
  }

  #[test]
  fn union_items_are_sorted_by_position() {
    let doc: Document = r#"<R v="1"><A w="2">a<B>b</B></A></R>"#.parse().unwrap();
    let expr = Expr::parse("//B | //A/text() | /R/A/@w | /R/@v | //A").unwrap();
    let values: Vec<_> = expr
      .select(&doc, NodeId::DOCUMENT)
      .unwrap()
      .iter()
      .map(|item| item.value(&doc).to_owned())
      .collect();
    assert_eq!(values, ["1", "a", "2", "a", "b"]);
  }

  #[test]
  fn variants_are_ordered() {
    let doc = prefixed();
    let expr = Expr::parse("//irs:EIN").unwrap();
    let sources: Vec<_> = variants(&doc, &expr)
      .map(|v| v.source().to_owned())
      .collect();
    assert_eq!(
      sources,
      ["//irs:EIN", "//*[local-name()='EIN']", "//efile:EIN"]
    );
  }
}
