//! The per-document transform: metadata, filer details, scalar values and
//! repeating groups, combined into one [`TransformedFiling`].

use std::{path::Path, sync::Arc};

use tally_core::{
  filing::{
    FieldKey, GroupInstance, GroupValue, LocalGroupId, ScalarValue, TransformedFiling,
  },
  value::{DataType, convert, guess_data_type},
};
use tally_xml::{Document, NodeId, locate};
use tracing::{debug, info, warn};

use crate::{
  concordance::{Concordance, leaf_name},
  detect::{Detector, DetectorConfig, GroupRecord},
  error::Result,
  metadata::{extract_metadata, extract_organization},
  tables::{ROW_TEXT, TableMapper, default_fields},
};

/// Turns parsed documents into [`TransformedFiling`]s. Holds only immutable
/// state, so one instance can serve many threads.
pub struct Transformer {
  concordance: Arc<Concordance>,
  detector:    Detector,
  tables:      TableMapper,
}

impl Transformer {
  pub fn new(concordance: Arc<Concordance>, detector: DetectorConfig) -> Result<Self> {
    Ok(Self {
      concordance,
      detector: Detector::new(detector),
      tables: TableMapper::new()?,
    })
  }

  pub fn concordance(&self) -> &Concordance { &self.concordance }

  pub fn detector(&self) -> &Detector { &self.detector }

  /// Parse and transform the document at `path`. The file name becomes the
  /// filing's object id.
  pub fn transform_file(&self, path: impl AsRef<Path>) -> Result<TransformedFiling> {
    let path = path.as_ref();
    let doc = Document::parse(path)?;
    let object_id = path.file_name().and_then(|name| name.to_str());
    self.transform(&doc, object_id)
  }

  pub fn transform(
    &self,
    doc: &Document,
    object_id: Option<&str>,
  ) -> Result<TransformedFiling> {
    let metadata = extract_metadata(doc, object_id)?;
    let organization = extract_organization(doc, &metadata.ein);
    let values = self.scalar_values(doc);

    let mut groups = GroupOutput::default();
    for record in self.detector.detect(doc) {
      self.add_group(doc, &record, None, &mut groups);
    }

    info!(
      filing_id = %metadata.filing_id,
      values = values.len(),
      groups = groups.groups.len(),
      group_values = groups.values.len(),
      "filing transformed"
    );

    Ok(TransformedFiling {
      metadata,
      organization,
      values,
      groups: groups.groups,
      group_values: groups.values,
    })
  }

  fn scalar_values(&self, doc: &Document) -> Vec<ScalarValue> {
    self
      .concordance
      .scalar_entries()
      .filter_map(|entry| {
        let raw = locate(doc, &entry.location)?;
        Some(ScalarValue {
          field: entry.field_key(),
          value: convert(&raw, entry.data_type),
        })
      })
      .collect()
  }

  /// Record `record` and its rows, then its nested groups. Parents are
  /// pushed before children, so ids ascend down the tree.
  fn add_group(
    &self,
    doc: &Document,
    record: &GroupRecord,
    parent: Option<LocalGroupId>,
    out: &mut GroupOutput,
  ) {
    out.next_id += 1;
    let local_id = out.next_id;
    let table = self.tables.table_for(&record.name);

    let fields = self.row_fields(&table, &record.path);
    for (index, &row) in doc.children(record.node).iter().enumerate() {
      let Ok(instance_index) = u32::try_from(index) else {
        warn!(
          group = %record.name,
          rows = record.row_count,
          "row index overflow, remaining rows skipped"
        );
        break;
      };
      for field in &fields {
        let Some(raw) = find_in_row(doc, row, &field.element) else {
          continue;
        };
        let data_type = field.data_type.unwrap_or_else(|| {
          let hint = if field.element == ROW_TEXT {
            doc.local_name(row)
          } else {
            field.element.as_str()
          };
          guess_data_type(hint, &raw)
        });
        out.values.push(GroupValue {
          local_group_id: local_id,
          field:          field.key(data_type),
          instance_index,
          value:          convert(&raw, data_type),
        });
      }
    }

    debug!(
      group = %record.name,
      table = %table,
      local_id,
      parent = ?parent,
      "group mapped"
    );
    out.groups.push(GroupInstance {
      local_id,
      parent_local_id: parent,
      name: record.name.clone(),
      table_name: table,
      path: record.path.clone(),
      nesting_level: record.nesting_level,
      row_count: record.row_count,
    });

    for nested in record.nested() {
      self.add_group(doc, nested, Some(local_id), out);
    }
  }

  /// The fields expected in each row of a group mapped to `table`: the
  /// table's `MANY` concordance entries, or its default templates.
  fn row_fields(&self, table: &str, group_path: &str) -> Vec<RowField> {
    let declared = self.concordance.many_fields(table);
    if !declared.is_empty() {
      return declared
        .into_iter()
        .map(|entry| RowField {
          element:   leaf_name(entry),
          data_type: Some(entry.data_type),
          base:      entry.field_key(),
        })
        .collect();
    }

    default_fields(table)
      .into_iter()
      .map(|template| {
        let location = if template.element == ROW_TEXT {
          format!("{group_path}/*")
        } else {
          format!("{group_path}/*/{}", template.element)
        };
        RowField {
          base:      FieldKey {
            name: template.name,
            data_type: template.data_type.unwrap_or_default(),
            location,
            table: table.to_owned(),
            repeating: true,
            description: None,
          },
          element:   template.element,
          data_type: template.data_type,
        }
      })
      .collect()
  }
}

#[derive(Default)]
struct GroupOutput {
  next_id: LocalGroupId,
  groups:  Vec<GroupInstance>,
  values:  Vec<GroupValue>,
}

struct RowField {
  base:      FieldKey,
  /// Local name searched for inside a row, or [`ROW_TEXT`].
  element:   String,
  /// `None` means the type is guessed per value.
  data_type: Option<DataType>,
}

impl RowField {
  fn key(&self, data_type: DataType) -> FieldKey {
    FieldKey {
      data_type,
      ..self.base.clone()
    }
  }
}

/// Find `element` inside `row`: a direct child, then a namespaced
/// descendant, then any descendant with that local name, then a descendant
/// whose local name contains it. Empty text never matches.
fn find_in_row(doc: &Document, row: NodeId, element: &str) -> Option<String> {
  let text_of = |node: NodeId| {
    let text = doc.text(node);
    (!text.is_empty()).then(|| text.to_owned())
  };

  if element == ROW_TEXT {
    return text_of(row);
  }

  let descendants = doc.descendants(row);
  doc
    .children_named(row, element)
    .find_map(|n| text_of(n))
    .or_else(|| {
      descendants
        .iter()
        .filter(|&&n| doc.namespace(n).is_some() && doc.local_name(n) == element)
        .find_map(|&n| text_of(n))
    })
    .or_else(|| {
      descendants
        .iter()
        .filter(|&&n| doc.local_name(n) == element)
        .find_map(|&n| text_of(n))
    })
    .or_else(|| {
      descendants
        .iter()
        .filter(|&&n| doc.local_name(n).contains(element))
        .find_map(|&n| text_of(n))
    })
}

#[cfg(test)]
mod tests {
  use std::{fs, sync::Arc};

  use tally_core::value::TypedValue;

  use super::*;
  use crate::{error::Error, fixtures};

  fn transformer(csv: &str) -> Transformer {
    let concordance = Concordance::from_csv(csv).unwrap();
    Transformer::new(Arc::new(concordance), DetectorConfig::default()).unwrap()
  }

  fn transform(xml: &str) -> TransformedFiling {
    let doc: Document = xml.parse().unwrap();
    transformer(fixtures::CONCORDANCE)
      .transform(&doc, None)
      .unwrap()
  }

  #[test]
  fn end_to_end_form_990() {
    let filing = transform(fixtures::FORM_990);
    assert_eq!(filing.filing_id(), "123456789_2020-12-31_990");

    assert_eq!(filing.values.len(), 1);
    assert_eq!(filing.values[0].field.name, "F9_01_REV_TOT");
    assert_eq!(filing.values[0].value, TypedValue::Numeric(1_000_000.0));

    assert_eq!(filing.groups.len(), 1);
    let officers = &filing.groups[0];
    assert_eq!(officers.name, "Officers");
    assert_eq!(officers.row_count, 2);
    assert_eq!(officers.local_id, 1);
    assert_eq!(officers.parent_local_id, None);
    assert_eq!(officers.table_name, "compensation_officers");

    for field in ["compensation_officers_PersonNm", "compensation_officers_TitleTxt"] {
      let mut rows: Vec<u32> = filing
        .group_values
        .iter()
        .filter(|v| v.field.name == field)
        .map(|v| v.instance_index)
        .collect();
      rows.sort_unstable();
      assert_eq!(rows, [0, 1], "{field}");
    }
    assert_eq!(filing.group_values.len(), 4);
    assert!(filing.group_values.iter().all(|v| v.local_group_id == 1));

    let second_title = filing
      .group_values
      .iter()
      .find(|v| v.field.name.ends_with("TitleTxt") && v.instance_index == 1)
      .unwrap();
    assert_eq!(second_title.value, TypedValue::Text("Treasurer".into()));
    assert!(second_title.field.repeating);
    assert_eq!(
      second_title.field.location,
      "/Return/ReturnData/IRS990/Officers/*/TitleTxt"
    );
  }

  #[test]
  fn prefix_binding_does_not_change_the_result() {
    let plain = transform(fixtures::FORM_990);
    let prefixed = transform(fixtures::FORM_990_PREFIXED);
    assert_eq!(plain.filing_id(), prefixed.filing_id());
    assert_eq!(plain.organization, prefixed.organization);
    assert_eq!(plain.values, prefixed.values);
    assert_eq!(plain.groups, prefixed.groups);
    assert_eq!(plain.group_values, prefixed.group_values);
  }

  #[test]
  fn nested_groups_reference_their_parent() {
    let filing = transform(fixtures::NESTED_GRANTS);
    assert!(filing.values.is_empty());
    assert_eq!(filing.groups.len(), 2);

    let grants = &filing.groups[0];
    let disbursements = &filing.groups[1];
    assert_eq!((grants.local_id, grants.parent_local_id), (1, None));
    assert_eq!(grants.table_name, "foreign_org_grants");
    assert_eq!(
      (disbursements.local_id, disbursements.parent_local_id),
      (2, Some(1))
    );
    assert_eq!(disbursements.nesting_level, 1);
    assert_eq!(disbursements.table_name, "repeating_disbursement");

    let cash: Vec<_> = filing
      .group_values
      .iter()
      .filter(|v| v.local_group_id == 1)
      .map(|v| (v.instance_index, v.value.numeric()))
      .collect();
    assert_eq!(cash, [(0, Some(1000.0)), (1, Some(250.0))]);

    let paid: Vec<_> = filing
      .group_values
      .iter()
      .filter(|v| v.local_group_id == 2)
      .map(|v| (v.field.name.as_str(), v.instance_index, v.value.numeric()))
      .collect();
    assert_eq!(paid, [
      ("repeating_disbursement_Amount", 0, Some(600.0)),
      ("repeating_disbursement_Amount", 1, Some(400.0)),
    ]);
  }

  #[test]
  fn declared_many_fields_replace_templates() {
    let csv = format!(
      "{}F9_07_COMP_NAME,/Return/ReturnData/IRS990/Officers/Officer/PersonNm,Officer \
       name,text,compensation_officers,MANY\n",
      fixtures::CONCORDANCE
    );
    let doc: Document = fixtures::FORM_990.parse().unwrap();
    let filing = transformer(&csv).transform(&doc, None).unwrap();

    assert_eq!(filing.values.len(), 1, "MANY entries are not scalars");
    let names: Vec<_> = filing
      .group_values
      .iter()
      .map(|v| (v.field.name.as_str(), v.value.text()))
      .collect();
    assert_eq!(names, [
      ("F9_07_COMP_NAME", Some("Jane Doe")),
      ("F9_07_COMP_NAME", Some("John Roe")),
    ]);
  }

  #[test]
  fn text_only_rows_use_the_value_field() {
    let filing = transform(
      r#"<Return><ReturnHeader><TaxPeriodEndDt>2020-06-30</TaxPeriodEndDt>
           <ReturnTypeCd>990</ReturnTypeCd><Filer><EIN>1</EIN></Filer></ReturnHeader>
         <ReturnData><ActivityGrp>
           <ActivityTxt>Food</ActivityTxt><ActivityTxt>Shelter</ActivityTxt>
         </ActivityGrp></ReturnData></Return>"#,
    );
    let values: Vec<_> = filing
      .group_values
      .iter()
      .map(|v| (v.field.name.as_str(), v.value.text()))
      .collect();
    assert_eq!(values, [
      ("repeating_activity_Value", Some("Food")),
      ("repeating_activity_Value", Some("Shelter")),
    ]);
  }

  #[test]
  fn missing_metadata_fails_the_document() {
    let doc: Document = fixtures::MISSING_FORM_TYPE.parse().unwrap();
    let err = transformer(fixtures::CONCORDANCE)
      .transform(&doc, None)
      .unwrap_err();
    assert!(matches!(err, Error::Metadata { .. }));
  }

  #[test]
  fn transform_file_records_object_id_and_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("202100001_public.xml");
    let bad = dir.path().join("broken.xml");
    fs::write(&good, fixtures::FORM_990).unwrap();
    fs::write(&bad, "<Return><ReturnHeader></Return>").unwrap();

    let transformer = transformer(fixtures::CONCORDANCE);
    let filing = transformer.transform_file(&good).unwrap();
    assert_eq!(
      filing.metadata.object_id.as_deref(),
      Some("202100001_public.xml")
    );

    let err = transformer.transform_file(&bad).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
  }

  #[test]
  fn row_lookup_order() {
    let doc: Document = "<Row><Amt>1</Amt><Sub><Amt>2</Amt><TotalAmt>3</TotalAmt></Sub>\
                          <Empty/></Row>"
      .parse()
      .unwrap();
    let row = doc.root();
    assert_eq!(find_in_row(&doc, row, "Amt").as_deref(), Some("1"));
    assert_eq!(find_in_row(&doc, row, "TotalAmt").as_deref(), Some("3"));
    assert_eq!(find_in_row(&doc, row, "otal").as_deref(), Some("3"));
    assert_eq!(find_in_row(&doc, row, "Empty"), None);
    assert_eq!(find_in_row(&doc, row, ROW_TEXT), None);
  }
}
