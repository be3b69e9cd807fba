//! The per-document transform result and its parts.
//!
//! A [`TransformedFiling`] is self-contained: it carries every field
//! description the loader needs, so persisting it never consults the
//! concordance.

use serde::{Deserialize, Serialize};

use crate::value::{DataType, TypedValue};

/// Build the natural key of a filing.
///
/// Pure function of its three inputs; reprocessing the same document always
/// yields the same id.
pub fn filing_id(ein: &str, tax_period: &str, form_type: &str) -> String {
  format!("{ein}_{tax_period}_{form_type}")
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingMetadata {
  pub filing_id:       String,
  pub ein:             String,
  pub tax_period:      String,
  pub form_type:       String,
  pub form_version:    Option<String>,
  pub tax_year:        Option<i32>,
  pub submission_date: Option<String>,
  /// Source file name, when the document came from disk.
  pub object_id:       Option<String>,
  /// Lowercase hex SHA-256 of the raw document bytes.
  pub xml_hash:        Option<String>,
}

/// Filer details. Keyed by employer id; absent attributes never overwrite
/// stored ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organization {
  pub ein:           String,
  pub name:          Option<String>,
  pub address_line1: Option<String>,
  pub address_line2: Option<String>,
  pub city:          Option<String>,
  pub state:         Option<String>,
  pub zip:           Option<String>,
  pub country:       Option<String>,
  pub website:       Option<String>,
}

// ─── Fields and values ───────────────────────────────────────────────────────

/// Everything the store needs to find or create a field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldKey {
  pub name:        String,
  pub data_type:   DataType,
  /// Best-effort location expression the value was read from.
  pub location:    String,
  pub table:       String,
  pub repeating:   bool,
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarValue {
  pub field: FieldKey,
  pub value: TypedValue,
}

/// Group identifier assigned during transform. Only meaningful inside one
/// [`TransformedFiling`]; the loader remaps it to a store id.
pub type LocalGroupId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInstance {
  pub local_id:        LocalGroupId,
  pub parent_local_id: Option<LocalGroupId>,
  pub name:            String,
  pub table_name:      String,
  /// Structural path, e.g. `/Return/ReturnData/IRS990/Officers`.
  pub path:            String,
  pub nesting_level:   u32,
  pub row_count:       usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupValue {
  pub local_group_id: LocalGroupId,
  pub field:          FieldKey,
  /// Zero-based position of the row within its group.
  pub instance_index: u32,
  pub value:          TypedValue,
}

/// The complete result of transforming one document.
///
/// `groups` is ordered so that every parent precedes its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedFiling {
  pub metadata:     FilingMetadata,
  pub organization: Organization,
  pub values:       Vec<ScalarValue>,
  pub groups:       Vec<GroupInstance>,
  pub group_values: Vec<GroupValue>,
}

impl TransformedFiling {
  pub fn filing_id(&self) -> &str { &self.metadata.filing_id }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filing_id_joins_natural_key_parts() {
    assert_eq!(
      filing_id("123456789", "2020-12-31", "990"),
      "123456789_2020-12-31_990"
    );
  }

  #[test]
  fn filing_id_is_deterministic() {
    let a = filing_id("987654321", "2019-06-30", "990EZ");
    let b = filing_id("987654321", "2019-06-30", "990EZ");
    assert_eq!(a, b);
  }
}
