//! Mapping-table entries: which variable lives where, as what type, and in
//! which target table.

use serde::{Deserialize, Serialize};

use crate::{
  filing::FieldKey,
  value::{Cardinality, DataType},
};

/// Target table for scalar values when a mapping row leaves it blank.
pub const DEFAULT_TABLE: &str = "filing_values";

/// One row of the concordance. Immutable once the registry is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcordanceEntry {
  /// Sequential, 1-based, in source order among accepted rows.
  pub field_id:    u32,
  pub variable:    String,
  pub location:    String,
  pub description: Option<String>,
  pub data_type:   DataType,
  pub table:       String,
  pub cardinality: Cardinality,
}

impl ConcordanceEntry {
  /// `ONE` entries are extracted once per filing; `MANY` entries only
  /// describe group row fields.
  pub fn is_scalar(&self) -> bool { self.cardinality == Cardinality::One }

  /// The storage-facing description of this variable.
  pub fn field_key(&self) -> FieldKey {
    FieldKey {
      name:        self.variable.clone(),
      data_type:   self.data_type,
      location:    self.location.clone(),
      table:       self.table.clone(),
      repeating:   self.cardinality == Cardinality::Many,
      description: self.description.clone(),
    }
  }
}
