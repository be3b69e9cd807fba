//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. A typed value occupies exactly
//! one of four columns (`value_text`, `value_numeric`, `value_boolean`,
//! `value_date`); the other three are NULL.

use chrono::{DateTime, Utc};
use tally_core::{
  filing::Organization,
  store::{FieldDefinition, FilingRecord, StoredGroup, StoredGroupValue, StoredValue},
  value::{DataType, TypedValue},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── TypedValue ──────────────────────────────────────────────────────────────

/// The four value columns of a value row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueColumns {
  pub text:    Option<String>,
  pub numeric: Option<f64>,
  pub boolean: Option<bool>,
  pub date:    Option<String>,
}

pub fn encode_value(value: &TypedValue) -> ValueColumns {
  let mut cols = ValueColumns::default();
  match value {
    TypedValue::Text(s) => cols.text = Some(s.clone()),
    TypedValue::Numeric(n) => cols.numeric = Some(*n),
    TypedValue::Boolean(b) => cols.boolean = Some(*b),
    TypedValue::Date(s) => cols.date = Some(s.clone()),
  }
  cols
}

pub fn decode_value(cols: ValueColumns) -> Result<TypedValue> {
  match cols {
    ValueColumns {
      text: Some(s),
      numeric: None,
      boolean: None,
      date: None,
    } => Ok(TypedValue::Text(s)),
    ValueColumns {
      text: None,
      numeric: Some(n),
      boolean: None,
      date: None,
    } => Ok(TypedValue::Numeric(n)),
    ValueColumns {
      text: None,
      numeric: None,
      boolean: Some(b),
      date: None,
    } => Ok(TypedValue::Boolean(b)),
    ValueColumns {
      text: None,
      numeric: None,
      boolean: None,
      date: Some(s),
    } => Ok(TypedValue::Date(s)),
    other => Err(Error::InvalidRow(format!(
      "expected exactly one value column, got {other:?}"
    ))),
  }
}

fn read_value(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<ValueColumns> {
  Ok(ValueColumns {
    text:    row.get(first)?,
    numeric: row.get(first + 1)?,
    boolean: row.get(first + 2)?,
    date:    row.get(first + 3)?,
  })
}

// ─── Raw rows ────────────────────────────────────────────────────────────────
//
// Plain column values read inside a `call` closure and converted to domain
// types afterwards, so decode failures surface as this crate's errors.

pub struct RawOrganization {
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

impl RawOrganization {
  pub const COLUMNS: &'static str =
    "ein, name, address_line1, address_line2, city, state, zip, country, website";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ein:           row.get(0)?,
      name:          row.get(1)?,
      address_line1: row.get(2)?,
      address_line2: row.get(3)?,
      city:          row.get(4)?,
      state:         row.get(5)?,
      zip:           row.get(6)?,
      country:       row.get(7)?,
      website:       row.get(8)?,
    })
  }

  pub fn into_organization(self) -> Organization {
    Organization {
      ein:           self.ein,
      name:          self.name,
      address_line1: self.address_line1,
      address_line2: self.address_line2,
      city:          self.city,
      state:         self.state,
      zip:           self.zip,
      country:       self.country,
      website:       self.website,
    }
  }
}

pub struct RawFiling {
  pub filing_id:       String,
  pub ein:             String,
  pub tax_period:      String,
  pub form_type:       String,
  pub form_version:    Option<String>,
  pub tax_year:        Option<i32>,
  pub submission_date: Option<String>,
  pub object_id:       Option<String>,
  pub xml_hash:        Option<String>,
  pub processed_at:    String,
}

impl RawFiling {
  pub const COLUMNS: &'static str = "filing_id, ein, tax_period, form_type, form_version, tax_year, \
                             submission_date, object_id, xml_hash, processed_timestamp";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      filing_id:       row.get(0)?,
      ein:             row.get(1)?,
      tax_period:      row.get(2)?,
      form_type:       row.get(3)?,
      form_version:    row.get(4)?,
      tax_year:        row.get(5)?,
      submission_date: row.get(6)?,
      object_id:       row.get(7)?,
      xml_hash:        row.get(8)?,
      processed_at:    row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<FilingRecord> {
    Ok(FilingRecord {
      processed_at:    decode_dt(&self.processed_at)?,
      filing_id:       self.filing_id,
      ein:             self.ein,
      tax_period:      self.tax_period,
      form_type:       self.form_type,
      form_version:    self.form_version,
      tax_year:        self.tax_year,
      submission_date: self.submission_date,
      object_id:       self.object_id,
      xml_hash:        self.xml_hash,
    })
  }
}

pub struct RawFieldDefinition {
  pub field_id:     i64,
  pub name:         String,
  pub data_type:    String,
  pub location:     Option<String>,
  pub table_name:   Option<String>,
  pub description:  Option<String>,
  pub is_repeating: bool,
}

impl RawFieldDefinition {
  pub const COLUMNS: &'static str =
    "field_id, name, data_type, xpath, table_name, description, is_repeating";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      field_id:     row.get(0)?,
      name:         row.get(1)?,
      data_type:    row.get(2)?,
      location:     row.get(3)?,
      table_name:   row.get(4)?,
      description:  row.get(5)?,
      is_repeating: row.get(6)?,
    })
  }

  pub fn into_definition(self) -> Result<FieldDefinition> {
    Ok(FieldDefinition {
      data_type:    self.data_type.parse::<DataType>()?,
      field_id:     self.field_id,
      name:         self.name,
      location:     self.location,
      table_name:   self.table_name,
      description:  self.description,
      is_repeating: self.is_repeating,
    })
  }
}

pub struct RawValue {
  pub field_id:   i64,
  pub field_name: String,
  pub value:      ValueColumns,
}

impl RawValue {
  /// Expects `field_id, name` followed by the four value columns.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      field_id:   row.get(0)?,
      field_name: row.get(1)?,
      value:      read_value(row, 2)?,
    })
  }

  pub fn into_value(self) -> Result<StoredValue> {
    Ok(StoredValue {
      field_id:   self.field_id,
      field_name: self.field_name,
      value:      decode_value(self.value)?,
    })
  }
}

pub struct RawGroup {
  pub group_id:        i64,
  pub filing_id:       String,
  pub parent_group_id: Option<i64>,
  pub name:            String,
  pub table_name:      String,
  pub path:            String,
  pub nesting_level:   u32,
  pub row_count:       u32,
}

impl RawGroup {
  pub const COLUMNS: &'static str = "group_id, filing_id, parent_group_id, name, table_name, xpath, \
                             nesting_level, row_count";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:        row.get(0)?,
      filing_id:       row.get(1)?,
      parent_group_id: row.get(2)?,
      name:            row.get(3)?,
      table_name:      row.get(4)?,
      path:            row.get(5)?,
      nesting_level:   row.get(6)?,
      row_count:       row.get(7)?,
    })
  }

  pub fn into_group(self) -> StoredGroup {
    StoredGroup {
      group_id:        self.group_id,
      filing_id:       self.filing_id,
      parent_group_id: self.parent_group_id,
      name:            self.name,
      table_name:      self.table_name,
      path:            self.path,
      nesting_level:   self.nesting_level,
      row_count:       self.row_count,
    }
  }
}

pub struct RawGroupValue {
  pub group_id:       i64,
  pub field_id:       i64,
  pub field_name:     String,
  pub instance_index: u32,
  pub value:          ValueColumns,
}

impl RawGroupValue {
  /// Expects `group_id, field_id, name, instance_index` followed by the four
  /// value columns.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:       row.get(0)?,
      field_id:       row.get(1)?,
      field_name:     row.get(2)?,
      instance_index: row.get(3)?,
      value:          read_value(row, 4)?,
    })
  }

  pub fn into_group_value(self) -> Result<StoredGroupValue> {
    Ok(StoredGroupValue {
      group_id:       self.group_id,
      field_id:       self.field_id,
      field_name:     self.field_name,
      instance_index: self.instance_index,
      value:          decode_value(self.value)?,
    })
  }
}
