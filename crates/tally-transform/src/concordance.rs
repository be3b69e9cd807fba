//! The concordance registry: a CSV mapping from variable names to document
//! locations, types and target tables.
//!
//! Pipeline:
//!   raw text
//!     └─ read_records()   → Vec<Record>      (quoted fields, CRLF, BOM)
//!          └─ Columns::from_header()         (canonical or legacy names)
//!               └─ entry_from_record()  → ConcordanceEntry
//!                    └─ Concordance::from_entries()  (ids, dedupe, grouping)

use std::{
  collections::{BTreeMap, HashMap},
  io::ErrorKind,
  path::Path,
};

use tally_core::{
  concordance::{ConcordanceEntry, DEFAULT_TABLE},
  value::{Cardinality, DataType},
};
use tally_xml::Expr;
use tracing::{debug, info, warn};

use crate::error::ConcordanceError;

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct TableFields {
  one:  Vec<usize>,
  many: Vec<usize>,
}

/// Immutable, shareable mapping table for one run.
#[derive(Debug, Clone, Default)]
pub struct Concordance {
  entries:  Vec<ConcordanceEntry>,
  by_name:  HashMap<String, usize>,
  by_table: BTreeMap<String, TableFields>,
}

impl Concordance {
  /// Load a CSV mapping file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConcordanceError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| {
      if source.kind() == ErrorKind::NotFound {
        ConcordanceError::NotFound(path.to_path_buf())
      } else {
        ConcordanceError::Io {
          path: path.to_path_buf(),
          source,
        }
      }
    })?;
    let concordance = Self::from_csv(&text)?;
    info!(
      path = %path.display(),
      entries = concordance.len(),
      tables = concordance.by_table.len(),
      "concordance loaded"
    );
    Ok(concordance)
  }

  /// Parse CSV text with a header row.
  pub fn from_csv(text: &str) -> Result<Self, ConcordanceError> {
    let mut records = read_records(text)?.into_iter();
    let header = records.next().ok_or(ConcordanceError::Empty)?;
    let columns = Columns::from_header(&header.fields)?;

    let mut entries = Vec::new();
    for record in records {
      match columns.entry(&record.fields) {
        Some(entry) => entries.push(entry),
        None => debug!(line = record.line, "concordance row without variable or location skipped"),
      }
    }
    Ok(Self::from_entries(entries))
  }

  /// Build a registry from entries. Field ids are reassigned sequentially
  /// from 1; a repeated variable name keeps its first entry.
  pub fn from_entries(entries: impl IntoIterator<Item = ConcordanceEntry>) -> Self {
    let mut registry = Self::default();
    for mut entry in entries {
      if registry.by_name.contains_key(&entry.variable) {
        warn!(variable = %entry.variable, "duplicate concordance variable ignored");
        continue;
      }
      let index = registry.entries.len();
      let Ok(field_id) = u32::try_from(index + 1) else {
        warn!(variable = %entry.variable, "field ids exhausted, remaining variables ignored");
        break;
      };
      entry.field_id = field_id;

      let table = registry.by_table.entry(entry.table.clone()).or_default();
      match entry.cardinality {
        Cardinality::One => table.one.push(index),
        Cardinality::Many => table.many.push(index),
      }
      registry.by_name.insert(entry.variable.clone(), index);
      registry.entries.push(entry);
    }
    registry
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn entries(&self) -> &[ConcordanceEntry] { &self.entries }

  pub fn get(&self, variable: &str) -> Option<&ConcordanceEntry> {
    self.by_name.get(variable).map(|i| &self.entries[*i])
  }

  /// Entries extracted once per filing.
  pub fn scalar_entries(&self) -> impl Iterator<Item = &ConcordanceEntry> {
    self.entries.iter().filter(|e| e.is_scalar())
  }

  /// `MANY` entries declared for `table`, in source order.
  pub fn many_fields(&self, table: &str) -> Vec<&ConcordanceEntry> {
    self
      .by_table
      .get(table)
      .map(|t| t.many.iter().map(|i| &self.entries[*i]).collect())
      .unwrap_or_default()
  }

  /// Table names with at least one entry, sorted.
  pub fn tables(&self) -> impl Iterator<Item = &str> {
    self.by_table.keys().map(String::as_str)
  }
}

/// Local name of the element an entry's location points at. Used to find
/// the field inside a group row.
pub fn leaf_name(entry: &ConcordanceEntry) -> String {
  Expr::parse(&entry.location)
    .ok()
    .and_then(|expr| expr.leaf_name().map(str::to_owned))
    .unwrap_or_else(|| entry.variable.clone())
}

// ─── Columns ─────────────────────────────────────────────────────────────────

const VARIABLE: &[&str] = &["variable_name", "VAR_NAME"];
const LOCATION: &[&str] = &["xpath", "XPATH"];
const DESCRIPTION: &[&str] = &["description", "DESCRIPTION"];
const DATA_TYPE: &[&str] = &["data_type_simple", "DATA_TYPE_SIMPLE", "data_type"];
const TABLE: &[&str] = &["rdb_table", "DATABASE_TABLE"];
const CARDINALITY: &[&str] = &["rdb_relationship", "RELATIONSHIP"];

struct Columns {
  variable:    usize,
  location:    usize,
  description: Option<usize>,
  data_type:   Option<usize>,
  table:       Option<usize>,
  cardinality: Option<usize>,
}

impl Columns {
  fn from_header(header: &[String]) -> Result<Self, ConcordanceError> {
    let find = |aliases: &[&str]| {
      header.iter().position(|h| {
        let h = h.trim_start_matches('\u{feff}').trim();
        aliases.contains(&h)
      })
    };
    Ok(Self {
      variable:    find(VARIABLE).ok_or(ConcordanceError::MissingColumn(VARIABLE[0]))?,
      location:    find(LOCATION).ok_or(ConcordanceError::MissingColumn(LOCATION[0]))?,
      description: find(DESCRIPTION),
      data_type:   find(DATA_TYPE),
      table:       find(TABLE),
      cardinality: find(CARDINALITY),
    })
  }

  fn entry(&self, fields: &[String]) -> Option<ConcordanceEntry> {
    let cell = |i: usize| fields.get(i).map(|s| s.trim()).unwrap_or("");
    let optional = |i: Option<usize>| i.map(cell).filter(|s| !s.is_empty());

    let variable = cell(self.variable);
    let location = cell(self.location);
    if variable.is_empty() || location.is_empty() {
      return None;
    }

    Some(ConcordanceEntry {
      field_id:    0,
      variable:    variable.to_owned(),
      location:    location.to_owned(),
      description: optional(self.description).map(str::to_owned),
      data_type:   optional(self.data_type)
        .map(DataType::from_declared)
        .unwrap_or_default(),
      table:       optional(self.table).unwrap_or(DEFAULT_TABLE).to_owned(),
      cardinality: optional(self.cardinality)
        .map(Cardinality::from_declared)
        .unwrap_or_default(),
    })
  }
}

// ─── CSV reader ──────────────────────────────────────────────────────────────

struct Record {
  /// 1-based line on which the record starts.
  line:   usize,
  fields: Vec<String>,
}

/// Split CSV text into records. Handles quoted fields, doubled quotes,
/// CRLF and newlines inside quotes. Blank lines are dropped.
fn read_records(text: &str) -> Result<Vec<Record>, ConcordanceError> {
  let text = text.strip_prefix('\u{feff}').unwrap_or(text);

  let mut records = Vec::new();
  let mut fields = Vec::new();
  let mut field = String::new();
  let mut in_quotes = false;
  let mut line = 1;
  let mut record_line = 1;
  let mut chars = text.chars().peekable();

  let mut finish = |fields: &mut Vec<String>, record_line: usize| {
    let is_blank = fields.len() == 1 && fields[0].trim().is_empty();
    let taken = std::mem::take(fields);
    if !is_blank {
      records.push(Record {
        line:   record_line,
        fields: taken,
      });
    }
  };

  while let Some(c) = chars.next() {
    if in_quotes {
      match c {
        '"' if chars.peek() == Some(&'"') => {
          chars.next();
          field.push('"');
        }
        '"' => in_quotes = false,
        '\n' => {
          line += 1;
          field.push('\n');
        }
        _ => field.push(c),
      }
      continue;
    }
    match c {
      '"' if field.trim().is_empty() => {
        field.clear();
        in_quotes = true;
      }
      ',' => fields.push(std::mem::take(&mut field)),
      '\r' if chars.peek() == Some(&'\n') => {}
      '\n' | '\r' => {
        fields.push(std::mem::take(&mut field));
        finish(&mut fields, record_line);
        line += 1;
        record_line = line;
      }
      _ => field.push(c),
    }
  }

  if in_quotes {
    return Err(ConcordanceError::Malformed {
      line:    record_line,
      message: "unterminated quoted field".into(),
    });
  }
  if !field.is_empty() || !fields.is_empty() {
    fields.push(field);
    finish(&mut fields, record_line);
  }
  Ok(records)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
