//! Typed value slots and the raw-text → typed-value conversion rules.
//!
//! Every stored value occupies exactly one of four mutually exclusive slots.
//! [`TypedValue`] makes that unrepresentable otherwise: a value is one enum
//! variant, and the store maps each variant onto its own column.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── DataType ────────────────────────────────────────────────────────────────

/// The declared or inferred type of a field.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
  #[default]
  Text,
  Numeric,
  Boolean,
  Date,
}

impl DataType {
  pub fn as_str(self) -> &'static str {
    match self {
      DataType::Text => "text",
      DataType::Numeric => "numeric",
      DataType::Boolean => "boolean",
      DataType::Date => "date",
    }
  }

  /// Lenient reading of a type token as it appears in a mapping table.
  ///
  /// Accepts the legacy spellings `number` and `checkbox`; anything
  /// unrecognised (including an empty cell) is `Text`.
  pub fn from_declared(token: &str) -> Self {
    match token.trim().to_ascii_lowercase().as_str() {
      "numeric" | "number" => DataType::Numeric,
      "boolean" | "checkbox" => DataType::Boolean,
      "date" => DataType::Date,
      _ => DataType::Text,
    }
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DataType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "text" => Ok(DataType::Text),
      "numeric" => Ok(DataType::Numeric),
      "boolean" => Ok(DataType::Boolean),
      "date" => Ok(DataType::Date),
      other => Err(Error::UnknownDataType(other.to_owned())),
    }
  }
}

// ─── Cardinality ─────────────────────────────────────────────────────────────

/// Whether a mapped variable occurs once per filing or once per group row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cardinality {
  #[default]
  One,
  Many,
}

impl Cardinality {
  pub fn as_str(self) -> &'static str {
    match self {
      Cardinality::One => "ONE",
      Cardinality::Many => "MANY",
    }
  }

  /// `MANY` in any case is [`Cardinality::Many`]; everything else is `One`.
  pub fn from_declared(token: &str) -> Self {
    if token.trim().eq_ignore_ascii_case("many") {
      Cardinality::Many
    } else {
      Cardinality::One
    }
  }
}

impl FromStr for Cardinality {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "ONE" => Ok(Cardinality::One),
      "MANY" => Ok(Cardinality::Many),
      other => Err(Error::UnknownCardinality(other.to_owned())),
    }
  }
}

// ─── TypedValue ──────────────────────────────────────────────────────────────

/// A converted value. Exactly one slot is populated by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
  Text(String),
  Numeric(f64),
  Boolean(bool),
  /// Dates are kept verbatim; no calendar validation is performed.
  Date(String),
}

impl TypedValue {
  pub fn data_type(&self) -> DataType {
    match self {
      TypedValue::Text(_) => DataType::Text,
      TypedValue::Numeric(_) => DataType::Numeric,
      TypedValue::Boolean(_) => DataType::Boolean,
      TypedValue::Date(_) => DataType::Date,
    }
  }

  pub fn text(&self) -> Option<&str> {
    match self {
      TypedValue::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn numeric(&self) -> Option<f64> {
    match self {
      TypedValue::Numeric(n) => Some(*n),
      _ => None,
    }
  }

  pub fn boolean(&self) -> Option<bool> {
    match self {
      TypedValue::Boolean(b) => Some(*b),
      _ => None,
    }
  }

  pub fn date(&self) -> Option<&str> {
    match self {
      TypedValue::Date(s) => Some(s),
      _ => None,
    }
  }
}

// ─── Conversion ──────────────────────────────────────────────────────────────

const TRUTHY: &[&str] = &["true", "yes", "1", "t", "y", "x"];

const BOOLEAN_TOKENS: &[&str] =
  &["true", "false", "yes", "no", "1", "0", "t", "f", "y", "n"];

/// Coerce `raw` into the slot for `data_type`.
///
/// Never fails. A numeric field whose text does not parse degrades to a
/// text value holding the original input; a boolean field whose text is not
/// a truthy token is `false`.
pub fn convert(raw: &str, data_type: DataType) -> TypedValue {
  match data_type {
    DataType::Text => TypedValue::Text(raw.to_owned()),
    DataType::Numeric => match parse_numeric(raw) {
      Some(n) => TypedValue::Numeric(n),
      None => TypedValue::Text(raw.to_owned()),
    },
    DataType::Boolean => {
      let lowered = raw.trim().to_lowercase();
      TypedValue::Boolean(TRUTHY.contains(&lowered.as_str()))
    }
    DataType::Date => TypedValue::Date(raw.to_owned()),
  }
}

/// Strip everything but digits, sign and decimal point, then parse.
fn parse_numeric(raw: &str) -> Option<f64> {
  let cleaned: String = raw
    .chars()
    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
    .collect();
  if cleaned.is_empty() {
    return None;
  }
  cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Infer a type for a field that has no mapping entry.
///
/// Name hints win over the shape of the value.
pub fn guess_data_type(name: &str, value: &str) -> DataType {
  let name = name.to_lowercase();

  if name.contains("ind") || name.ends_with("flag") || name.contains("bool") {
    return DataType::Boolean;
  }
  if ["amt", "amount", "total", "num", "count"]
    .iter()
    .any(|hint| name.contains(hint))
  {
    return DataType::Numeric;
  }
  if ["date", "dt", "year"].iter().any(|hint| name.contains(hint)) {
    return DataType::Date;
  }

  let value = value.trim();
  if value.is_empty() {
    return DataType::Text;
  }

  let cleaned: String = value
    .chars()
    .filter(|c| !matches!(c, ',' | '$' | '%' | '(' | ')'))
    .collect();
  if cleaned.parse::<f64>().is_ok_and(|n| n.is_finite()) {
    return DataType::Numeric;
  }

  if BOOLEAN_TOKENS.contains(&value.to_lowercase().as_str()) {
    return DataType::Boolean;
  }

  if looks_like_date(value) {
    return DataType::Date;
  }

  DataType::Text
}

/// `YYYY-MM-DD` or `MM/DD/YYYY` at the start of `s`.
fn looks_like_date(s: &str) -> bool {
  fn shape(s: &[u8], pattern: &[u8]) -> bool {
    s.len() >= pattern.len()
      && pattern.iter().zip(s).all(|(p, c)| match p {
        b'9' => c.is_ascii_digit(),
        sep => sep == c,
      })
  }
  let bytes = s.as_bytes();
  shape(bytes, b"9999-99-99") || shape(bytes, b"99/99/9999")
}

// ─── Tests ────────────────────────────────────────────────────────────────────
