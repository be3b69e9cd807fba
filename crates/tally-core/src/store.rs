//! The `FilingStore` trait and its read models.
//!
//! Implemented by storage backends (e.g. `tally-store-sqlite`). The batch
//! driver depends on this abstraction, not on a concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  filing::{Organization, TransformedFiling},
  value::{DataType, TypedValue},
};

// ─── Options and summaries ───────────────────────────────────────────────────

/// Knobs for [`FilingStore::load`].
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
  /// Delete the filing's previously stored repeating groups (and their
  /// values) inside the same transaction before inserting the new ones.
  pub replace_groups: bool,
}

impl Default for LoadOptions {
  fn default() -> Self {
    Self {
      replace_groups: true,
    }
  }
}

/// What a successful load wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
  pub filing_id:            String,
  pub values:               usize,
  pub groups:               usize,
  pub group_values:         usize,
  /// Group values whose transform-local group id had no store id.
  pub skipped_group_values: usize,
  /// Groups from an earlier load that were deleted first.
  pub replaced_groups:      usize,
}

/// Row counts for each table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
  pub organizations:          u64,
  pub filings:                u64,
  pub field_definitions:      u64,
  pub filing_values:          u64,
  pub repeating_groups:       u64,
  pub repeating_group_values: u64,
}

// ─── Read models ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
  pub field_id:     i64,
  pub name:         String,
  pub data_type:    DataType,
  pub location:     Option<String>,
  pub table_name:   Option<String>,
  pub description:  Option<String>,
  pub is_repeating: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilingRecord {
  pub filing_id:       String,
  pub ein:             String,
  pub tax_period:      String,
  pub form_type:       String,
  pub form_version:    Option<String>,
  pub tax_year:        Option<i32>,
  pub submission_date: Option<String>,
  pub object_id:       Option<String>,
  pub xml_hash:        Option<String>,
  pub processed_at:    DateTime<Utc>,
}

/// A stored scalar value with its field name resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
  pub field_id:   i64,
  pub field_name: String,
  pub value:      TypedValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredGroup {
  pub group_id:        i64,
  pub filing_id:       String,
  pub parent_group_id: Option<i64>,
  pub name:            String,
  pub table_name:      String,
  pub path:            String,
  pub nesting_level:   u32,
  pub row_count:       u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredGroupValue {
  pub group_id:       i64,
  pub field_id:       i64,
  pub field_name:     String,
  pub instance_index: u32,
  pub value:          TypedValue,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a relational EAV store for transformed filings.
///
/// All methods return `Send` futures so a store can be shared across tasks in
/// a multi-threaded runtime.
pub trait FilingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist one transformed document in a single transaction.
  ///
  /// Organization and filing rows are merged by natural key; scalar and
  /// group values are upserted on their composite keys. Either every write
  /// commits or none does.
  fn load(
    &self,
    filing: TransformedFiling,
    options: LoadOptions,
  ) -> impl Future<Output = Result<LoadSummary, Self::Error>> + Send + '_;

  /// Truncate every table, children first.
  fn reset(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn filing_exists<'a>(
    &'a self,
    filing_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn counts(
    &self,
  ) -> impl Future<Output = Result<StoreCounts, Self::Error>> + Send + '_;

  fn get_organization<'a>(
    &'a self,
    ein: &'a str,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + 'a;

  fn get_filing<'a>(
    &'a self,
    filing_id: &'a str,
  ) -> impl Future<Output = Result<Option<FilingRecord>, Self::Error>> + Send + 'a;

  fn field_definition<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<FieldDefinition>, Self::Error>>
  + Send
  + 'a;

  /// Scalar values of a filing, ordered by field id.
  fn filing_values<'a>(
    &'a self,
    filing_id: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredValue>, Self::Error>> + Send + 'a;

  /// Repeating groups of a filing, parents before children.
  fn repeating_groups<'a>(
    &'a self,
    filing_id: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredGroup>, Self::Error>> + Send + 'a;

  /// Values of one group, ordered by field then instance index.
  fn group_values(
    &self,
    group_id: i64,
  ) -> impl Future<Output = Result<Vec<StoredGroupValue>, Self::Error>> + Send + '_;
}
