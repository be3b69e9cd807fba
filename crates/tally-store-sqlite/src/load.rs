//! The synchronous write path for one document, run inside a single
//! transaction on a pooled connection.
//!
//! Order matters: the organization and filing rows come first (foreign-key
//! targets), then scalar values, then groups parents-first, then group
//! values. Group values and nested groups reference their group through the
//! [`GroupIdMap`] returned by [`insert_groups`], never through the
//! transform-local id itself.

use std::collections::HashMap;

use rusqlite::{Connection, params};
use tally_core::{
  filing::{
    FieldKey, FilingMetadata, GroupInstance, GroupValue, LocalGroupId, Organization,
    ScalarValue, TransformedFiling,
  },
  store::{LoadOptions, LoadSummary},
};
use tracing::warn;

use crate::encode::encode_value;

/// Transform-local group id → store-assigned group id, for one document.
pub type GroupIdMap = HashMap<LocalGroupId, i64>;

/// Field name → field id, resolved lazily during one load.
type FieldIds = HashMap<String, i64>;

pub(crate) fn write_filing(
  conn: &Connection,
  filing: &TransformedFiling,
  options: LoadOptions,
  processed_at: &str,
) -> rusqlite::Result<LoadSummary> {
  let filing_id = filing.filing_id();
  let mut fields = FieldIds::new();

  upsert_organization(conn, &filing.organization, processed_at)?;
  upsert_filing(conn, &filing.metadata, processed_at)?;
  let values = upsert_filing_values(conn, filing_id, &filing.values, &mut fields)?;

  let replaced_groups = if options.replace_groups {
    delete_groups(conn, filing_id)?
  } else {
    0
  };
  let group_ids = insert_groups(conn, filing_id, &filing.groups)?;
  let (group_values, skipped_group_values) =
    upsert_group_values(conn, filing_id, &group_ids, &filing.group_values, &mut fields)?;

  Ok(LoadSummary {
    filing_id: filing_id.to_owned(),
    values,
    groups: group_ids.len(),
    group_values,
    skipped_group_values,
    replaced_groups,
  })
}

// ─── Entities ────────────────────────────────────────────────────────────────

fn upsert_organization(
  conn: &Connection,
  org: &Organization,
  updated_at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO organizations (
       ein, name, address_line1, address_line2, city, state, zip, country, website,
       updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
     ON CONFLICT(ein) DO UPDATE SET
       name          = COALESCE(excluded.name,          organizations.name),
       address_line1 = COALESCE(excluded.address_line1, organizations.address_line1),
       address_line2 = COALESCE(excluded.address_line2, organizations.address_line2),
       city          = COALESCE(excluded.city,          organizations.city),
       state         = COALESCE(excluded.state,         organizations.state),
       zip           = COALESCE(excluded.zip,           organizations.zip),
       country       = COALESCE(excluded.country,       organizations.country),
       website       = COALESCE(excluded.website,       organizations.website),
       updated_at    = excluded.updated_at",
    params![
      org.ein,
      org.name,
      org.address_line1,
      org.address_line2,
      org.city,
      org.state,
      org.zip,
      org.country,
      org.website,
      updated_at,
    ],
  )?;
  Ok(())
}

fn upsert_filing(
  conn: &Connection,
  meta: &FilingMetadata,
  processed_at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO filings (
       filing_id, ein, tax_period, form_type, form_version, tax_year,
       submission_date, object_id, xml_hash, processed_timestamp
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
     ON CONFLICT(filing_id) DO UPDATE SET
       form_version        = COALESCE(excluded.form_version,    filings.form_version),
       tax_year            = COALESCE(excluded.tax_year,        filings.tax_year),
       submission_date     = COALESCE(excluded.submission_date, filings.submission_date),
       object_id           = COALESCE(excluded.object_id,       filings.object_id),
       xml_hash            = COALESCE(excluded.xml_hash,        filings.xml_hash),
       processed_timestamp = excluded.processed_timestamp",
    params![
      meta.filing_id,
      meta.ein,
      meta.tax_period,
      meta.form_type,
      meta.form_version,
      meta.tax_year,
      meta.submission_date,
      meta.object_id,
      meta.xml_hash,
      processed_at,
    ],
  )?;
  Ok(())
}

/// Id of the field definition named `key.name`, created from `key` when
/// absent. An existing definition is never modified.
fn field_id(conn: &Connection, key: &FieldKey, cache: &mut FieldIds) -> rusqlite::Result<i64> {
  if let Some(id) = cache.get(&key.name) {
    return Ok(*id);
  }

  conn
    .prepare_cached(
      "INSERT INTO field_definitions (
         name, data_type, xpath, table_name, description, is_repeating
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
       ON CONFLICT(name) DO NOTHING",
    )?
    .execute(params![
      key.name,
      key.data_type.as_str(),
      key.location,
      key.table,
      key.description,
      key.repeating,
    ])?;

  let id: i64 = conn
    .prepare_cached("SELECT field_id FROM field_definitions WHERE name = ?1")?
    .query_row(params![key.name], |row| row.get(0))?;

  cache.insert(key.name.clone(), id);
  Ok(id)
}

// ─── Scalar values ───────────────────────────────────────────────────────────

fn upsert_filing_values(
  conn: &Connection,
  filing_id: &str,
  values: &[ScalarValue],
  fields: &mut FieldIds,
) -> rusqlite::Result<usize> {
  let mut written = 0;
  for value in values {
    let field_id = field_id(conn, &value.field, fields)?;
    let cols = encode_value(&value.value);
    conn
      .prepare_cached(
        "INSERT INTO filing_values (
           filing_id, field_id, value_text, value_numeric, value_boolean, value_date
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(filing_id, field_id) DO UPDATE SET
           value_text    = excluded.value_text,
           value_numeric = excluded.value_numeric,
           value_boolean = excluded.value_boolean,
           value_date    = excluded.value_date",
      )?
      .execute(params![
        filing_id,
        field_id,
        cols.text,
        cols.numeric,
        cols.boolean,
        cols.date,
      ])?;
    written += 1;
  }
  Ok(written)
}

// ─── Groups ──────────────────────────────────────────────────────────────────

/// Delete the filing's stored groups. Nested groups and group values go
/// with them through `ON DELETE CASCADE`.
fn delete_groups(conn: &Connection, filing_id: &str) -> rusqlite::Result<usize> {
  conn.execute(
    "DELETE FROM repeating_groups WHERE filing_id = ?1",
    params![filing_id],
  )
}

/// Insert `groups` (parents before children) and return the id map.
///
/// A group whose parent is missing from the map is skipped; its values are
/// then skipped as unmapped too.
pub(crate) fn insert_groups(
  conn: &Connection,
  filing_id: &str,
  groups: &[GroupInstance],
) -> rusqlite::Result<GroupIdMap> {
  let mut ids = GroupIdMap::with_capacity(groups.len());
  let mut stmt = conn.prepare_cached(
    "INSERT INTO repeating_groups (
       filing_id, parent_group_id, name, table_name, xpath, nesting_level, row_count
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;

  for group in groups {
    let parent_id = match group.parent_local_id {
      None => None,
      Some(local) => match ids.get(&local) {
        Some(id) => Some(*id),
        None => {
          warn!(
            filing_id,
            group = %group.name,
            local_id = group.local_id,
            parent_local_id = local,
            "parent group has no store id, group skipped"
          );
          continue;
        }
      },
    };

    let group_id = stmt.insert(params![
      filing_id,
      parent_id,
      group.name,
      group.table_name,
      group.path,
      group.nesting_level,
      group.row_count,
    ])?;
    ids.insert(group.local_id, group_id);
  }
  Ok(ids)
}

/// Upsert group values through `ids`. Returns `(written, skipped)`.
pub(crate) fn upsert_group_values(
  conn: &Connection,
  filing_id: &str,
  ids: &GroupIdMap,
  values: &[GroupValue],
  fields: &mut HashMap<String, i64>,
) -> rusqlite::Result<(usize, usize)> {
  let (mut written, mut skipped) = (0, 0);
  for value in values {
    let Some(&group_id) = ids.get(&value.local_group_id) else {
      warn!(
        filing_id,
        local_group_id = value.local_group_id,
        field = %value.field.name,
        "group value references an unmapped group, skipped"
      );
      skipped += 1;
      continue;
    };

    let field_id = field_id(conn, &value.field, fields)?;
    let cols = encode_value(&value.value);
    conn
      .prepare_cached(
        "INSERT INTO repeating_group_values (
           group_id, field_id, instance_index,
           value_text, value_numeric, value_boolean, value_date
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(group_id, field_id, instance_index) DO UPDATE SET
           value_text    = excluded.value_text,
           value_numeric = excluded.value_numeric,
           value_boolean = excluded.value_boolean,
           value_date    = excluded.value_date",
      )?
      .execute(params![
        group_id,
        field_id,
        value.instance_index,
        cols.text,
        cols.numeric,
        cols.boolean,
        cols.date,
      ])?;
    written += 1;
  }
  Ok((written, skipped))
}
