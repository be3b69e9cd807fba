//! [`SqliteStore`], the SQLite implementation of [`FilingStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use tracing::{debug, info};

use tally_core::{
  filing::{Organization, TransformedFiling},
  store::{
    FieldDefinition, FilingRecord, FilingStore, LoadOptions, LoadSummary, StoreCounts,
    StoredGroup, StoredGroupValue, StoredValue,
  },
};

use crate::{
  Result,
  encode::{
    RawFieldDefinition, RawFiling, RawGroup, RawGroupValue, RawOrganization, RawValue,
    encode_dt,
  },
  load::write_filing,
  pool::{self, Pool},
  schema::{SCHEMA, TABLES},
};

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// Number of pooled connections. File-backed stores only; an in-memory
  /// store always has one.
  pub pool_size:    u32,
  /// How long a writer waits for SQLite's write lock.
  pub busy_timeout: Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      pool_size:    4,
      busy_timeout: Duration::from_millis(5000),
    }
  }
}

/// A Tally EAV store backed by one SQLite file.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteStore {
  pool: Pool,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let (size, busy_timeout) = (options.pool_size.max(1), options.busy_timeout);

    // Building the pool opens every connection, which blocks.
    let pool = {
      let path = path.clone();
      tokio::task::spawn_blocking(move || pool::file_pool(&path, size, busy_timeout)).await??
    };
    let store = Self::with_schema(pool).await?;

    info!(path = %path.display(), pool_size = size, "store opened");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let pool = pool::memory_pool(StoreOptions::default().busy_timeout)?;
    Self::with_schema(pool).await
  }

  async fn with_schema(pool: Pool) -> Result<Self> {
    let store = Self { pool };
    store.init_schema().await?;
    Ok(store)
  }

  pub fn pool(&self) -> &Pool { &self.pool }

  /// Run the schema DDL. Harmless on an initialised store.
  pub async fn init_schema(&self) -> Result<()> {
    self
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
  }

  async fn call<F, T>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    pool::run(&self.pool, f).await
  }
}

// ─── FilingStore impl ────────────────────────────────────────────────────────

impl FilingStore for SqliteStore {
  type Error = crate::Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn load(&self, filing: TransformedFiling, options: LoadOptions) -> Result<LoadSummary> {
    let processed_at = encode_dt(Utc::now());

    let summary = self
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let summary = write_filing(&tx, &filing, options, &processed_at)?;
        tx.commit()?;
        Ok(summary)
      })
      .await?;

    debug!(
      filing_id = %summary.filing_id,
      values = summary.values,
      groups = summary.groups,
      group_values = summary.group_values,
      skipped = summary.skipped_group_values,
      replaced = summary.replaced_groups,
      "filing loaded"
    );
    Ok(summary)
  }

  async fn reset(&self) -> Result<()> {
    self
      .call(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for table in TABLES {
          tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.execute("DELETE FROM sqlite_sequence", [])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    info!("store reset");
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn filing_exists(&self, filing_id: &str) -> Result<bool> {
    let filing_id = filing_id.to_owned();

    let exists = self
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM filings WHERE filing_id = ?1",
              rusqlite::params![filing_id],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn counts(&self) -> Result<StoreCounts> {
    let counts = self
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM organizations),
             (SELECT COUNT(*) FROM filings),
             (SELECT COUNT(*) FROM field_definitions),
             (SELECT COUNT(*) FROM filing_values),
             (SELECT COUNT(*) FROM repeating_groups),
             (SELECT COUNT(*) FROM repeating_group_values)",
          [],
          |row| {
            Ok(StoreCounts {
              organizations:          row.get(0)?,
              filings:                row.get(1)?,
              field_definitions:      row.get(2)?,
              filing_values:          row.get(3)?,
              repeating_groups:       row.get(4)?,
              repeating_group_values: row.get(5)?,
            })
          },
        )?)
      })
      .await?;
    Ok(counts)
  }

  async fn get_organization(&self, ein: &str) -> Result<Option<Organization>> {
    let ein = ein.to_owned();

    let raw: Option<RawOrganization> = self
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM organizations WHERE ein = ?1",
                RawOrganization::COLUMNS
              ),
              rusqlite::params![ein],
              RawOrganization::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw.map(RawOrganization::into_organization))
  }

  async fn get_filing(&self, filing_id: &str) -> Result<Option<FilingRecord>> {
    let filing_id = filing_id.to_owned();

    let raw: Option<RawFiling> = self
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM filings WHERE filing_id = ?1",
                RawFiling::COLUMNS
              ),
              rusqlite::params![filing_id],
              RawFiling::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFiling::into_record).transpose()
  }

  async fn field_definition(&self, name: &str) -> Result<Option<FieldDefinition>> {
    let name = name.to_owned();

    let raw: Option<RawFieldDefinition> = self
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM field_definitions WHERE name = ?1",
                RawFieldDefinition::COLUMNS
              ),
              rusqlite::params![name],
              RawFieldDefinition::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFieldDefinition::into_definition).transpose()
  }

  async fn filing_values(&self, filing_id: &str) -> Result<Vec<StoredValue>> {
    let filing_id = filing_id.to_owned();

    let raws: Vec<RawValue> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT v.field_id, d.name,
                  v.value_text, v.value_numeric, v.value_boolean, v.value_date
           FROM filing_values v
           JOIN field_definitions d ON d.field_id = v.field_id
           WHERE v.filing_id = ?1
           ORDER BY v.field_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![filing_id], RawValue::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawValue::into_value).collect()
  }

  async fn repeating_groups(&self, filing_id: &str) -> Result<Vec<StoredGroup>> {
    let filing_id = filing_id.to_owned();

    let raws: Vec<RawGroup> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM repeating_groups WHERE filing_id = ?1 ORDER BY group_id",
          RawGroup::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![filing_id], RawGroup::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawGroup::into_group).collect())
  }

  async fn group_values(&self, group_id: i64) -> Result<Vec<StoredGroupValue>> {

    let raws: Vec<RawGroupValue> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT v.group_id, v.field_id, d.name, v.instance_index,
                  v.value_text, v.value_numeric, v.value_boolean, v.value_date
           FROM repeating_group_values v
           JOIN field_definitions d ON d.field_id = v.field_id
           WHERE v.group_id = ?1
           ORDER BY v.field_id, v.instance_index",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![group_id], RawGroupValue::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGroupValue::into_group_value).collect()
  }
}
