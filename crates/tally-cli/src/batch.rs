//! The batch driver: one task per document over a bounded fan-out.
//!
//! A document's failure is recorded in its [`DocumentOutcome`] and never
//! touches its siblings. Counters in [`BatchSummary`] are computed once every
//! task has joined.

use std::{
  fs,
  path::{Path, PathBuf},
  sync::Arc,
  time::{Duration, Instant},
};

use anyhow::Context as _;
use serde::Serialize;
use tally_core::store::{FilingStore, LoadOptions, LoadSummary};
use tally_transform::{Error as TransformError, Transformer};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info};

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
  /// Malformed or unreadable document.
  Parse,
  /// A required header field is missing.
  Metadata,
  /// The load transaction failed and was rolled back.
  Database,
  /// Anything else, including a panicked task.
  Internal,
}

impl FailureKind {
  fn of_transform(err: &TransformError) -> Self {
    match err {
      TransformError::Parse(_) => Self::Parse,
      TransformError::Metadata { .. } => Self::Metadata,
      TransformError::Concordance(_) | TransformError::Pattern(_) => Self::Internal,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
  Loaded(LoadSummary),
  /// Already stored and `skip_existing` was set.
  Skipped,
  Failed(FailureKind),
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
  pub path:      PathBuf,
  pub filing_id: Option<String>,
  pub status:    Status,
  /// The error and its sources, outermost first, joined by `": "`.
  pub error:     Option<String>,
  pub elapsed:   Duration,
}

impl DocumentOutcome {
  fn failed(
    path: PathBuf,
    filing_id: Option<String>,
    kind: FailureKind,
    err: &(dyn std::error::Error + 'static),
    started: Instant,
  ) -> Self {
    let chain = error_chain(err);
    error!(
      path = %path.display(),
      filing_id = filing_id.as_deref().unwrap_or("-"),
      kind = ?kind,
      error = %chain,
      "document failed"
    );
    Self {
      path,
      filing_id,
      status: Status::Failed(kind),
      error: Some(chain),
      elapsed: started.elapsed(),
    }
  }

  pub fn is_failure(&self) -> bool { matches!(self.status, Status::Failed(_)) }
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
  pub total:                usize,
  pub loaded:               usize,
  pub skipped:              usize,
  pub failed:               usize,
  pub values:               usize,
  pub groups:               usize,
  pub group_values:         usize,
  pub skipped_group_values: usize,
  pub elapsed:              Duration,
  /// In completion order.
  pub outcomes:             Vec<DocumentOutcome>,
}

impl BatchSummary {
  fn from_outcomes(outcomes: Vec<DocumentOutcome>, elapsed: Duration) -> Self {
    let mut summary = Self {
      total: outcomes.len(),
      elapsed,
      ..Self::default()
    };
    for outcome in &outcomes {
      match &outcome.status {
        Status::Loaded(load) => {
          summary.loaded += 1;
          summary.values += load.values;
          summary.groups += load.groups;
          summary.group_values += load.group_values;
          summary.skipped_group_values += load.skipped_group_values;
        }
        Status::Skipped => summary.skipped += 1,
        Status::Failed(_) => summary.failed += 1,
      }
    }
    summary.outcomes = outcomes;
    summary
  }

  pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
    self.outcomes.iter().filter(|o| o.is_failure())
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
  /// Documents in flight at once.
  pub workers:       usize,
  pub load:          LoadOptions,
  /// Skip documents whose filing id is already stored.
  pub skip_existing: bool,
}

impl Default for BatchOptions {
  fn default() -> Self {
    Self {
      workers:       4,
      load:          LoadOptions::default(),
      skip_existing: false,
    }
  }
}

/// Transform and load every document in `paths`.
pub async fn run_batch<S>(
  store: Arc<S>,
  transformer: Arc<Transformer>,
  paths: Vec<PathBuf>,
  options: BatchOptions,
) -> BatchSummary
where
  S: FilingStore + 'static,
{
  let started = Instant::now();
  let workers = options.workers.max(1);
  let permits = Arc::new(Semaphore::new(workers));
  let mut tasks = JoinSet::new();

  info!(documents = paths.len(), workers, "batch started");

  for path in paths {
    // The semaphore is never closed.
    let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
      break;
    };
    let store = Arc::clone(&store);
    let transformer = Arc::clone(&transformer);

    tasks.spawn(async move {
      let _permit = permit;
      let task_started = Instant::now();
      // A nested task keeps the path at hand if the document's work panics.
      let work = tokio::spawn(process_document(store, transformer, path.clone(), options));
      match work.await {
        Ok(outcome) => outcome,
        Err(err) => DocumentOutcome::failed(path, None, FailureKind::Internal, &err, task_started),
      }
    });
  }

  let mut outcomes = Vec::new();
  while let Some(joined) = tasks.join_next().await {
    match joined {
      Ok(outcome) => outcomes.push(outcome),
      Err(e) => error!(error = ?e, "document task panicked"),
    }
  }

  let summary = BatchSummary::from_outcomes(outcomes, started.elapsed());
  info!(
    total = summary.total,
    loaded = summary.loaded,
    skipped = summary.skipped,
    failed = summary.failed,
    values = summary.values,
    groups = summary.groups,
    group_values = summary.group_values,
    elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
    "batch finished"
  );
  summary
}

async fn process_document<S>(
  store: Arc<S>,
  transformer: Arc<Transformer>,
  path: PathBuf,
  options: BatchOptions,
) -> DocumentOutcome
where
  S: FilingStore + 'static,
{
  let started = Instant::now();

  let transformed = {
    let path = path.clone();
    tokio::task::spawn_blocking(move || transformer.transform_file(&path)).await
  };
  let filing = match transformed {
    Ok(Ok(filing)) => filing,
    Ok(Err(err)) => {
      let kind = FailureKind::of_transform(&err);
      return DocumentOutcome::failed(path, None, kind, &err, started);
    }
    Err(err) => {
      return DocumentOutcome::failed(path, None, FailureKind::Internal, &err, started);
    }
  };
  let filing_id = filing.filing_id().to_owned();

  if options.skip_existing {
    match store.filing_exists(&filing_id).await {
      Ok(false) => {}
      Ok(true) => {
        debug!(path = %path.display(), filing_id = %filing_id, "already stored, skipped");
        return DocumentOutcome {
          path,
          filing_id: Some(filing_id),
          status: Status::Skipped,
          error: None,
          elapsed: started.elapsed(),
        };
      }
      Err(err) => {
        return DocumentOutcome::failed(
          path,
          Some(filing_id),
          FailureKind::Database,
          &err,
          started,
        );
      }
    }
  }

  match store.load(filing, options.load).await {
    Ok(summary) => {
      debug!(
        path = %path.display(),
        filing_id = %filing_id,
        values = summary.values,
        groups = summary.groups,
        "document loaded"
      );
      DocumentOutcome {
        path,
        filing_id: Some(filing_id),
        status: Status::Loaded(summary),
        error: None,
        elapsed: started.elapsed(),
      }
    }
    Err(err) => {
      DocumentOutcome::failed(path, Some(filing_id), FailureKind::Database, &err, started)
    }
  }
}

/// `err` followed by each of its sources.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
  let mut parts = vec![err.to_string()];
  let mut source = err.source();
  while let Some(cause) = source {
    let text = cause.to_string();
    // `#[error(transparent)]` wrappers repeat their source's message.
    if parts.last() != Some(&text) {
      parts.push(text);
    }
    source = cause.source();
  }
  parts.join(": ")
}

// ─── Failure manifest ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FailureRecord<'a> {
  path:      &'a Path,
  filing_id: Option<&'a str>,
  kind:      FailureKind,
  error:     Option<&'a str>,
}

/// Write the failed documents of `summary` as a JSON array, for an offline
/// re-run.
pub fn write_failures(path: &Path, summary: &BatchSummary) -> anyhow::Result<()> {
  let records: Vec<FailureRecord<'_>> = summary
    .failures()
    .filter_map(|o| match o.status {
      Status::Failed(kind) => Some(FailureRecord {
        path: &o.path,
        filing_id: o.filing_id.as_deref(),
        kind,
        error: o.error.as_deref(),
      }),
      _ => None,
    })
    .collect();

  let json = serde_json::to_string_pretty(&records).context("failed to encode failures")?;
  fs::write(path, json)
    .with_context(|| format!("failed to write failure manifest {}", path.display()))?;
  info!(path = %path.display(), failures = records.len(), "failure manifest written");
  Ok(())
}

#[cfg(test)]
mod tests {
  use tally_store_sqlite::SqliteStore;
  use tally_transform::{Concordance, DetectorConfig};

  use super::*;

  const CONCORDANCE: &str = "\
variable_name,xpath,description,data_type_simple,rdb_table,rdb_relationship
F9_01_REV_TOT,/Return/ReturnData/IRS990/TotalRevenueAmt,Total revenue,numeric,filing_values,ONE
";

  fn form_990(ein: &str) -> String {
    format!(
      r#"<Return xmlns="http://www.irs.gov/efile" returnVersion="2020v4.1">
  <ReturnHeader>
    <TaxPeriodEndDt>2020-12-31</TaxPeriodEndDt>
    <ReturnTypeCd>990</ReturnTypeCd>
    <Filer><EIN>{ein}</EIN></Filer>
  </ReturnHeader>
  <ReturnData>
    <IRS990>
      <TotalRevenueAmt>1000000</TotalRevenueAmt>
      <Officers>
        <Officer><PersonNm>Jane Doe</PersonNm><TitleTxt>President</TitleTxt></Officer>
        <Officer><PersonNm>John Roe</PersonNm><TitleTxt>Treasurer</TitleTxt></Officer>
      </Officers>
    </IRS990>
  </ReturnData>
</Return>"#
    )
  }

  const NO_EIN: &str = "<Return><ReturnHeader><TaxPeriodEndDt>2020-12-31</TaxPeriodEndDt>\
                        <ReturnTypeCd>990</ReturnTypeCd></ReturnHeader></Return>";

  struct Fixture {
    dir:         tempfile::TempDir,
    paths:       Vec<PathBuf>,
    store:       Arc<SqliteStore>,
    transformer: Arc<Transformer>,
  }

  async fn fixture(docs: &[(&str, String)]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for (name, xml) in docs {
      let path = dir.path().join(name);
      fs::write(&path, xml).unwrap();
      paths.push(path);
    }
    let concordance = Arc::new(Concordance::from_csv(CONCORDANCE).unwrap());
    Fixture {
      dir,
      paths,
      store: Arc::new(SqliteStore::open_in_memory().await.unwrap()),
      transformer: Arc::new(Transformer::new(concordance, DetectorConfig::default()).unwrap()),
    }
  }

  fn outcome<'a>(summary: &'a BatchSummary, name: &str) -> &'a DocumentOutcome {
    summary
      .outcomes
      .iter()
      .find(|o| o.path.ends_with(name))
      .unwrap()
  }

  #[tokio::test]
  async fn one_failure_does_not_affect_siblings() {
    let f = fixture(&[
      ("a.xml", form_990("111111111")),
      ("b.xml", NO_EIN.to_owned()),
      ("c.xml", form_990("333333333")),
      ("d.xml", form_990("444444444")),
    ])
    .await;

    let options = BatchOptions {
      workers: 2,
      ..BatchOptions::default()
    };
    let summary = run_batch(
      Arc::clone(&f.store),
      Arc::clone(&f.transformer),
      f.paths.clone(),
      options,
    )
    .await;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.loaded, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.values, 3);
    assert_eq!(summary.groups, 3);
    assert_eq!(summary.group_values, 12);

    let failed = outcome(&summary, "b.xml");
    assert_eq!(failed.status, Status::Failed(FailureKind::Metadata));
    assert!(failed.error.as_deref().unwrap().contains("EIN"));
    assert_eq!(failed.filing_id, None);

    let loaded = outcome(&summary, "c.xml");
    assert_eq!(loaded.filing_id.as_deref(), Some("333333333_2020-12-31_990"));
    assert!(matches!(loaded.status, Status::Loaded(_)));

    let counts = f.store.counts().await.unwrap();
    assert_eq!(counts.filings, 3);
    assert_eq!(counts.organizations, 3);
  }

  #[tokio::test]
  async fn parse_errors_are_classified() {
    let f = fixture(&[
      ("good.xml", form_990("111111111")),
      ("broken.xml", "<Return><ReturnHeader></Return>".to_owned()),
    ])
    .await;
    let summary = run_batch(
      Arc::clone(&f.store),
      Arc::clone(&f.transformer),
      f.paths.clone(),
      BatchOptions::default(),
    )
    .await;

    assert_eq!(summary.loaded, 1);
    assert_eq!(
      outcome(&summary, "broken.xml").status,
      Status::Failed(FailureKind::Parse)
    );
  }

  #[tokio::test]
  async fn rerun_with_skip_existing() {
    let f = fixture(&[
      ("a.xml", form_990("111111111")),
      ("b.xml", form_990("222222222")),
    ])
    .await;

    let first = run_batch(
      Arc::clone(&f.store),
      Arc::clone(&f.transformer),
      f.paths.clone(),
      BatchOptions::default(),
    )
    .await;
    assert_eq!(first.loaded, 2);

    let options = BatchOptions {
      skip_existing: true,
      ..BatchOptions::default()
    };
    let second = run_batch(
      Arc::clone(&f.store),
      Arc::clone(&f.transformer),
      f.paths.clone(),
      options,
    )
    .await;
    assert_eq!(second.skipped, 2);
    assert_eq!(second.loaded, 0);
    assert_eq!(f.store.counts().await.unwrap().repeating_groups, 2);
  }

  #[tokio::test]
  async fn failure_manifest_lists_failed_documents() {
    let f = fixture(&[("a.xml", form_990("111111111")), ("b.xml", NO_EIN.to_owned())]).await;
    let summary = run_batch(
      Arc::clone(&f.store),
      Arc::clone(&f.transformer),
      f.paths.clone(),
      BatchOptions::default(),
    )
    .await;

    let out = f.dir.path().join("failures.json");
    write_failures(&out, &summary).unwrap();
    let json: serde_json::Value =
      serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["kind"], "metadata");
    assert!(records[0]["path"].as_str().unwrap().ends_with("b.xml"));
  }

  #[test]
  fn error_chain_skips_repeated_messages() {
    let err = TransformError::Metadata { field: "EIN" };
    assert_eq!(error_chain(&err), "required metadata field EIN not found");
  }
}
