//! `tally` command-line tool.
//!
//! Reads `tally.toml` (or the path given with `--config`), an optional
//! credentials file and `TALLY_*` environment variables, opens the SQLite
//! store and runs one of the subcommands below.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tally_cli::{
  batch::{BatchOptions, run_batch, write_failures},
  config::Settings,
  discover::discover_documents,
};
use tally_core::store::{FilingStore, LoadOptions};
use tally_store_sqlite::SqliteStore;
use tally_transform::{Concordance, Transformer};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Load e-filed tax returns into an EAV store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "tally.toml")]
  config: PathBuf,

  /// Database credentials file (`key=value` lines).
  #[arg(long, global = true)]
  credentials: Option<PathBuf>,

  /// Log at debug level unless `RUST_LOG` says otherwise.
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Transform and load every XML document under a directory.
  Process {
    /// Directory searched recursively for `*.xml` documents.
    #[arg(long)]
    xml_dir: PathBuf,

    /// Concordance CSV mapping variables to document locations.
    #[arg(long)]
    concordance: PathBuf,

    /// Process at most this many documents, in sorted path order.
    #[arg(long)]
    limit: Option<usize>,

    /// Documents processed concurrently. Overrides `processing.workers`.
    #[arg(long)]
    workers: Option<usize>,

    /// Write a JSON manifest of failed documents here.
    #[arg(long)]
    failures_out: Option<PathBuf>,

    /// Skip documents whose filing is already stored.
    #[arg(long)]
    skip_existing: bool,
  },

  /// Create the schema.
  Init,

  /// Delete every stored row.
  Reset,

  /// Print the row count of every table.
  Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Initialise tracing.
  let default_level = if cli.verbose {
    LevelFilter::DEBUG
  } else {
    LevelFilter::INFO
  };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy(),
    )
    .init();

  let settings = Settings::load(Some(&cli.config), cli.credentials.as_deref())?;
  tracing::debug!(?settings, "settings loaded");

  if settings.database.has_server_params() {
    tracing::debug!("host/port/user/password are ignored by the SQLite store");
  }

  let db_path = settings.database.sqlite_path();
  let store = SqliteStore::open(&db_path, &settings.database.store_options())
    .await
    .with_context(|| format!("failed to open store at {}", db_path.display()))?;
  tracing::info!(path = %db_path.display(), "store opened");

  match cli.command {
    Command::Process {
      xml_dir,
      concordance,
      limit,
      workers,
      failures_out,
      skip_existing,
    } => {
      let concordance = Concordance::load(&concordance)
        .with_context(|| format!("failed to load concordance {}", concordance.display()))?;
      tracing::info!(entries = concordance.len(), "concordance loaded");

      let transformer = Transformer::new(Arc::new(concordance), settings.detector_config())
        .context("failed to build transformer")?;

      let mut paths = discover_documents(&xml_dir)
        .with_context(|| format!("failed to list {}", xml_dir.display()))?;
      if let Some(limit) = limit {
        paths.truncate(limit);
      }

      let options = BatchOptions {
        workers:       workers.unwrap_or(settings.processing.workers),
        load:          LoadOptions {
          replace_groups: settings.processing.replace_groups,
        },
        skip_existing: skip_existing || settings.processing.skip_existing,
      };
      let summary = run_batch(Arc::new(store), Arc::new(transformer), paths, options).await;

      println!(
        "processed {} documents: {} loaded, {} skipped, {} failed ({} values, {} groups, {} \
         group values) in {:.1}s",
        summary.total,
        summary.loaded,
        summary.skipped,
        summary.failed,
        summary.values,
        summary.groups,
        summary.group_values,
        summary.elapsed.as_secs_f64(),
      );

      if let Some(out) = failures_out {
        write_failures(&out, &summary)?;
      }

      if summary.total > 0 && summary.loaded + summary.skipped == 0 {
        anyhow::bail!("no document was processed successfully");
      }
    }

    Command::Init => {
      store.init_schema().await.context("failed to create schema")?;
      println!("schema ready at {}", db_path.display());
    }

    Command::Reset => {
      store.reset().await.context("failed to reset store")?;
      println!("all tables truncated");
    }

    Command::Check => {
      let counts = store.counts().await.context("failed to count rows")?;
      println!("organizations          {}", counts.organizations);
      println!("filings                {}", counts.filings);
      println!("field_definitions      {}", counts.field_definitions);
      println!("filing_values          {}", counts.filing_values);
      println!("repeating_groups       {}", counts.repeating_groups);
      println!("repeating_group_values {}", counts.repeating_group_values);
    }
  }

  Ok(())
}
