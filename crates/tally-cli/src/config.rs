//! Runtime settings, layered with the `config` crate:
//!
//! 1. built-in defaults;
//! 2. an optional TOML file;
//! 3. an optional credentials file (`key=value` lines, optional `[section]`
//!    headers, or a single libpq-style `host=.. dbname=..` line);
//! 4. environment variables, e.g. `TALLY_DATABASE__PATH=/tmp/t.sqlite3`.

use std::{collections::HashMap, fmt, path::Path, path::PathBuf, time::Duration};

use anyhow::Context as _;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tally_store_sqlite::StoreOptions;
use tally_transform::DetectorConfig;

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub database:   DatabaseSettings,
  pub processing: ProcessingSettings,
  pub detector:   DetectorSettings,
}

/// Connection parameters. `host`, `port`, `user` and `password` are accepted
/// so existing credential files load unchanged; the SQLite store only uses
/// `path`, `dbname`, `pool_size` and `busy_timeout_ms`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
  pub host:            Option<String>,
  pub port:            Option<u16>,
  #[serde(alias = "name")]
  pub dbname:          String,
  pub user:            Option<String>,
  pub password:        Option<String>,
  pub path:            Option<PathBuf>,
  pub pool_size:       u32,
  pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
  fn default() -> Self {
    Self {
      host:            None,
      port:            None,
      dbname:          "irs990".to_owned(),
      user:            None,
      password:        None,
      path:            None,
      pool_size:       4,
      busy_timeout_ms: 5000,
    }
  }
}

impl fmt::Debug for DatabaseSettings {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DatabaseSettings")
      .field("host", &self.host)
      .field("port", &self.port)
      .field("dbname", &self.dbname)
      .field("user", &self.user)
      .field("password", &self.password.as_ref().map(|_| "***"))
      .field("path", &self.path)
      .field("pool_size", &self.pool_size)
      .field("busy_timeout_ms", &self.busy_timeout_ms)
      .finish()
  }
}

impl DatabaseSettings {
  /// The SQLite file: `path` when set, else `<dbname>.sqlite3`.
  pub fn sqlite_path(&self) -> PathBuf {
    self
      .path
      .clone()
      .unwrap_or_else(|| PathBuf::from(format!("{}.sqlite3", self.dbname)))
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      pool_size:    self.pool_size,
      busy_timeout: Duration::from_millis(self.busy_timeout_ms),
    }
  }

  /// Whether any server connection parameter was supplied.
  pub fn has_server_params(&self) -> bool {
    self.host.is_some() || self.port.is_some() || self.user.is_some()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
  pub workers:           usize,
  pub max_nesting_depth: u32,
  pub replace_groups:    bool,
  pub skip_existing:     bool,
}

impl Default for ProcessingSettings {
  fn default() -> Self {
    Self {
      workers:           4,
      max_nesting_depth: 3,
      replace_groups:    true,
      skip_existing:     false,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
  pub body_element:    String,
  pub group_tokens:    Vec<String>,
  pub domain_keywords: Vec<String>,
  pub max_sample_rows: usize,
}

impl Default for DetectorSettings {
  fn default() -> Self {
    let defaults = DetectorConfig::default();
    Self {
      body_element:    defaults.body_element,
      group_tokens:    defaults.group_tokens,
      domain_keywords: defaults.domain_keywords,
      max_sample_rows: defaults.max_sample_rows,
    }
  }
}

impl Settings {
  /// Load settings from the optional files and the process environment.
  pub fn load(config: Option<&Path>, credentials: Option<&Path>) -> anyhow::Result<Self> {
    Self::load_with_env(config, credentials, None)
  }

  /// Like [`Settings::load`], reading environment variables from `env`
  /// instead of the process when given.
  pub fn load_with_env(
    config: Option<&Path>,
    credentials: Option<&Path>,
    env: Option<HashMap<String, String>>,
  ) -> anyhow::Result<Self> {
    let mut builder = Config::builder();

    if let Some(path) = config {
      builder = builder.add_source(File::from(path).required(false));
    }

    if let Some(path) = credentials {
      let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials file {}", path.display()))?;
      builder = builder.add_source(File::from_str(
        &normalize_credentials(&text),
        FileFormat::Ini,
      ));
    }

    builder = builder.add_source(
      Environment::with_prefix("TALLY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(env),
    );

    builder
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn detector_config(&self) -> DetectorConfig {
    DetectorConfig {
      body_element:    self.detector.body_element.clone(),
      group_tokens:    self.detector.group_tokens.clone(),
      domain_keywords: self.detector.domain_keywords.clone(),
      max_depth:       self.processing.max_nesting_depth,
      max_sample_rows: self.detector.max_sample_rows,
    }
  }
}

// ─── Credentials ─────────────────────────────────────────────────────────────

/// Rewrite a credentials file as INI. Keys before any section header belong
/// to `[database]`; a line made only of `k=v` tokens is split into one key
/// per line; `name` is spelled `dbname`.
pub fn normalize_credentials(text: &str) -> String {
  let mut out = String::from("[database]\n");

  for line in text.lines().map(str::trim) {
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
      continue;
    }
    if line.starts_with('[') {
      out.push_str(line);
      out.push('\n');
      continue;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let pairs = if tokens.len() > 1 && tokens.iter().all(|t| t.contains('=')) {
      tokens
    } else {
      vec![line]
    };

    for pair in pairs {
      let Some((key, value)) = pair.split_once('=') else {
        continue;
      };
      let key = key.trim().to_lowercase();
      let key = if key == "name" { "dbname".to_owned() } else { key };
      out.push_str(&format!("{key}={}\n", value.trim()));
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[test]
  fn defaults_without_sources() {
    let settings = Settings::load_with_env(None, None, Some(HashMap::new())).unwrap();
    assert_eq!(settings.database.dbname, "irs990");
    assert_eq!(settings.database.sqlite_path(), PathBuf::from("irs990.sqlite3"));
    assert_eq!(settings.database.pool_size, 4);
    assert_eq!(settings.processing.workers, 4);
    assert!(settings.processing.replace_groups);
    assert!(!settings.processing.skip_existing);
    assert_eq!(settings.detector_config().max_depth, 3);
    assert_eq!(settings.detector.body_element, "ReturnData");
  }

  #[test]
  fn toml_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.toml");
    fs::write(
      &path,
      "[database]\npath = \"/var/lib/tally/filings.sqlite3\"\npool_size = 2\n\n\
       [processing]\nworkers = 8\nmax_nesting_depth = 2\n\n\
       [detector]\nbody_element = \"Body\"\n",
    )
    .unwrap();

    let settings = Settings::load_with_env(Some(&path), None, Some(HashMap::new())).unwrap();
    assert_eq!(
      settings.database.sqlite_path(),
      PathBuf::from("/var/lib/tally/filings.sqlite3")
    );
    assert_eq!(settings.database.store_options().pool_size, 2);
    assert_eq!(settings.processing.workers, 8);
    assert_eq!(settings.detector_config().max_depth, 2);
    assert_eq!(settings.detector_config().body_element, "Body");
    assert_eq!(settings.detector.group_tokens, ["Grp", "Group"]);
  }

  #[test]
  fn missing_config_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load_with_env(
      Some(&dir.path().join("absent.toml")),
      None,
      Some(HashMap::new()),
    )
    .unwrap();
    assert_eq!(settings.processing.workers, 4);
  }

  #[test]
  fn credentials_file_in_key_value_form() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.credentials");
    fs::write(
      &path,
      "# local database\nhost = localhost\nport=5432\nname=filings\nuser=etl\n\
       password=s3cret word\n\n[processing]\nworkers=2\n",
    )
    .unwrap();

    let settings = Settings::load_with_env(None, Some(&path), Some(HashMap::new())).unwrap();
    assert_eq!(settings.database.host.as_deref(), Some("localhost"));
    assert_eq!(settings.database.port, Some(5432));
    assert_eq!(settings.database.dbname, "filings");
    assert_eq!(settings.database.password.as_deref(), Some("s3cret word"));
    assert_eq!(settings.database.sqlite_path(), PathBuf::from("filings.sqlite3"));
    assert_eq!(settings.processing.workers, 2);
    assert!(settings.database.has_server_params());
    assert!(!format!("{:?}", settings.database).contains("s3cret"));
  }

  #[test]
  fn libpq_style_line_is_split() {
    let ini = normalize_credentials("host=db.internal port=5433 dbname=irs user=etl");
    assert_eq!(
      ini,
      "[database]\nhost=db.internal\nport=5433\ndbname=irs\nuser=etl\n"
    );
  }

  #[test]
  fn environment_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.toml");
    fs::write(&path, "[processing]\nworkers = 8\n").unwrap();

    let env = HashMap::from([
      ("TALLY_PROCESSING__WORKERS".to_owned(), "16".to_owned()),
      ("TALLY_PROCESSING__SKIP_EXISTING".to_owned(), "true".to_owned()),
      ("TALLY_DATABASE__PATH".to_owned(), "/tmp/env.sqlite3".to_owned()),
    ]);
    let settings = Settings::load_with_env(Some(&path), None, Some(env)).unwrap();
    assert_eq!(settings.processing.workers, 16);
    assert!(settings.processing.skip_existing);
    assert_eq!(settings.database.sqlite_path(), PathBuf::from("/tmp/env.sqlite3"));
  }
}
