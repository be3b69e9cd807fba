//! SQL schema for the Tally SQLite store.
//!
//! Executed once when a store opens. `PRAGMA user_version` records the
//! schema revision.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organizations (
    ein           TEXT PRIMARY KEY,
    name          TEXT,
    address_line1 TEXT,
    address_line2 TEXT,
    city          TEXT,
    state         TEXT,
    zip           TEXT,
    country       TEXT,
    website       TEXT,
    updated_at    TEXT NOT NULL
);

-- filing_id = <ein>_<tax_period>_<form_type>
CREATE TABLE IF NOT EXISTS filings (
    filing_id           TEXT PRIMARY KEY,
    ein                 TEXT NOT NULL REFERENCES organizations(ein),
    tax_period          TEXT NOT NULL,
    form_type           TEXT NOT NULL,
    form_version        TEXT,
    tax_year            INTEGER,
    submission_date     TEXT,
    object_id           TEXT,
    xml_hash            TEXT,
    processed_timestamp TEXT NOT NULL
);

-- Keyed by name alone; group template names carry their table as a prefix.
CREATE TABLE IF NOT EXISTS field_definitions (
    field_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL UNIQUE,
    data_type    TEXT NOT NULL DEFAULT 'text',
    xpath        TEXT,
    table_name   TEXT,
    description  TEXT,
    is_repeating INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS filing_values (
    filing_id     TEXT    NOT NULL REFERENCES filings(filing_id) ON DELETE CASCADE,
    field_id      INTEGER NOT NULL REFERENCES field_definitions(field_id),
    value_text    TEXT,
    value_numeric REAL,
    value_boolean INTEGER,
    value_date    TEXT,
    PRIMARY KEY (filing_id, field_id),
    CHECK ((value_text    IS NOT NULL)
         + (value_numeric IS NOT NULL)
         + (value_boolean IS NOT NULL)
         + (value_date    IS NOT NULL) = 1)
);

CREATE TABLE IF NOT EXISTS repeating_groups (
    group_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id       TEXT    NOT NULL REFERENCES filings(filing_id) ON DELETE CASCADE,
    parent_group_id INTEGER REFERENCES repeating_groups(group_id) ON DELETE CASCADE,
    name            TEXT    NOT NULL,
    table_name      TEXT    NOT NULL,
    xpath           TEXT    NOT NULL,
    nesting_level   INTEGER NOT NULL DEFAULT 0,
    row_count       INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS repeating_group_values (
    group_id       INTEGER NOT NULL REFERENCES repeating_groups(group_id) ON DELETE CASCADE,
    field_id       INTEGER NOT NULL REFERENCES field_definitions(field_id),
    instance_index INTEGER NOT NULL,
    value_text     TEXT,
    value_numeric  REAL,
    value_boolean  INTEGER,
    value_date     TEXT,
    PRIMARY KEY (group_id, field_id, instance_index),
    CHECK ((value_text    IS NOT NULL)
         + (value_numeric IS NOT NULL)
         + (value_boolean IS NOT NULL)
         + (value_date    IS NOT NULL) = 1)
);

CREATE INDEX IF NOT EXISTS filings_ein_idx          ON filings(ein);
CREATE INDEX IF NOT EXISTS filing_values_field_idx  ON filing_values(field_id);
CREATE INDEX IF NOT EXISTS groups_filing_idx        ON repeating_groups(filing_id);
CREATE INDEX IF NOT EXISTS groups_parent_idx        ON repeating_groups(parent_group_id);
CREATE INDEX IF NOT EXISTS group_values_field_idx   ON repeating_group_values(field_id);

PRAGMA user_version = 1;
";

/// Per-connection settings. `foreign_keys` is not persisted by SQLite, so
/// every pooled connection runs this.
pub const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// Tables in child-first order, for truncation.
pub const TABLES: &[&str] = &[
  "repeating_group_values",
  "repeating_groups",
  "filing_values",
  "field_definitions",
  "filings",
  "organizations",
];
