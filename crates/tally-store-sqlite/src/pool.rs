//! The `r2d2` connection pool behind [`SqliteStore`](crate::SqliteStore).
//!
//! Every connection the pool opens runs the per-connection pragmas before it
//! is handed out. Checkouts block, so callers run them on the blocking
//! thread pool (see [`run`]).

use std::{path::Path, time::Duration};

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::{Result, schema::CONNECTION_PRAGMAS};

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Build a pool of `size` connections to the database file at `path`.
pub fn file_pool(path: &Path, size: u32, busy_timeout: Duration) -> Result<Pool> {
  let manager = SqliteConnectionManager::file(path);
  build(manager, size.max(1), busy_timeout)
}

/// Build a single-connection pool over a private in-memory database.
///
/// Separate `:memory:` connections never share data, so the pool holds
/// exactly one connection and never retires it.
pub fn memory_pool(busy_timeout: Duration) -> Result<Pool> {
  build(SqliteConnectionManager::memory(), 1, busy_timeout)
}

fn build(manager: SqliteConnectionManager, size: u32, busy_timeout: Duration) -> Result<Pool> {
  let manager = manager.with_init(move |conn| {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(CONNECTION_PRAGMAS)
  });

  let pool = r2d2::Pool::builder()
    .max_size(size)
    .min_idle(Some(size))
    .idle_timeout(None)
    .max_lifetime(None)
    .build(manager)?;
  Ok(pool)
}

/// Check a connection out of `pool` and run `f` with it on the blocking
/// thread pool. The connection returns to the pool when `f` finishes,
/// whether it succeeded or not.
pub async fn run<F, T>(pool: &Pool, f: F) -> Result<T>
where
  F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  T: Send + 'static,
{
  let pool = pool.clone();
  tokio::task::spawn_blocking(move || {
    let mut conn = pool.get()?;
    f(&mut *conn)
  })
  .await?
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn connections_carry_the_session_pragmas() {
    let pool = memory_pool(Duration::from_millis(1234)).unwrap();
    let conn = pool.get().unwrap();
    let foreign_keys: i64 = conn
      .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
      .unwrap();
    let busy: i64 = conn
      .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
      .unwrap();
    assert_eq!(foreign_keys, 1);
    assert_eq!(busy, 1234);
  }

  #[test]
  fn checkout_is_bounded_and_released_on_drop() {
    let pool = memory_pool(Duration::from_millis(100)).unwrap();
    assert_eq!(pool.max_size(), 1);

    let first = pool.get().unwrap();
    assert!(pool.get_timeout(Duration::from_millis(50)).is_err());

    drop(first);
    assert_eq!(pool.state().idle_connections, 1);
    assert!(pool.get_timeout(Duration::from_secs(1)).is_ok());
  }

  #[tokio::test]
  async fn connection_returns_after_failed_work() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir.path().join("pool.sqlite3"), 2, Duration::from_secs(1)).unwrap();

    let failed = run(&pool, |conn| {
      conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
      Ok(())
    })
    .await;
    assert!(failed.is_err());
    assert_eq!(pool.state().idle_connections, 2);
  }

  #[tokio::test]
  async fn memory_pool_keeps_its_data_between_checkouts() {
    let pool = memory_pool(Duration::from_millis(100)).unwrap();
    run(&pool, |conn| {
      conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")?;
      Ok(())
    })
    .await
    .unwrap();

    let x: i64 = run(&pool, |conn| Ok(conn.query_row("SELECT x FROM t", [], |r| r.get(0))?))
      .await
      .unwrap();
    assert_eq!(x, 7);
  }
}
