//! SQLite backend for the Tally EAV store.
//!
//! Connections come from an `r2d2` pool, and every database call runs on
//! tokio's blocking thread pool so the async runtime never waits on SQLite.
//! Each document is loaded in one transaction.

mod encode;
mod load;
mod pool;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use load::GroupIdMap;
pub use pool::{Pool, PooledConnection};
pub use schema::SCHEMA;
pub use store::{SqliteStore, StoreOptions};
