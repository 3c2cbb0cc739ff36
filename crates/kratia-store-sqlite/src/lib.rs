//! SQLite backend for the Kratia ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every transaction is opened with
//! `BEGIN IMMEDIATE`, so conflicting writers are serialised by SQLite's
//! write lock instead of failing at commit.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
