//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - posts(id, total, pages, page, lim, previous, current, next)
//! - items(seq, envelope_id, item_id, owner_id, title, body)
//! - ingest_lease(id, holder, acquired_at)

pub mod schema;
pub mod sqlite;

pub use sqlite::{DbStats, DeleteSummary, IngestLease, SqliteStore};
