//! SQLite storage implementation

use std::path::Path;
use std::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use serde::Serialize;
use crate::{Error, Result};
use crate::page::{Envelope, Item};
use super::schema;

const ENVELOPE_COLUMNS: &str = "id, total, pages, page, lim, previous, current, next";
const ITEM_COLUMNS: &str = "envelope_id, item_id, owner_id, title, body";

/// Another process may hold the write lock briefly
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A lease older than this is assumed to belong to a crashed run
pub const STALE_LEASE_SECS: i64 = 30 * 60;

/// SQLite-backed storage for envelopes and their items.
///
/// The connection sits behind a mutex so one store can be shared across
/// request handlers through an `Arc`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave the connection itself unusable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn();
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Drop and recreate both tables.
    ///
    /// Destructive: only call this at the start of a full re-ingestion.
    pub fn reset_schema(&self) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for stmt in schema::DROP_TABLES {
            tx.execute(stmt, [])?;
        }
        for stmt in schema::all_schema_statements() {
            tx.execute(stmt, [])?;
        }
        tx.commit()?;
        tracing::debug!("schema reset");
        Ok(())
    }

    /// Take the ingest lease, failing fast if a live run holds it.
    pub fn acquire_ingest_lease(self: &Arc<Self>, holder: &str) -> Result<IngestLease> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM ingest_lease WHERE acquired_at < strftime('%s', 'now') - ?1",
            [STALE_LEASE_SECS],
        )?;

        let inserted = tx.execute(
            "INSERT INTO ingest_lease (id, holder, acquired_at) VALUES (1, ?1, strftime('%s', 'now'))",
            [holder],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                let current: Option<String> = tx
                    .query_row("SELECT holder FROM ingest_lease WHERE id = 1", [], |row| row.get(0))
                    .optional()?;
                return Err(Error::IngestInProgress {
                    holder: current.unwrap_or_default(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;
        drop(conn);

        tracing::debug!(holder, "ingest lease acquired");
        Ok(IngestLease { store: Arc::clone(self) })
    }

    // ========== Write Operations ==========

    pub fn insert_envelope(&self, envelope: &Envelope) -> Result<()> {
        write_envelope(&self.conn(), envelope)
    }

    pub fn insert_item(&self, item: &Item) -> Result<()> {
        write_item(&self.conn(), item)
    }

    /// Insert an envelope and all of its items atomically.
    ///
    /// Either every row lands or none do.
    pub fn insert_page(&self, envelope: &Envelope, items: &[Item]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        write_envelope(&tx, envelope)?;
        for item in items {
            write_item(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ========== Range Reads ==========

    /// Envelopes with `left <= id <= right`, ordered by id
    pub fn query_envelopes(&self, left: i64, right: i64) -> Result<Vec<Envelope>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENVELOPE_COLUMNS} FROM posts WHERE id BETWEEN ?1 AND ?2 ORDER BY id"
        ))?;

        let envelopes = stmt
            .query_map(params![left, right], row_to_envelope)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(envelopes)
    }

    /// Items whose envelope id lies in `[left, right]`, grouped by envelope
    /// and in insertion order within each envelope
    pub fn query_items(&self, left: i64, right: i64) -> Result<Vec<Item>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE envelope_id BETWEEN ?1 AND ?2 ORDER BY envelope_id, seq"
        ))?;

        let items = stmt
            .query_map(params![left, right], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    // ========== Delete Operations ==========

    /// Returns the number of rows removed (0 or 1)
    pub fn delete_envelope(&self, id: i64) -> Result<usize> {
        Ok(self.conn().execute("DELETE FROM posts WHERE id = ?1", [id])?)
    }

    pub fn delete_items(&self, envelope_id: i64) -> Result<usize> {
        Ok(self.conn().execute("DELETE FROM items WHERE envelope_id = ?1", [envelope_id])?)
    }

    /// Remove an envelope and its items in one transaction.
    pub fn delete_page(&self, id: i64) -> Result<DeleteSummary> {
        let mut conn = self.conn();
        let tx: Transaction<'_> = conn.transaction()?;
        let envelopes = tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
        let items = tx.execute("DELETE FROM items WHERE envelope_id = ?1", [id])?;
        tx.commit()?;
        Ok(DeleteSummary { envelopes, items })
    }

    // ========== Inspection ==========

    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.conn();
        let envelopes: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        let items: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(DbStats {
            envelopes: envelopes as usize,
            items: items as usize,
        })
    }

    /// Envelope ids referenced by item rows that have no matching envelope.
    ///
    /// Empty means both tables agree.
    pub fn orphaned_items(&self) -> Result<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT envelope_id FROM items
             WHERE envelope_id NOT IN (SELECT id FROM posts)
             ORDER BY envelope_id",
        )?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        Ok(ids)
    }

    /// Run store work on tokio's blocking pool.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }
}

fn write_envelope(conn: &Connection, envelope: &Envelope) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO posts ({ENVELOPE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            envelope.id,
            envelope.total,
            envelope.page_count,
            envelope.page,
            envelope.limit,
            envelope.previous_link,
            envelope.current_link,
            envelope.next_link,
        ],
    )?;
    Ok(())
}

fn write_item(conn: &Connection, item: &Item) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO items ({ITEM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
        params![item.envelope_id, item.item_id, item.owner_id, item.title, item.body],
    )?;
    Ok(())
}

fn row_to_envelope(row: &rusqlite::Row) -> rusqlite::Result<Envelope> {
    Ok(Envelope {
        id: row.get(0)?,
        total: row.get(1)?,
        page_count: row.get(2)?,
        page: row.get(3)?,
        limit: row.get(4)?,
        previous_link: row.get(5)?,
        current_link: row.get(6)?,
        next_link: row.get(7)?,
    })
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    Ok(Item {
        envelope_id: row.get(0)?,
        item_id: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
    })
}

/// Rows removed by [`SqliteStore::delete_page`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub envelopes: usize,
    pub items: usize,
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub envelopes: usize,
    pub items: usize,
}

/// Exclusive right to run an ingestion against one database.
///
/// Backed by a row in `ingest_lease`, so it also excludes other processes
/// using the same file. Released on drop.
pub struct IngestLease {
    store: Arc<SqliteStore>,
}

impl Drop for IngestLease {
    fn drop(&mut self) {
        if let Err(e) = self.store.conn().execute("DELETE FROM ingest_lease WHERE id = 1", []) {
            tracing::warn!(error = %e, "failed to release ingest lease");
        }
    }
}
