//! `SQLite`-backed store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::debug;

use crate::error::LedgerError;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Busy timeout applied when another process holds the write lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Row counts for operational visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Total forensic events.
    pub event_count: u64,
    /// Total evidence records.
    pub evidence_count: u64,
    /// Highest event id (0 if empty).
    pub max_event_id: i64,
    /// Total incidents.
    pub incident_count: u64,
}

/// Handle to the ledger database.
///
/// Cloning is cheap and every clone shares the same connection, so the event
/// store, evidence registry, aggregator and directory all serialize on one
/// mutex and observe each other's committed writes.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl LedgerStore {
    /// Opens or creates the database at `path` with the default busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens or creates the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or the schema cannot be applied.
    pub fn open_with_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::initialize_connection(&conn, busy_timeout)?;

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened ledger store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_connection(&conn, DEFAULT_BUSY_TIMEOUT)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    fn initialize_connection(conn: &Connection, busy_timeout: Duration) -> Result<(), LedgerError> {
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Path of the backing file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Runs `f` inside an immediate write transaction.
    ///
    /// The transaction commits only if `f` succeeds; any error rolls it back
    /// when the transaction is dropped.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Runs `f` inside a deferred transaction so multi-statement reads see
    /// one snapshot.
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Gathers row counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the counts cannot be queried.
    #[allow(clippy::cast_sign_loss)]
    pub fn stats(&self) -> Result<StoreStats, LedgerError> {
        self.read(|tx| {
            let event_count: i64 =
                tx.query_row("SELECT COUNT(*) FROM forensic_events", [], |row| row.get(0))?;
            let evidence_count: i64 =
                tx.query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))?;
            let max_event_id: Option<i64> =
                tx.query_row("SELECT MAX(id) FROM forensic_events", [], |row| row.get(0))?;
            let incident_count: i64 =
                tx.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))?;

            Ok(StoreStats {
                event_count: event_count as u64,
                evidence_count: evidence_count as u64,
                max_event_id: max_event_id.unwrap_or(0),
                incident_count: incident_count as u64,
            })
        })
    }

    /// Reports whether the connection runs in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal mode cannot be queried.
    pub fn verify_wal_mode(&self) -> Result<bool, LedgerError> {
        let conn = self.lock()?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }
}
