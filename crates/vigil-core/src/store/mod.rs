//! Shared `SQLite` storage for the ledger.
//!
//! One database holds every ledger table: the append-only
//! `forensic_events`, the `evidence` registry, and the `incidents` and
//! `operator_assignments` tables behind the default collaborators. The
//! connection is opened once in WAL mode and shared behind a mutex; every
//! logical operation runs inside its own transaction.
//!
//! # Example
//!
//! ```rust,no_run
//! use vigil_core::store::LedgerStore;
//!
//! # fn example() -> Result<(), vigil_core::LedgerError> {
//! let store = LedgerStore::open("/path/to/vigil.db")?;
//! let stats = store.stats()?;
//! println!("{} events, {} evidence records", stats.event_count, stats.evidence_count);
//! # Ok(())
//! # }
//! ```

mod sqlite;


pub use sqlite::{DEFAULT_BUSY_TIMEOUT, LedgerStore, StoreStats};
