//! Forensics and compliance evidence ledger for drone fleet incident
//! response.
//!
//! The ledger records every security-relevant action as an immutable
//! [`ForensicEvent`], derives compliance evidence for the regulatory controls
//! those actions satisfy, runs a reviewer workflow over that evidence, and
//! exports hash-sealed incident bundles for audit handoff.
//!
//! # Components
//!
//! - [`events`]: the append-only event store, including actor resolution
//! - [`controls`]: the static event type to control mapping
//! - [`evidence`]: the evidence registry and its review workflow
//! - [`summary`]: per-control evidence counts for compliance dashboards
//! - [`bundle`]: canonical, SHA-256 sealed incident exports
//! - [`directory`]: default `SQLite` incident and operator collaborators
//! - [`service`]: the [`ForensicsLedger`] facade taking an
//!   [`IdentityContext`] on every entry point
//!
//! # Example
//!
//! ```rust,no_run
//! use vigil_core::{ForensicsLedger, IdentityContext, NewEvent, Role};
//!
//! # fn example() -> Result<(), vigil_core::LedgerError> {
//! let ledger = ForensicsLedger::open("/var/lib/vigil/vigil.db")?;
//! let alice = IdentityContext::new("alice", Role::Admin, "t1");
//!
//! let event = ledger.record_event(
//!     &alice,
//!     NewEvent::new("operator_assigned").with_drone("UA-101"),
//! )?;
//! assert_eq!(event.actor.as_deref(), Some("alice"));
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod canonical;
pub mod config;
pub mod controls;
pub mod directory;
pub mod error;
pub mod events;
pub mod evidence;
pub mod identity;
pub mod query;
pub mod service;
pub mod store;
pub mod summary;
pub mod time;

pub use bundle::{BundleExporter, ExportBundle, GeneratedBy};
pub use config::{ConfigError, VigilConfig};
pub use controls::ControlRef;
pub use directory::{
    AssignmentOutcome, IncidentLookup, IncidentRecord, IncidentStatus, NewIncident,
    OperatorDirectory, SqliteDirectory,
};
pub use error::{ErrorKind, LedgerError};
pub use events::{EventQuery, EventStore, ForensicEvent, NewEvent};
pub use evidence::{
    EvidenceRecord, EvidenceRegistry, ManualEvidence, ReviewDecision, ReviewStatus,
};
pub use identity::{IdentityContext, IdentityError, IdentityProvider, Role, StaticIdentityProvider};
pub use query::{DateRange, EvidenceFilter, ListParams};
pub use service::ForensicsLedger;
pub use store::{LedgerStore, StoreStats};
pub use summary::{ControlCounts, EvidenceAggregator, EvidenceSummary, SummaryQuery, SummaryScope};
pub use time::{Clock, FixedClock, SystemClock};
