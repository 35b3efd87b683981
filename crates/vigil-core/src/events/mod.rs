//! Append-only forensic event store.
//!
//! [`EventStore::record`] is the single write path for events. It resolves
//! the acting identity, commits the event in its own transaction, and then
//! makes one synchronous, best-effort attempt to derive compliance evidence
//! for the event type. A derivation failure is logged and swallowed: the
//! event row stays committed and the caller sees success, because events are
//! the source of truth and evidence can be reconciled later from them.
//!
//! # Actor resolution
//!
//! When a [`NewEvent`] carries no actor, the store asks its
//! [`OperatorDirectory`] for, in order:
//!
//! 1. the operator currently attributed to the event's incident
//! 2. the most recently assigned operator of the event's drone
//!
//! and otherwise leaves the actor unset. The lookup runs in the same write
//! transaction as the insert. Callers holding an authenticated identity
//! always pass it explicitly, which bypasses the lookup.


use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::canonical::to_canonical_string;
use crate::controls::map_event_type;
use crate::directory::OperatorDirectory;
use crate::error::{LedgerError, non_empty, require};
use crate::evidence::EvidenceRegistry;
use crate::query::{WhereClause, bounded_limit};
use crate::store::LedgerStore;
use crate::time::{Clock, format_timestamp, normalize_timestamp};

/// Well-known event types emitted by the platform.
pub mod event_types {
    /// An operator was assigned to a drone.
    pub const OPERATOR_ASSIGNED: &str = "operator_assigned";
    /// An incident was opened.
    pub const INCIDENT_CREATED: &str = "incident_created";
    /// An incident was closed.
    pub const INCIDENT_CLOSED: &str = "incident_closed";
    /// A mitigation action ran against an incident.
    pub const MITIGATION_ACTION_EXECUTED: &str = "mitigation_action_executed";
    /// A training simulation was started.
    pub const SIMULATION_STARTED: &str = "simulation_started";
}

/// Default page size for [`EventStore::list`].
pub const DEFAULT_EVENT_LIMIT: u32 = 500;

/// Events included in an export bundle.
pub const MAX_EXPORT_EVENTS: u32 = 1000;

const EVENT_COLUMNS: &str =
    "id, ts, tenant_id, drone_id, incident_id, event_type, actor, action, result, payload_json";

/// An immutable audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForensicEvent {
    /// Store-assigned, monotonically increasing id.
    pub id: i64,
    /// Occurrence time in storage format.
    pub timestamp: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Correlated drone.
    pub drone_id: Option<String>,
    /// Correlated incident.
    pub incident_id: Option<String>,
    /// Event kind, see [`event_types`].
    pub event_type: String,
    /// Resolved acting identity.
    pub actor: Option<String>,
    /// Free-text description.
    pub action: Option<String>,
    /// Outcome, e.g. `ok` or `error`.
    pub result: Option<String>,
    /// Structured metadata, opaque to the store.
    pub payload: Option<Value>,
}

/// Input for [`EventStore::record`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEvent {
    /// Event kind (required).
    pub event_type: String,
    /// Correlated drone.
    pub drone_id: Option<String>,
    /// Correlated incident.
    pub incident_id: Option<String>,
    /// Explicit actor; bypasses actor resolution when present.
    pub actor: Option<String>,
    /// Free-text description.
    pub action: Option<String>,
    /// Outcome.
    pub result: Option<String>,
    /// Structured metadata.
    pub payload: Option<Value>,
    /// RFC 3339 occurrence time; "now" when absent.
    pub timestamp: Option<String>,
}

impl NewEvent {
    /// Starts an event of the given type.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    /// Correlates the event with a drone.
    #[must_use]
    pub fn with_drone(mut self, drone_id: impl Into<String>) -> Self {
        self.drone_id = Some(drone_id.into());
        self
    }

    /// Correlates the event with an incident.
    #[must_use]
    pub fn with_incident(mut self, incident_id: impl Into<String>) -> Self {
        self.incident_id = Some(incident_id.into());
        self
    }

    /// Sets an explicit actor.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Sets the action description.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Attaches structured metadata.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the occurrence time (RFC 3339, any offset).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Filters for [`EventStore::list`]. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Exact drone match.
    pub drone_id: Option<String>,
    /// Exact incident match.
    pub incident_id: Option<String>,
    /// Page size, `1..=500`, default [`DEFAULT_EVENT_LIMIT`].
    pub limit: Option<u32>,
}

impl EventQuery {
    /// Events correlated with one incident.
    #[must_use]
    pub fn for_incident(incident_id: impl Into<String>) -> Self {
        Self {
            incident_id: Some(incident_id.into()),
            ..Self::default()
        }
    }

    /// Events correlated with one drone.
    #[must_use]
    pub fn for_drone(drone_id: impl Into<String>) -> Self {
        Self {
            drone_id: Some(drone_id.into()),
            ..Self::default()
        }
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The append-only event table plus its evidence side effect.
#[derive(Debug, Clone)]
pub struct EventStore {
    store: LedgerStore,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn OperatorDirectory>,
    registry: EvidenceRegistry,
}

impl EventStore {
    /// Creates an event store deriving evidence into `registry`.
    #[must_use]
    pub fn new(
        store: LedgerStore,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn OperatorDirectory>,
        registry: EvidenceRegistry,
    ) -> Self {
        Self {
            store,
            clock,
            directory,
            registry,
        }
    }

    /// Records one event for `tenant_id`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the tenant or event type is blank, the
    ///   timestamp is not RFC 3339, or the payload nests too deeply
    /// - `StorageFailure` if the actor lookup or the event insert fails
    ///
    /// Evidence derivation failures are never returned.
    pub fn record(&self, tenant_id: &str, event: NewEvent) -> Result<ForensicEvent, LedgerError> {
        let tenant_id = require(tenant_id, "tenant_id")?.to_string();
        let event_type = require(&event.event_type, "event_type")?.to_string();
        let drone_id = non_empty(event.drone_id.as_deref()).map(str::to_string);
        let incident_id = non_empty(event.incident_id.as_deref()).map(str::to_string);

        let timestamp = match non_empty(event.timestamp.as_deref()) {
            Some(raw) => normalize_timestamp(raw)?,
            None => format_timestamp(self.clock.now()),
        };
        let payload_json = event
            .payload
            .as_ref()
            .map(to_canonical_string)
            .transpose()?;

        let explicit = non_empty(event.actor.as_deref()).map(str::to_string);

        let (id, actor) = self.store.write(|tx| {
            let actor = match explicit {
                Some(explicit) => Some(explicit),
                None => self.resolve_actor(
                    tx,
                    &tenant_id,
                    drone_id.as_deref(),
                    incident_id.as_deref(),
                )?,
            };
            tx.execute(
                "INSERT INTO forensic_events
                 (ts, tenant_id, drone_id, incident_id, event_type, actor, action, result, payload_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    timestamp,
                    tenant_id,
                    drone_id,
                    incident_id,
                    event_type,
                    actor,
                    event.action,
                    event.result,
                    payload_json,
                ],
            )?;
            Ok((tx.last_insert_rowid(), actor))
        })?;

        let recorded = ForensicEvent {
            id,
            timestamp,
            tenant_id,
            drone_id,
            incident_id,
            event_type,
            actor,
            action: event.action,
            result: event.result,
            payload: event.payload,
        };
        info!(
            tenant_id = %recorded.tenant_id,
            event_id = recorded.id,
            event_type = %recorded.event_type,
            actor = recorded.actor.as_deref().unwrap_or(""),
            "recorded forensic event"
        );

        self.derive_evidence(&recorded);
        Ok(recorded)
    }

    fn resolve_actor(
        &self,
        conn: &Connection,
        tenant_id: &str,
        drone_id: Option<&str>,
        incident_id: Option<&str>,
    ) -> Result<Option<String>, LedgerError> {
        if let Some(incident_id) = incident_id {
            let attributed = self
                .directory
                .operator_for_incident(conn, tenant_id, incident_id)?;
            if attributed.is_some() {
                return Ok(attributed);
            }
        }
        match drone_id {
            Some(drone_id) => self
                .directory
                .latest_operator_for_drone(conn, tenant_id, drone_id),
            None => Ok(None),
        }
    }

    fn derive_evidence(&self, event: &ForensicEvent) {
        let Some(control) = map_event_type(&event.event_type) else {
            return;
        };
        match self.registry.derive_from_event(event, control) {
            Ok(evidence) => debug!(
                event_id = event.id,
                evidence_id = evidence.id,
                control_id = control.control_id,
                "derived evidence"
            ),
            Err(e) => warn!(
                event_id = event.id,
                event_type = %event.event_type,
                error = %e,
                "evidence derivation failed; event kept"
            ),
        }
    }

    /// Lists events ascending by `(timestamp, id)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an out-of-range limit, or a storage
    /// error.
    pub fn list(&self, tenant_id: &str, query: &EventQuery) -> Result<Vec<ForensicEvent>, LedgerError> {
        let limit = bounded_limit(query.limit, DEFAULT_EVENT_LIMIT)?;
        self.select(tenant_id, query.drone_id.as_deref(), query.incident_id.as_deref(), limit)
    }

    /// Timeline of one incident for export, ignoring the drone correlation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn incident_timeline(
        &self,
        tenant_id: &str,
        incident_id: &str,
    ) -> Result<Vec<ForensicEvent>, LedgerError> {
        self.select(tenant_id, None, Some(incident_id), MAX_EXPORT_EVENTS)
    }

    fn select(
        &self,
        tenant_id: &str,
        drone_id: Option<&str>,
        incident_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ForensicEvent>, LedgerError> {
        let mut clause = WhereClause::new();
        clause.push("tenant_id = ?", require(tenant_id, "tenant_id")?.to_string());
        clause.push_opt("drone_id = ?", drone_id);
        clause.push_opt("incident_id = ?", incident_id);
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM forensic_events WHERE {} ORDER BY ts ASC, id ASC LIMIT ?",
            clause.sql()
        );
        let mut params = clause.into_params();
        params.push(SqlValue::Integer(i64::from(limit)));

        self.store.read(|tx| {
            let mut stmt = tx.prepare(&sql)?;
            let events = stmt
                .query_map(params_from_iter(params), event_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
    }

    /// Fetches one event within a tenant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no event has that id in the tenant.
    pub fn get(&self, tenant_id: &str, id: i64) -> Result<ForensicEvent, LedgerError> {
        let found = self.store.read(|tx| {
            tx.query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM forensic_events WHERE id = ?1 AND tenant_id = ?2"),
                params![id, tenant_id],
                event_from_row,
            )
            .optional()
            .map_err(LedgerError::from)
        })?;
        found.ok_or_else(|| LedgerError::not_found("event", id.to_string()))
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ForensicEvent> {
    let payload_json: Option<String> = row.get(9)?;
    Ok(ForensicEvent {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        tenant_id: row.get(2)?,
        drone_id: row.get(3)?,
        incident_id: row.get(4)?,
        event_type: row.get(5)?,
        actor: row.get(6)?,
        action: row.get(7)?,
        result: row.get(8)?,
        payload: payload_json.map(parse_payload),
    })
}

/// Stored payloads are canonical JSON; legacy text that does not parse is
/// surfaced verbatim as a string.
fn parse_payload(raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => Value::String(raw),
    }
}
