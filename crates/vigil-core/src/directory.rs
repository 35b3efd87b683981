//! Incident and operator collaborators.
//!
//! The ledger consumes incidents and operator assignments through the
//! [`IncidentLookup`] and [`OperatorDirectory`] traits. [`SqliteDirectory`]
//! is the default implementation, sharing the ledger database.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{LedgerError, non_empty, require};
use crate::store::LedgerStore;
use crate::time::{Clock, format_timestamp};

const INCIDENT_COLUMNS: &str = "incident_id, tenant_id, drone_id, threat_type, severity, title, \
     status, training, operator, created_at, updated_at, details, mitigated_action, \
     mitigated_at, closed_at";

/// Resolves incidents by id.
pub trait IncidentLookup: Send + Sync + fmt::Debug {
    /// Returns the incident regardless of tenant; callers compare
    /// `tenant_id` themselves.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    fn get_incident(&self, incident_id: &str) -> Result<Option<IncidentRecord>, LedgerError>;
}

/// Answers "who is operating this" for actor resolution.
///
/// Lookups run on `conn`, the caller's open transaction, so the answer and
/// the event write that uses it commit as one unit.
pub trait OperatorDirectory: Send + Sync + fmt::Debug {
    /// Operator currently attributed to an incident: the incident's
    /// `operator`, else the latest assignment made for the incident.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    fn operator_for_incident(
        &self,
        conn: &Connection,
        tenant_id: &str,
        incident_id: &str,
    ) -> Result<Option<String>, LedgerError>;

    /// Most recently assigned operator of a drone, ties broken by row id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    fn latest_operator_for_drone(
        &self,
        conn: &Connection,
        tenant_id: &str,
        drone_id: &str,
    ) -> Result<Option<String>, LedgerError>;
}

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// Open and unmitigated.
    Active,
    /// A mitigation action has executed.
    Mitigated,
    /// Resolved.
    Closed,
}

impl IncidentStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Mitigated => "mitigated",
            Self::Closed => "closed",
        }
    }

    /// Parses a status name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown names.
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "mitigated" => Ok(Self::Mitigated),
            "closed" => Ok(Self::Closed),
            _ => Err(LedgerError::invalid(
                "status",
                format!("'{raw}' must be active, mitigated or closed"),
            )),
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for IncidentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for IncidentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Self::parse(raw).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Snapshot of an incident row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentRecord {
    /// Server-generated `INC-<12 hex>` id.
    pub incident_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Affected drone, if any.
    pub drone_id: Option<String>,
    /// Threat classification, e.g. `gps_spoof`.
    pub threat_type: String,
    /// Severity label, e.g. `high`.
    pub severity: String,
    /// Human-readable title.
    pub title: String,
    /// Lifecycle state.
    pub status: IncidentStatus,
    /// Raised by a training simulation rather than live telemetry.
    pub training: bool,
    /// Operator attributed when the incident was opened or last assigned.
    pub operator: Option<String>,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
    /// Last modification time, RFC 3339 UTC.
    pub updated_at: String,
    /// Free-form details.
    pub details: Option<String>,
    /// Mitigation action last executed.
    pub mitigated_action: Option<String>,
    /// When the incident was mitigated.
    pub mitigated_at: Option<String>,
    /// When the incident was closed.
    pub closed_at: Option<String>,
}

/// Input for [`SqliteDirectory::open_incident`].
///
/// Incident ids are always generated by the directory, never chosen by the
/// caller, so an id reveals nothing about other tenants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIncident {
    fixed_id: Option<String>,
    /// Affected drone.
    pub drone_id: Option<String>,
    /// Threat classification.
    pub threat_type: String,
    /// Severity label.
    pub severity: String,
    /// Human-readable title.
    pub title: String,
    /// Training simulation (the default) or live incident.
    pub training: bool,
    /// Free-form details.
    pub details: Option<String>,
    /// Attributed operator; defaults to the drone's latest assignment.
    pub operator: Option<String>,
}

impl NewIncident {
    /// Starts a training incident.
    #[must_use]
    pub fn new(
        threat_type: impl Into<String>,
        severity: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            fixed_id: None,
            drone_id: None,
            threat_type: threat_type.into(),
            severity: severity.into(),
            title: title.into(),
            training: true,
            details: None,
            operator: None,
        }
    }

    /// Pins the id so unit tests can refer to it.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_id(mut self, incident_id: impl Into<String>) -> Self {
        self.fixed_id = Some(incident_id.into());
        self
    }

    /// Sets the affected drone.
    #[must_use]
    pub fn with_drone(mut self, drone_id: impl Into<String>) -> Self {
        self.drone_id = Some(drone_id.into());
        self
    }

    /// Attributes an operator instead of the drone's latest assignment.
    #[must_use]
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Sets free-form details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Marks the incident as live rather than training.
    #[must_use]
    pub const fn live(mut self) -> Self {
        self.training = false;
        self
    }
}

/// Result of [`SqliteDirectory::assign_operator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// A new assignment row was written.
    Assigned {
        /// Operator being replaced: the named incident's attributed operator
        /// when that changed, else the drone's latest operator.
        previous: Option<String>,
    },
    /// The drone's latest operator, and the named incident's operator if
    /// any, already matched; nothing was written.
    Unchanged,
}

impl AssignmentOutcome {
    /// Whether the assignment changed state.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }
}

/// `SQLite` incident table and operator assignment log.
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    store: LedgerStore,
    clock: Arc<dyn Clock>,
}

impl SqliteDirectory {
    /// Creates a directory over the shared ledger database.
    #[must_use]
    pub fn new(store: LedgerStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Opens an incident in status `active` under a generated id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for blank required fields, or a storage
    /// error.
    pub fn open_incident(
        &self,
        tenant_id: &str,
        incident: NewIncident,
    ) -> Result<IncidentRecord, LedgerError> {
        let tenant_id = require(tenant_id, "tenant_id")?;
        let threat_type = require(&incident.threat_type, "threat_type")?;
        let severity = require(&incident.severity, "severity")?;
        let title = require(&incident.title, "title")?;
        let drone_id = non_empty(incident.drone_id.as_deref());
        let now = self.clock.now();
        let created_at = format_timestamp(now);
        let incident_id = match non_empty(incident.fixed_id.as_deref()) {
            Some(id) => id.to_string(),
            None => generate_incident_id(tenant_id, &created_at),
        };

        let record = self.store.write(|tx| {
            let operator = match non_empty(incident.operator.as_deref()) {
                Some(explicit) => Some(explicit.to_string()),
                None => match drone_id {
                    Some(drone_id) => latest_for_drone(tx, tenant_id, drone_id)?,
                    None => None,
                },
            };
            tx.execute(
                "INSERT INTO incidents
                 (incident_id, tenant_id, drone_id, threat_type, severity, title, status,
                  training, operator, created_at, updated_at, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?11)",
                params![
                    incident_id,
                    tenant_id,
                    drone_id,
                    threat_type,
                    severity,
                    title,
                    IncidentStatus::Active,
                    incident.training,
                    operator,
                    created_at,
                    incident.details,
                ],
            )?;
            select_incident(tx, tenant_id, &incident_id)?
                .ok_or_else(|| LedgerError::not_found("incident", incident_id.clone()))
        })?;

        info!(
            tenant_id = %record.tenant_id,
            incident_id = %record.incident_id,
            operator = record.operator.as_deref().unwrap_or(""),
            "opened incident"
        );
        Ok(record)
    }

    /// Active incidents of a tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn list_active_incidents(
        &self,
        tenant_id: &str,
        drone_id: Option<&str>,
    ) -> Result<Vec<IncidentRecord>, LedgerError> {
        let drone_id = non_empty(drone_id);
        self.store.read(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents
                 WHERE tenant_id = ?1 AND status = 'active'
                   AND (?2 IS NULL OR drone_id = ?2)
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let incidents = stmt
                .query_map(params![tenant_id, drone_id], incident_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(incidents)
        })
    }

    /// Moves an incident to `status`, stamping `mitigated_at` or
    /// `closed_at`. Absent `mitigated_action` and `details` keep their
    /// previous values.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` unless the incident exists in `tenant_id`.
    pub fn update_incident_status(
        &self,
        tenant_id: &str,
        incident_id: &str,
        status: IncidentStatus,
        mitigated_action: Option<&str>,
        details: Option<&str>,
    ) -> Result<IncidentRecord, LedgerError> {
        let now = format_timestamp(self.clock.now());
        let record = self.store.write(|tx| {
            let changed = tx.execute(
                "UPDATE incidents
                 SET status = ?1,
                     updated_at = ?2,
                     mitigated_action = COALESCE(?3, mitigated_action),
                     details = COALESCE(?4, details),
                     mitigated_at = CASE WHEN ?1 = 'mitigated' THEN ?2 ELSE mitigated_at END,
                     closed_at = CASE WHEN ?1 = 'closed' THEN ?2 ELSE closed_at END
                 WHERE incident_id = ?5 AND tenant_id = ?6",
                params![status, now, mitigated_action, details, incident_id, tenant_id],
            )?;
            if changed == 0 {
                return Err(LedgerError::not_found("incident", incident_id));
            }
            select_incident(tx, tenant_id, incident_id)?
                .ok_or_else(|| LedgerError::not_found("incident", incident_id))
        })?;

        info!(
            tenant_id,
            incident_id,
            status = %status,
            "updated incident status"
        );
        Ok(record)
    }

    /// Assigns `operator` to a drone, optionally on behalf of an incident.
    ///
    /// When an incident is named, its attributed operator is updated too,
    /// even if the drone already had `operator`. Returns
    /// [`AssignmentOutcome::Unchanged`] without writing only when neither
    /// the drone nor the named incident would change.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank tenant, drone or operator, or a
    /// storage error.
    pub fn assign_operator(
        &self,
        tenant_id: &str,
        drone_id: &str,
        incident_id: Option<&str>,
        operator: &str,
        assigned_by: Option<&str>,
    ) -> Result<AssignmentOutcome, LedgerError> {
        let tenant_id = require(tenant_id, "tenant_id")?;
        let drone_id = require(drone_id, "drone_id")?;
        let operator = require(operator, "operator")?;
        let incident_id = non_empty(incident_id);
        let now = format_timestamp(self.clock.now());

        let outcome = self.store.write(|tx| {
            let drone_previous = latest_for_drone(tx, tenant_id, drone_id)?;
            let incident_previous = match incident_id {
                Some(incident_id) => Some(attributed_operator(tx, tenant_id, incident_id)?),
                None => None,
            };
            let drone_unchanged = drone_previous.as_deref() == Some(operator);
            let incident_unchanged = incident_previous
                .as_ref()
                .is_none_or(|current| current.as_deref() == Some(operator));
            if drone_unchanged && incident_unchanged {
                return Ok(AssignmentOutcome::Unchanged);
            }
            let previous = if incident_unchanged {
                drone_previous
            } else {
                incident_previous.flatten()
            };
            tx.execute(
                "INSERT INTO operator_assignments
                 (tenant_id, drone_id, incident_id, operator, assigned_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![tenant_id, drone_id, incident_id, operator, assigned_by, now],
            )?;
            if let Some(incident_id) = incident_id {
                tx.execute(
                    "UPDATE incidents SET operator = ?1, updated_at = ?2
                     WHERE incident_id = ?3 AND tenant_id = ?4",
                    params![operator, now, incident_id, tenant_id],
                )?;
            }
            Ok(AssignmentOutcome::Assigned { previous })
        })?;

        if outcome.changed() {
            info!(tenant_id, drone_id, operator, "assigned operator");
        }
        Ok(outcome)
    }
}

impl IncidentLookup for SqliteDirectory {
    fn get_incident(&self, incident_id: &str) -> Result<Option<IncidentRecord>, LedgerError> {
        self.store.read(|tx| {
            tx.query_row(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE incident_id = ?1"),
                params![incident_id],
                incident_from_row,
            )
            .optional()
            .map_err(LedgerError::from)
        })
    }
}

impl OperatorDirectory for SqliteDirectory {
    fn operator_for_incident(
        &self,
        conn: &Connection,
        tenant_id: &str,
        incident_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        if let Some(operator) = attributed_operator(conn, tenant_id, incident_id)? {
            return Ok(Some(operator));
        }
        conn.query_row(
            "SELECT operator FROM operator_assignments
             WHERE tenant_id = ?1 AND incident_id = ?2 AND operator != ''
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            params![tenant_id, incident_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(LedgerError::from)
    }

    fn latest_operator_for_drone(
        &self,
        conn: &Connection,
        tenant_id: &str,
        drone_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        latest_for_drone(conn, tenant_id, drone_id)
    }
}

/// `incidents.operator`, ignoring blanks.
fn attributed_operator(
    conn: &Connection,
    tenant_id: &str,
    incident_id: &str,
) -> Result<Option<String>, LedgerError> {
    let attributed: Option<Option<String>> = conn
        .query_row(
            "SELECT operator FROM incidents WHERE incident_id = ?1 AND tenant_id = ?2",
            params![incident_id, tenant_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(attributed.flatten().filter(|op| !op.trim().is_empty()))
}

fn latest_for_drone(
    conn: &Connection,
    tenant_id: &str,
    drone_id: &str,
) -> Result<Option<String>, LedgerError> {
    conn.query_row(
        "SELECT operator FROM operator_assignments
         WHERE tenant_id = ?1 AND drone_id = ?2 AND operator != ''
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
        params![tenant_id, drone_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(LedgerError::from)
}

fn select_incident(
    conn: &Connection,
    tenant_id: &str,
    incident_id: &str,
) -> Result<Option<IncidentRecord>, LedgerError> {
    conn.query_row(
        &format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE incident_id = ?1 AND tenant_id = ?2"
        ),
        params![incident_id, tenant_id],
        incident_from_row,
    )
    .optional()
    .map_err(LedgerError::from)
}

fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<IncidentRecord> {
    Ok(IncidentRecord {
        incident_id: row.get(0)?,
        tenant_id: row.get(1)?,
        drone_id: row.get(2)?,
        threat_type: row.get(3)?,
        severity: row.get(4)?,
        title: row.get(5)?,
        status: row.get(6)?,
        training: row.get(7)?,
        operator: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        details: row.get(11)?,
        mitigated_action: row.get(12)?,
        mitigated_at: row.get(13)?,
        closed_at: row.get(14)?,
    })
}

static INCIDENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// `INC-` followed by 12 hex characters, unique within the process.
fn generate_incident_id(tenant_id: &str, created_at: &str) -> String {
    let seq = INCIDENT_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(created_at.as_bytes());
    hasher.update(seq.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let digest = hasher.finalize();
    format!("INC-{}", &hex::encode(digest)[..12])
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::error::ErrorKind;
    use crate::time::FixedClock;

    fn directory() -> (SqliteDirectory, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store = LedgerStore::in_memory().unwrap();
        (SqliteDirectory::new(store, clock.clone()), clock)
    }

    fn latest(dir: &SqliteDirectory, tenant: &str, drone: &str) -> Option<String> {
        dir.store
            .read(|tx| dir.latest_operator_for_drone(tx, tenant, drone))
            .unwrap()
    }

    fn for_incident(dir: &SqliteDirectory, tenant: &str, incident: &str) -> Option<String> {
        dir.store
            .read(|tx| dir.operator_for_incident(tx, tenant, incident))
            .unwrap()
    }

    #[test]
    fn test_assign_operator_unchanged() {
        let (dir, _clock) = directory();
        assert_eq!(
            dir.assign_operator("t1", "UA-1", None, "alice", Some("root")).unwrap(),
            AssignmentOutcome::Assigned { previous: None }
        );
        assert_eq!(
            dir.assign_operator("t1", "UA-1", None, "alice", Some("root")).unwrap(),
            AssignmentOutcome::Unchanged
        );
        assert_eq!(
            dir.assign_operator("t1", "UA-1", None, "bob", Some("root")).unwrap(),
            AssignmentOutcome::Assigned {
                previous: Some("alice".to_string())
            }
        );
    }

    #[test]
    fn test_latest_operator_tie_broken_by_id() {
        let (dir, _clock) = directory();
        dir.assign_operator("t1", "UA-1", None, "alice", None).unwrap();
        dir.assign_operator("t1", "UA-1", None, "bob", None).unwrap();

        // Same created_at: the later row wins.
        assert_eq!(latest(&dir, "t1", "UA-1").as_deref(), Some("bob"));
        assert_eq!(latest(&dir, "t2", "UA-1"), None);
        assert_eq!(latest(&dir, "t1", "UA-9"), None);
    }

    #[test]
    fn test_latest_operator_prefers_newer_timestamp() {
        let (dir, clock) = directory();
        dir.assign_operator("t1", "UA-1", None, "alice", None).unwrap();
        clock.advance(TimeDelta::minutes(5));
        dir.assign_operator("t1", "UA-1", None, "carol", None).unwrap();
        assert_eq!(latest(&dir, "t1", "UA-1").as_deref(), Some("carol"));
    }

    #[test]
    fn test_open_incident_defaults_operator_from_drone() {
        let (dir, _clock) = directory();
        dir.assign_operator("t1", "UA-1", None, "alice", None).unwrap();

        let incident = dir
            .open_incident(
                "t1",
                NewIncident::new("gps_spoof", "high", "Gps Spoof").with_drone("UA-1"),
            )
            .unwrap();
        assert!(incident.incident_id.starts_with("INC-"));
        assert_eq!(incident.incident_id.len(), 16);
        assert_eq!(incident.status, IncidentStatus::Active);
        assert!(incident.training);
        assert_eq!(incident.operator.as_deref(), Some("alice"));
        assert_eq!(
            for_incident(&dir, "t1", &incident.incident_id).as_deref(),
            Some("alice")
        );
        assert_eq!(for_incident(&dir, "t2", &incident.incident_id), None);
    }

    #[test]
    fn test_incident_operator_falls_back_to_incident_assignments() {
        let (dir, clock) = directory();
        // An incident tracked elsewhere has no row here, only assignments.
        dir.assign_operator("t1", "UA-1", Some("EXT-9"), "dave", Some("root"))
            .unwrap();
        clock.advance(TimeDelta::seconds(1));
        dir.assign_operator("t1", "UA-2", Some("EXT-9"), "erin", Some("root"))
            .unwrap();
        dir.assign_operator("t1", "UA-1", None, "frank", Some("root"))
            .unwrap();

        assert_eq!(for_incident(&dir, "t1", "EXT-9").as_deref(), Some("erin"));
        assert_eq!(for_incident(&dir, "t2", "EXT-9"), None);
        assert_eq!(for_incident(&dir, "t1", "EXT-404"), None);
    }

    #[test]
    fn test_incident_assignment_replaces_stale_operator() {
        let (dir, _clock) = directory();
        dir.assign_operator("t1", "UA-1", None, "alice", None).unwrap();
        let incident = dir
            .open_incident(
                "t1",
                NewIncident::new("gps_spoof", "high", "Gps Spoof")
                    .with_drone("UA-1")
                    .with_operator("carol"),
            )
            .unwrap();
        assert_eq!(incident.operator.as_deref(), Some("carol"));

        // The drone already has alice; the incident still moves to her.
        let outcome = dir
            .assign_operator("t1", "UA-1", Some(&incident.incident_id), "alice", Some("root"))
            .unwrap();
        assert_eq!(
            outcome,
            AssignmentOutcome::Assigned {
                previous: Some("carol".to_string())
            }
        );
        assert_eq!(
            for_incident(&dir, "t1", &incident.incident_id).as_deref(),
            Some("alice")
        );
        assert_eq!(latest(&dir, "t1", "UA-1").as_deref(), Some("alice"));

        // Now both agree, so repeating it writes nothing.
        assert_eq!(
            dir.assign_operator("t1", "UA-1", Some(&incident.incident_id), "alice", None)
                .unwrap(),
            AssignmentOutcome::Unchanged
        );
    }

    #[test]
    fn test_generated_ids_do_not_collide_across_tenants() {
        let (dir, _clock) = directory();
        let mut ids = std::collections::HashSet::new();
        for tenant in ["t1", "t2"] {
            for _ in 0..50 {
                let incident = dir
                    .open_incident(tenant, NewIncident::new("gps_spoof", "high", "Gps Spoof"))
                    .unwrap();
                assert_eq!(incident.tenant_id, tenant);
                assert!(ids.insert(incident.incident_id));
            }
        }
        assert_eq!(dir.list_active_incidents("t1", None).unwrap().len(), 50);
        assert_eq!(dir.list_active_incidents("t2", None).unwrap().len(), 50);
    }

    #[test]
    fn test_incident_status_transitions() {
        let (dir, clock) = directory();
        let incident = dir
            .open_incident(
                "t1",
                NewIncident::new("rf_link_hijack", "critical", "Rf Link Hijack").with_id("INC-1"),
            )
            .unwrap();
        clock.advance(TimeDelta::seconds(30));

        let mitigated = dir
            .update_incident_status(
                "t1",
                &incident.incident_id,
                IncidentStatus::Mitigated,
                Some("rtl"),
                None,
            )
            .unwrap();
        assert_eq!(mitigated.status, IncidentStatus::Mitigated);
        assert_eq!(mitigated.mitigated_action.as_deref(), Some("rtl"));
        assert!(mitigated.mitigated_at.is_some());
        assert!(mitigated.closed_at.is_none());

        let closed = dir
            .update_incident_status("t1", "INC-1", IncidentStatus::Closed, None, None)
            .unwrap();
        assert_eq!(closed.mitigated_action.as_deref(), Some("rtl"));
        assert!(closed.closed_at.is_some());
        assert!(dir.list_active_incidents("t1", None).unwrap().is_empty());

        let err = dir
            .update_incident_status("t2", "INC-1", IncidentStatus::Closed, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_list_active_incidents_newest_first() {
        let (dir, clock) = directory();
        for (id, drone) in [("INC-a", "UA-1"), ("INC-b", "UA-2"), ("INC-c", "UA-1")] {
            dir.open_incident(
                "t1",
                NewIncident::new("gps_spoof", "high", "Gps Spoof")
                    .with_id(id)
                    .with_drone(drone),
            )
            .unwrap();
            clock.advance(TimeDelta::seconds(1));
        }

        let all: Vec<_> = dir
            .list_active_incidents("t1", None)
            .unwrap()
            .into_iter()
            .map(|i| i.incident_id)
            .collect();
        assert_eq!(all, ["INC-c", "INC-b", "INC-a"]);

        let ua1 = dir.list_active_incidents("t1", Some("UA-1")).unwrap();
        assert_eq!(ua1.len(), 2);
    }

    #[test]
    fn test_incident_status_parse() {
        assert_eq!(IncidentStatus::parse("Closed").unwrap(), IncidentStatus::Closed);
        assert!(IncidentStatus::parse("resolved").is_err());
    }
}
