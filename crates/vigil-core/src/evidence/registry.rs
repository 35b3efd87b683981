//! `SQLite`-backed evidence registry.

use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, Transaction, params, params_from_iter};
use tracing::{info, warn};

use super::record::{EvidenceRecord, ManualEvidence, ReviewDecision, ReviewStatus};
use crate::controls::ControlRef;
use crate::error::{LedgerError, non_empty, require};
use crate::events::ForensicEvent;
use crate::query::{DEFAULT_LIST_LIMIT, DateRange, EvidenceFilter, WhereClause, bounded_limit};
use crate::store::LedgerStore;
use crate::time::{Clock, format_timestamp};

const EVIDENCE_COLUMNS: &str = "id, tenant_id, drone_id, incident_id, framework_id, control_id, \
     evidence_type, source_event_id, reference_id, attestation, review_status, reviewed_by, \
     reviewed_at, review_note, created_at";

/// Owns evidence rows and, exclusively, their review fields.
#[derive(Debug, Clone)]
pub struct EvidenceRegistry {
    store: LedgerStore,
    clock: Arc<dyn Clock>,
}

impl EvidenceRegistry {
    /// Creates a registry over `store`.
    #[must_use]
    pub fn new(store: LedgerStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates the derived record for a mapped event.
    ///
    /// Idempotent per event: when a record for `event.id` already exists it
    /// is returned unchanged.
    pub(crate) fn derive_from_event(
        &self,
        event: &ForensicEvent,
        control: ControlRef,
    ) -> Result<EvidenceRecord, LedgerError> {
        let created_at = format_timestamp(self.clock.now());
        let reference_id = event.incident_id.as_ref().or(event.drone_id.as_ref());

        self.store.write(|tx| {
            tx.execute(
                "INSERT INTO evidence
                 (tenant_id, drone_id, incident_id, framework_id, control_id, evidence_type,
                  source_event_id, reference_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (source_event_id) WHERE source_event_id IS NOT NULL DO NOTHING",
                params![
                    event.tenant_id,
                    event.drone_id,
                    event.incident_id,
                    control.framework_id,
                    control.control_id,
                    event.event_type,
                    event.id,
                    reference_id,
                    created_at,
                ],
            )?;
            let record = tx.query_row(
                &format!(
                    "SELECT {EVIDENCE_COLUMNS} FROM evidence
                     WHERE source_event_id = ?1 AND tenant_id = ?2"
                ),
                params![event.id, event.tenant_id],
                evidence_from_row,
            )?;
            Ok(record)
        })
    }

    /// Attaches manual evidence in `pending` state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the tenant, framework, control, evidence
    /// type or attestation is blank, or a storage error.
    pub fn attach_manual(
        &self,
        tenant_id: &str,
        evidence: ManualEvidence,
    ) -> Result<EvidenceRecord, LedgerError> {
        let tenant_id = require(tenant_id, "tenant_id")?;
        let framework_id = require(&evidence.framework_id, "framework_id")?;
        let control_id = require(&evidence.control_id, "control_id")?;
        let evidence_type = require(&evidence.evidence_type, "evidence_type")?;
        let attestation = require(&evidence.attestation, "attestation")?;
        let drone_id = non_empty(evidence.drone_id.as_deref());
        let incident_id = non_empty(evidence.incident_id.as_deref());
        let reference_id = non_empty(evidence.reference_id.as_deref())
            .or(incident_id)
            .or(drone_id);
        let created_at = format_timestamp(self.clock.now());

        let record = self.store.write(|tx| {
            tx.execute(
                "INSERT INTO evidence
                 (tenant_id, drone_id, incident_id, framework_id, control_id, evidence_type,
                  source_event_id, reference_id, attestation, review_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?10)",
                params![
                    tenant_id,
                    drone_id,
                    incident_id,
                    framework_id,
                    control_id,
                    evidence_type,
                    reference_id,
                    attestation,
                    ReviewStatus::Pending.as_str(),
                    created_at,
                ],
            )?;
            let id = tx.last_insert_rowid();
            select_by_id(tx, tenant_id, id)?
                .ok_or_else(|| LedgerError::not_found("evidence", id.to_string()))
        })?;

        info!(
            tenant_id = %record.tenant_id,
            evidence_id = record.id,
            framework_id = %record.framework_id,
            control_id = %record.control_id,
            "attached manual evidence"
        );
        Ok(record)
    }

    /// Records a review decision.
    ///
    /// A second review overwrites the first; the previous status is logged
    /// but not retained.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (with no mutation) when `evidence_id` does not
    /// exist in `tenant_id`, `InvalidArgument` for a blank reviewer, or a
    /// storage error.
    pub fn review(
        &self,
        tenant_id: &str,
        evidence_id: i64,
        decision: ReviewDecision,
        reviewed_by: &str,
        note: Option<&str>,
    ) -> Result<EvidenceRecord, LedgerError> {
        let reviewed_by = require(reviewed_by, "reviewed_by")?;
        let note = non_empty(note);
        let reviewed_at = format_timestamp(self.clock.now());
        let status = decision.status();

        let (previous, record) = self.store.write(|tx| {
            let previous = select_by_id(tx, tenant_id, evidence_id)?
                .ok_or_else(|| LedgerError::not_found("evidence", evidence_id.to_string()))?;
            tx.execute(
                "UPDATE evidence
                 SET review_status = ?1, reviewed_by = ?2, reviewed_at = ?3, review_note = ?4
                 WHERE id = ?5 AND tenant_id = ?6",
                params![status.as_str(), reviewed_by, reviewed_at, note, evidence_id, tenant_id],
            )?;
            let record = select_by_id(tx, tenant_id, evidence_id)?
                .ok_or_else(|| LedgerError::not_found("evidence", evidence_id.to_string()))?;
            Ok((previous, record))
        })?;

        if previous.review_status != ReviewStatus::Pending {
            warn!(
                tenant_id = %record.tenant_id,
                evidence_id,
                previous_status = %previous.review_status,
                new_status = %status,
                previous_reviewer = previous.reviewed_by.as_deref().unwrap_or(""),
                "review overwrote an earlier decision"
            );
        }
        info!(
            tenant_id = %record.tenant_id,
            evidence_id,
            status = %status,
            reviewed_by,
            "reviewed evidence"
        );
        Ok(record)
    }

    /// Lists evidence newest first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a reversed date range or an
    /// out-of-range limit, or a storage error.
    pub fn list(
        &self,
        tenant_id: &str,
        filter: &EvidenceFilter,
    ) -> Result<Vec<EvidenceRecord>, LedgerError> {
        let tenant_id = require(tenant_id, "tenant_id")?;
        let dates = DateRange::new(filter.dates.from, filter.dates.to)?;
        let limit = bounded_limit(filter.limit, DEFAULT_LIST_LIMIT)?;

        let mut clause = WhereClause::new();
        clause.push("tenant_id = ?", tenant_id.to_string());
        clause.push_opt("framework_id = ?", filter.framework_id.as_deref());
        clause.push_opt("control_id = ?", filter.control_id.as_deref());
        clause.push_opt("incident_id = ?", filter.incident_id.as_deref());
        clause.push_scope(filter.drone_id.as_deref(), &dates);
        let sql = format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE {} \
             ORDER BY created_at DESC, id DESC LIMIT ?",
            clause.sql()
        );
        let mut params = clause.into_params();
        params.push(SqlValue::Integer(i64::from(limit)));

        self.store.read(|tx| {
            let mut stmt = tx.prepare(&sql)?;
            let records = stmt
                .query_map(params_from_iter(params), evidence_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    /// Fetches one record within a tenant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has that id in the tenant.
    pub fn get(&self, tenant_id: &str, evidence_id: i64) -> Result<EvidenceRecord, LedgerError> {
        self.store
            .read(|tx| select_by_id(tx, tenant_id, evidence_id))?
            .ok_or_else(|| LedgerError::not_found("evidence", evidence_id.to_string()))
    }

    /// The record derived from `event_id`, if derivation has happened.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn for_source_event(
        &self,
        tenant_id: &str,
        event_id: i64,
    ) -> Result<Option<EvidenceRecord>, LedgerError> {
        self.store.read(|tx| {
            tx.query_row(
                &format!(
                    "SELECT {EVIDENCE_COLUMNS} FROM evidence
                     WHERE source_event_id = ?1 AND tenant_id = ?2"
                ),
                params![event_id, tenant_id],
                evidence_from_row,
            )
            .optional()
            .map_err(LedgerError::from)
        })
    }
}

fn select_by_id(
    tx: &Transaction<'_>,
    tenant_id: &str,
    evidence_id: i64,
) -> Result<Option<EvidenceRecord>, LedgerError> {
    tx.query_row(
        &format!("SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE id = ?1 AND tenant_id = ?2"),
        params![evidence_id, tenant_id],
        evidence_from_row,
    )
    .optional()
    .map_err(LedgerError::from)
}

fn evidence_from_row(row: &Row<'_>) -> rusqlite::Result<EvidenceRecord> {
    let review_status: Option<String> = row.get(10)?;
    Ok(EvidenceRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        drone_id: row.get(2)?,
        incident_id: row.get(3)?,
        framework_id: row.get(4)?,
        control_id: row.get(5)?,
        evidence_type: row.get(6)?,
        source_event_id: row.get(7)?,
        reference_id: row.get(8)?,
        attestation: row.get(9)?,
        review_status: ReviewStatus::from_stored(review_status.as_deref()),
        reviewed_by: row.get(11)?,
        reviewed_at: row.get(12)?,
        review_note: row.get(13)?,
        created_at: row.get(14)?,
    })
}
