//! The ledger facade.
//!
//! [`ForensicsLedger`] wires the store, event store, evidence registry,
//! aggregator, exporter and directory over one shared database. Every entry
//! point takes the caller's [`IdentityContext`]; the tenant always comes
//! from the identity, never from request data.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::bundle::{self, BundleExporter, ExportBundle};
use crate::config::VigilConfig;
use crate::directory::{
    AssignmentOutcome, IncidentLookup, IncidentRecord, IncidentStatus, NewIncident, SqliteDirectory,
};
use crate::error::{LedgerError, non_empty, require};
use crate::events::{EventQuery, EventStore, ForensicEvent, NewEvent, event_types};
use crate::evidence::{EvidenceRecord, EvidenceRegistry, ManualEvidence, ReviewDecision};
use crate::identity::IdentityContext;
use crate::query::EvidenceFilter;
use crate::store::{LedgerStore, StoreStats};
use crate::summary::{EvidenceAggregator, EvidenceSummary, SummaryQuery};
use crate::time::{Clock, SystemClock};

/// Forensics and compliance evidence ledger.
#[derive(Debug, Clone)]
pub struct ForensicsLedger {
    store: LedgerStore,
    directory: SqliteDirectory,
    events: EventStore,
    evidence: EvidenceRegistry,
    aggregator: EvidenceAggregator,
    exporter: BundleExporter,
}

impl ForensicsLedger {
    /// Opens the ledger database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Ok(Self::new(LedgerStore::open(path)?, Arc::new(SystemClock)))
    }

    /// Opens the database named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn from_config(config: &VigilConfig) -> Result<Self, LedgerError> {
        let store =
            LedgerStore::open_with_timeout(&config.ledger.database, config.ledger.busy_timeout())?;
        Ok(Self::new(store, Arc::new(SystemClock)))
    }

    /// In-memory ledger for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, LedgerError> {
        Ok(Self::new(LedgerStore::in_memory()?, Arc::new(SystemClock)))
    }

    /// Assembles the ledger over an opened store and a time source.
    #[must_use]
    pub fn new(store: LedgerStore, clock: Arc<dyn Clock>) -> Self {
        let directory = SqliteDirectory::new(store.clone(), Arc::clone(&clock));
        let evidence = EvidenceRegistry::new(store.clone(), Arc::clone(&clock));
        let events = EventStore::new(
            store.clone(),
            Arc::clone(&clock),
            Arc::new(directory.clone()),
            evidence.clone(),
        );
        let aggregator = EvidenceAggregator::new(store.clone());
        let exporter = BundleExporter::new(events.clone(), Arc::new(directory.clone()), clock);
        Self {
            store,
            directory,
            events,
            evidence,
            aggregator,
            exporter,
        }
    }

    /// Records an event in the caller's tenant, attributed to the caller.
    ///
    /// An absent actor becomes `identity.actor_id`. Naming any other actor
    /// requires an admin.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when a non-admin names another actor; otherwise
    /// see [`EventStore::record`].
    pub fn record_event(
        &self,
        identity: &IdentityContext,
        mut event: NewEvent,
    ) -> Result<ForensicEvent, LedgerError> {
        let explicit = non_empty(event.actor.as_deref()).map(str::to_string);
        match explicit {
            Some(actor) if actor != identity.actor_id => {
                require_admin(identity, "record events for another actor")?;
            },
            Some(_) => {},
            None => event.actor = Some(identity.actor_id.clone()),
        }
        self.events.record(&identity.tenant_id, event)
    }

    /// Records a system-internal event that has no direct caller identity.
    ///
    /// An absent actor is resolved from the incident's operator, then the
    /// drone's latest operator. Admin only.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is an admin; otherwise see
    /// [`EventStore::record`].
    pub fn record_system_event(
        &self,
        identity: &IdentityContext,
        event: NewEvent,
    ) -> Result<ForensicEvent, LedgerError> {
        require_admin(identity, "record system events")?;
        self.events.record(&identity.tenant_id, event)
    }

    /// Lists events in the caller's tenant.
    ///
    /// # Errors
    ///
    /// See [`EventStore::list`].
    pub fn list_events(
        &self,
        identity: &IdentityContext,
        query: &EventQuery,
    ) -> Result<Vec<ForensicEvent>, LedgerError> {
        self.events.list(&identity.tenant_id, query)
    }

    /// Attaches manual evidence in `pending` state.
    ///
    /// # Errors
    ///
    /// See [`EvidenceRegistry::attach_manual`].
    pub fn attach_evidence(
        &self,
        identity: &IdentityContext,
        evidence: ManualEvidence,
    ) -> Result<EvidenceRecord, LedgerError> {
        self.evidence.attach_manual(&identity.tenant_id, evidence)
    }

    /// Records the caller's review decision.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is an admin, `NotFound` if the
    /// evidence is not in the caller's tenant.
    pub fn review_evidence(
        &self,
        identity: &IdentityContext,
        evidence_id: i64,
        decision: ReviewDecision,
        note: Option<&str>,
    ) -> Result<EvidenceRecord, LedgerError> {
        require_admin(identity, "review evidence")?;
        self.evidence
            .review(&identity.tenant_id, evidence_id, decision, &identity.actor_id, note)
    }

    /// Fetches one evidence record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the evidence is not in the caller's tenant.
    pub fn get_evidence(
        &self,
        identity: &IdentityContext,
        evidence_id: i64,
    ) -> Result<EvidenceRecord, LedgerError> {
        self.evidence.get(&identity.tenant_id, evidence_id)
    }

    /// Lists evidence newest first.
    ///
    /// # Errors
    ///
    /// See [`EvidenceRegistry::list`].
    pub fn list_evidence(
        &self,
        identity: &IdentityContext,
        filter: &EvidenceFilter,
    ) -> Result<Vec<EvidenceRecord>, LedgerError> {
        self.evidence.list(&identity.tenant_id, filter)
    }

    /// Per-control counts for one framework.
    ///
    /// # Errors
    ///
    /// See [`EvidenceAggregator::summarize`].
    pub fn summarize_evidence(
        &self,
        identity: &IdentityContext,
        query: &SummaryQuery,
    ) -> Result<EvidenceSummary, LedgerError> {
        self.aggregator.summarize(&identity.tenant_id, query)
    }

    /// Exports a hash-sealed incident bundle.
    ///
    /// # Errors
    ///
    /// See [`BundleExporter::export`].
    pub fn export_bundle(
        &self,
        identity: &IdentityContext,
        incident_id: &str,
    ) -> Result<ExportBundle, LedgerError> {
        self.exporter.export(identity, incident_id)
    }

    /// Checks a bundle's digest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on mismatch.
    pub fn verify_bundle(&self, bundle: &ExportBundle) -> Result<(), LedgerError> {
        bundle::verify(bundle)
    }

    /// Assigns an operator to a drone and, when the assignment changed,
    /// records `operator_assigned` with the caller as actor.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is an admin, `NotFound` for an
    /// incident outside the caller's tenant, or a storage error.
    pub fn assign_operator(
        &self,
        identity: &IdentityContext,
        drone_id: &str,
        incident_id: Option<&str>,
        operator: &str,
    ) -> Result<AssignmentOutcome, LedgerError> {
        require_admin(identity, "assign operators")?;
        if let Some(incident_id) = incident_id.filter(|id| !id.trim().is_empty()) {
            self.get_incident(identity, incident_id)?;
        }

        let outcome = self.directory.assign_operator(
            &identity.tenant_id,
            drone_id,
            incident_id,
            operator,
            Some(&identity.actor_id),
        )?;

        if let AssignmentOutcome::Assigned { previous } = &outcome {
            let mut event = NewEvent::new(event_types::OPERATOR_ASSIGNED)
                .with_drone(drone_id.trim())
                .with_actor(identity.actor_id.as_str())
                .with_action("assign_operator")
                .with_result("ok")
                .with_payload(json!({
                    "assigned_operator": operator.trim(),
                    "previous_operator": previous,
                    "actor_role": identity.role.as_str(),
                }));
            event.incident_id = incident_id.map(str::to_string);
            self.events.record(&identity.tenant_id, event)?;
        }
        Ok(outcome)
    }

    /// Opens an incident and records `incident_created`.
    ///
    /// # Errors
    ///
    /// See [`SqliteDirectory::open_incident`].
    pub fn open_incident(
        &self,
        identity: &IdentityContext,
        incident: NewIncident,
    ) -> Result<IncidentRecord, LedgerError> {
        let record = self.directory.open_incident(&identity.tenant_id, incident)?;
        self.record_incident_event(
            identity,
            &record,
            event_types::INCIDENT_CREATED,
            &record.threat_type,
            json!({
                "severity": record.severity,
                "title": record.title,
                "training": record.training,
                "actor_role": identity.role.as_str(),
                "operator": record.operator,
            }),
        )?;
        Ok(record)
    }

    /// Marks an incident mitigated and records
    /// `mitigation_action_executed`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an incident outside the caller's tenant.
    pub fn mitigate_incident(
        &self,
        identity: &IdentityContext,
        incident_id: &str,
        action: &str,
    ) -> Result<IncidentRecord, LedgerError> {
        let action = require(action, "action")?;
        let incident = self.get_incident(identity, incident_id)?;
        let updated = self.directory.update_incident_status(
            &identity.tenant_id,
            &incident.incident_id,
            IncidentStatus::Mitigated,
            Some(action),
            Some(&format!("Mitigation executed: {action}")),
        )?;
        self.record_incident_event(
            identity,
            &updated,
            event_types::MITIGATION_ACTION_EXECUTED,
            action,
            json!({
                "training": updated.training,
                "actor_role": identity.role.as_str(),
                "operator": updated.operator,
            }),
        )?;
        Ok(updated)
    }

    /// Closes an incident and records `incident_closed`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an incident outside the caller's tenant.
    pub fn close_incident(
        &self,
        identity: &IdentityContext,
        incident_id: &str,
    ) -> Result<IncidentRecord, LedgerError> {
        let incident = self.get_incident(identity, incident_id)?;
        let updated = self.directory.update_incident_status(
            &identity.tenant_id,
            &incident.incident_id,
            IncidentStatus::Closed,
            None,
            None,
        )?;
        self.record_incident_event(
            identity,
            &updated,
            event_types::INCIDENT_CLOSED,
            "close",
            json!({
                "training": updated.training,
                "actor_role": identity.role.as_str(),
                "operator": updated.operator,
            }),
        )?;
        Ok(updated)
    }

    /// Fetches an incident in the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the incident is missing or belongs to another
    /// tenant.
    pub fn get_incident(
        &self,
        identity: &IdentityContext,
        incident_id: &str,
    ) -> Result<IncidentRecord, LedgerError> {
        let incident_id = require(incident_id, "incident_id")?;
        self.directory
            .get_incident(incident_id)?
            .filter(|incident| incident.tenant_id == identity.tenant_id)
            .ok_or_else(|| LedgerError::not_found("incident", incident_id))
    }

    /// Active incidents in the caller's tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn list_active_incidents(
        &self,
        identity: &IdentityContext,
        drone_id: Option<&str>,
    ) -> Result<Vec<IncidentRecord>, LedgerError> {
        self.directory
            .list_active_incidents(&identity.tenant_id, drone_id)
    }

    /// Row counts of the backing store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the counts cannot be read.
    pub fn stats(&self) -> Result<StoreStats, LedgerError> {
        self.store.stats()
    }

    fn record_incident_event(
        &self,
        identity: &IdentityContext,
        incident: &IncidentRecord,
        event_type: &str,
        action: &str,
        payload: serde_json::Value,
    ) -> Result<ForensicEvent, LedgerError> {
        let mut event = NewEvent::new(event_type)
            .with_incident(incident.incident_id.as_str())
            .with_actor(identity.actor_id.as_str())
            .with_action(action)
            .with_result("ok")
            .with_payload(payload);
        event.drone_id.clone_from(&incident.drone_id);
        self.events.record(&identity.tenant_id, event)
    }
}

fn require_admin(identity: &IdentityContext, action: &'static str) -> Result<(), LedgerError> {
    if identity.role.is_privileged() {
        Ok(())
    } else {
        Err(LedgerError::Forbidden {
            role: identity.role.as_str().to_string(),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::evidence::ReviewStatus;
    use crate::identity::Role;

    fn ledger() -> ForensicsLedger {
        ForensicsLedger::in_memory().unwrap()
    }

    #[test]
    fn test_review_requires_admin() {
        let ledger = ledger();
        let operator = IdentityContext::new("olga", Role::Operator, "t1");
        let record = ledger
            .attach_evidence(
                &operator,
                ManualEvidence::new("faa_107", "107.12", "pilot_certificate", "cert on file"),
            )
            .unwrap();

        let err = ledger
            .review_evidence(&operator, record.id, ReviewDecision::Accepted, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(
            ledger.get_evidence(&operator, record.id).unwrap().review_status,
            ReviewStatus::Pending
        );

        let admin = IdentityContext::new("bob", Role::Admin, "t1");
        let reviewed = ledger
            .review_evidence(&admin, record.id, ReviewDecision::Accepted, Some("ok"))
            .unwrap();
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("bob"));
    }

    #[test]
    fn test_record_event_attributes_the_caller() {
        let ledger = ledger();
        let root = IdentityContext::new("root", Role::Admin, "t1");
        let alice = IdentityContext::new("alice", Role::Operator, "t1");
        ledger.assign_operator(&root, "UA-1", None, "bob").unwrap();

        let event = ledger
            .record_event(&alice, NewEvent::new("operator_assigned").with_drone("UA-1"))
            .unwrap();
        assert_eq!(event.actor.as_deref(), Some("alice"));

        let own_name = ledger
            .record_event(&alice, NewEvent::new("telemetry_gap").with_actor(" alice "))
            .unwrap();
        assert_eq!(own_name.actor.as_deref(), Some("alice"));
    }

    #[test]
    fn test_only_admins_record_for_another_actor() {
        let ledger = ledger();
        let alice = IdentityContext::new("alice", Role::Operator, "t1");
        let err = ledger
            .record_event(&alice, NewEvent::new("telemetry_gap").with_actor("carol"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(ledger.stats().unwrap().event_count, 0);

        let root = IdentityContext::new("root", Role::Admin, "t1");
        let proxied = ledger
            .record_event(&root, NewEvent::new("telemetry_gap").with_actor("carol"))
            .unwrap();
        assert_eq!(proxied.actor.as_deref(), Some("carol"));
    }

    #[test]
    fn test_system_events_resolve_the_operator() {
        let ledger = ledger();
        let root = IdentityContext::new("root", Role::Admin, "t1");
        ledger.assign_operator(&root, "UA-1", None, "bob").unwrap();

        let event = ledger
            .record_system_event(&root, NewEvent::new("telemetry_gap").with_drone("UA-1"))
            .unwrap();
        assert_eq!(event.actor.as_deref(), Some("bob"));

        let alice = IdentityContext::new("alice", Role::Operator, "t1");
        assert_eq!(
            ledger
                .record_system_event(&alice, NewEvent::new("telemetry_gap").with_drone("UA-1"))
                .unwrap_err()
                .kind(),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn test_padded_tenant_can_export_its_incident() {
        let ledger = ledger();
        let padded = IdentityContext::new("root", Role::Admin, " t1 ");
        let incident = ledger
            .open_incident(&padded, NewIncident::new("gps_spoof", "high", "Gps Spoof"))
            .unwrap();
        ledger
            .record_event(
                &padded,
                NewEvent::new("telemetry_gap").with_incident(incident.incident_id.as_str()),
            )
            .unwrap();

        let bundle = ledger.export_bundle(&padded, &incident.incident_id).unwrap();
        assert_eq!(bundle.incident.tenant_id, "t1");
        assert_eq!(bundle.events.len(), 2);
        assert_eq!(
            ledger.get_incident(&padded, &incident.incident_id).unwrap().tenant_id,
            "t1"
        );
    }

    #[test]
    fn test_other_tenant_incidents_are_invisible() {
        let ledger = ledger();
        let t1 = IdentityContext::new("root", Role::Admin, "t1");
        let t2 = IdentityContext::new("eve", Role::Admin, "t2");
        let theirs = ledger
            .open_incident(&t1, NewIncident::new("gps_spoof", "high", "Gps Spoof"))
            .unwrap();

        // t2 can always open incidents; ids are never caller-chosen.
        let ours = ledger
            .open_incident(&t2, NewIncident::new("gps_spoof", "high", "Gps Spoof"))
            .unwrap();
        assert_ne!(ours.incident_id, theirs.incident_id);

        let taken = ledger.get_incident(&t2, &theirs.incident_id).unwrap_err();
        let free = ledger.get_incident(&t2, "INC-ffffffffffff").unwrap_err();
        assert_eq!(taken.kind(), ErrorKind::NotFound);
        assert_eq!(taken.kind(), free.kind());
        assert_eq!(
            taken.to_string().replace(&theirs.incident_id, "<id>"),
            free.to_string().replace("INC-ffffffffffff", "<id>")
        );
    }

    #[test]
    fn test_assign_operator_records_event_once() {
        let ledger = ledger();
        let admin = IdentityContext::new("root", Role::Admin, "t1");

        assert!(ledger.assign_operator(&admin, "UA-1", None, "alice").unwrap().changed());
        assert!(!ledger.assign_operator(&admin, "UA-1", None, "alice").unwrap().changed());

        let events = ledger
            .list_events(&admin, &EventQuery::for_drone("UA-1"))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "operator_assigned");
        assert_eq!(events[0].actor.as_deref(), Some("root"));
        assert_eq!(events[0].payload.as_ref().unwrap()["assigned_operator"], "alice");

        let viewer = IdentityContext::new("vic", Role::Viewer, "t1");
        assert_eq!(
            ledger
                .assign_operator(&viewer, "UA-1", None, "mallory")
                .unwrap_err()
                .kind(),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn test_incident_lifecycle_derives_evidence() {
        let ledger = ledger();
        let admin = IdentityContext::new("root", Role::Admin, "t1");
        ledger.assign_operator(&admin, "UA-1", None, "alice").unwrap();

        let incident = ledger
            .open_incident(
                &admin,
                NewIncident::new("gps_spoof", "high", "Gps Spoof").with_drone("UA-1"),
            )
            .unwrap();
        assert_eq!(incident.operator.as_deref(), Some("alice"));

        ledger
            .mitigate_incident(&admin, &incident.incident_id, "return_to_home")
            .unwrap();
        let closed = ledger.close_incident(&admin, &incident.incident_id).unwrap();
        assert_eq!(closed.status, IncidentStatus::Closed);

        let timeline = ledger
            .list_events(&admin, &EventQuery::for_incident(&closed.incident_id))
            .unwrap();
        let kinds: Vec<_> = timeline.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            ["incident_created", "mitigation_action_executed", "incident_closed"]
        );

        let summary = ledger
            .summarize_evidence(&admin, &SummaryQuery::new("faa_107"))
            .unwrap();
        assert_eq!(summary.controls["107.12"].total, 1);
        assert_eq!(summary.controls["107.21"].total, 1);
        assert_eq!(summary.controls["107.49"].total, 1);
    }

    #[test]
    fn test_incident_flows_are_tenant_scoped() {
        let ledger = ledger();
        let t1 = IdentityContext::new("root", Role::Admin, "t1");
        let t2 = IdentityContext::new("eve", Role::Admin, "t2");
        let incident = ledger
            .open_incident(&t1, NewIncident::new("firmware_tamper", "high", "Firmware Tamper"))
            .unwrap();

        for err in [
            ledger.get_incident(&t2, &incident.incident_id).unwrap_err(),
            ledger.close_incident(&t2, &incident.incident_id).unwrap_err(),
            ledger
                .mitigate_incident(&t2, &incident.incident_id, "land")
                .unwrap_err(),
            ledger
                .assign_operator(&t2, "UA-1", Some(&incident.incident_id), "eve")
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        assert_eq!(
            ledger.get_incident(&t1, &incident.incident_id).unwrap().status,
            IncidentStatus::Active
        );
    }
}
