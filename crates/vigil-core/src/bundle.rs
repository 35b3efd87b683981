//! Hash-sealed incident export bundles.
//!
//! A bundle is an incident snapshot plus its ordered event timeline. Its
//! `bundle_hash` is the hex SHA-256 of the canonical JSON encoding of the
//! *stable subset* `{schema_version, generated_by, disclaimer, incident,
//! events}`. `generated_at` and the hash itself are excluded, so exporting an
//! unchanged incident twice yields the same digest. The hash is an integrity
//! check for audit handoff, not a signature.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::canonical::sha256_hex;
use crate::directory::{IncidentLookup, IncidentRecord};
use crate::error::{LedgerError, require};
use crate::events::{EventStore, ForensicEvent};
use crate::identity::IdentityContext;
use crate::time::{Clock, format_timestamp_secs};

/// Export format identifier.
pub const EXPORT_SCHEMA_VERSION: &str = "12F.export.v0";

/// Fixed disclaimer carried by every bundle.
pub const DISCLAIMER: &str =
    "System-generated snapshot of append-only evidence events + incident state. Not user-editable.";

/// Keys of a serialized bundle covered by `bundle_hash`.
const HASHED_FIELDS: [&str; 5] = [
    "schema_version",
    "generated_by",
    "disclaimer",
    "incident",
    "events",
];

/// Who produced an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedBy {
    /// Exporting actor.
    pub actor: String,
    /// Role of the exporting actor.
    pub role: String,
    /// Tenant the export was made in.
    pub tenant_id: String,
}

impl From<&IdentityContext> for GeneratedBy {
    fn from(identity: &IdentityContext) -> Self {
        Self {
            actor: identity.actor_id.clone(),
            role: identity.role.as_str().to_string(),
            tenant_id: identity.tenant_id.clone(),
        }
    }
}

/// An incident export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBundle {
    /// Always [`EXPORT_SCHEMA_VERSION`].
    pub schema_version: String,
    /// Export time at second precision; not hashed.
    pub generated_at: String,
    /// Who exported.
    pub generated_by: GeneratedBy,
    /// Fixed [`DISCLAIMER`] text.
    pub disclaimer: String,
    /// Incident snapshot at export time.
    pub incident: IncidentRecord,
    /// Ascending by `(timestamp, id)`.
    pub events: Vec<ForensicEvent>,
    /// Hex SHA-256 of the canonical JSON of every field above except
    /// `generated_at`.
    pub bundle_hash: String,
}

#[derive(Serialize)]
struct StableSubset<'a> {
    schema_version: &'a str,
    generated_by: &'a GeneratedBy,
    disclaimer: &'a str,
    incident: &'a IncidentRecord,
    events: &'a [ForensicEvent],
}

/// Assembles bundles from the event store and the incident collaborator.
#[derive(Debug, Clone)]
pub struct BundleExporter {
    events: EventStore,
    incidents: Arc<dyn IncidentLookup>,
    clock: Arc<dyn Clock>,
}

impl BundleExporter {
    /// Creates an exporter reading timelines from `events`.
    #[must_use]
    pub fn new(events: EventStore, incidents: Arc<dyn IncidentLookup>, clock: Arc<dyn Clock>) -> Self {
        Self {
            events,
            incidents,
            clock,
        }
    }

    /// Exports one incident for the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the incident does not exist or belongs to
    /// another tenant (the two are indistinguishable), or a storage error.
    pub fn export(
        &self,
        identity: &IdentityContext,
        incident_id: &str,
    ) -> Result<ExportBundle, LedgerError> {
        let incident_id = require(incident_id, "incident_id")?;
        let incident = self
            .incidents
            .get_incident(incident_id)?
            .filter(|incident| incident.tenant_id == identity.tenant_id)
            .ok_or_else(|| LedgerError::not_found("incident", incident_id))?;

        let events = self
            .events
            .incident_timeline(&identity.tenant_id, incident_id)?;
        let generated_by = GeneratedBy::from(identity);

        let bundle_hash = sha256_hex(&StableSubset {
            schema_version: EXPORT_SCHEMA_VERSION,
            generated_by: &generated_by,
            disclaimer: DISCLAIMER,
            incident: &incident,
            events: &events,
        })?;

        info!(
            tenant_id = %identity.tenant_id,
            incident_id,
            event_count = events.len(),
            bundle_hash = %bundle_hash,
            "exported incident bundle"
        );

        Ok(ExportBundle {
            schema_version: EXPORT_SCHEMA_VERSION.to_string(),
            generated_at: format_timestamp_secs(self.clock.now()),
            generated_by,
            disclaimer: DISCLAIMER.to_string(),
            incident,
            events,
            bundle_hash,
        })
    }
}

/// Recomputes the digest of a bundle's stable subset.
///
/// # Errors
///
/// Returns `InvalidArgument` if the bundle cannot be canonically encoded.
pub fn compute_hash(bundle: &ExportBundle) -> Result<String, LedgerError> {
    Ok(sha256_hex(&StableSubset {
        schema_version: &bundle.schema_version,
        generated_by: &bundle.generated_by,
        disclaimer: &bundle.disclaimer,
        incident: &bundle.incident,
        events: &bundle.events,
    })?)
}

/// Checks a bundle's `bundle_hash`.
///
/// # Errors
///
/// Returns `InvalidArgument` naming `bundle_hash` on mismatch.
pub fn verify(bundle: &ExportBundle) -> Result<(), LedgerError> {
    check(&compute_hash(bundle)?, &bundle.bundle_hash)
}

/// Checks a bundle read back as plain JSON, e.g. from an exported file.
///
/// Accepts either the bare bundle object or a `{"bundle": {...}}` envelope.
///
/// # Errors
///
/// Returns `InvalidArgument` if a hashed field or `bundle_hash` is missing,
/// or the digest does not match.
pub fn verify_json(value: &Value) -> Result<String, LedgerError> {
    let bundle = value.get("bundle").unwrap_or(value);
    let object = bundle
        .as_object()
        .ok_or_else(|| LedgerError::invalid("bundle", "expected a JSON object"))?;

    let mut stable = Map::new();
    for field in HASHED_FIELDS {
        let entry = object
            .get(field)
            .ok_or_else(|| LedgerError::invalid("bundle", format!("missing field '{field}'")))?;
        stable.insert(field.to_string(), entry.clone());
    }
    let claimed = object
        .get("bundle_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::invalid("bundle_hash", "missing"))?;

    let actual = sha256_hex(&Value::Object(stable))?;
    check(&actual, claimed)?;
    Ok(actual)
}

fn check(actual: &str, claimed: &str) -> Result<(), LedgerError> {
    if actual.eq_ignore_ascii_case(claimed.trim()) {
        Ok(())
    } else {
        Err(LedgerError::invalid(
            "bundle_hash",
            format!("expected {actual}, bundle claims {claimed}"),
        ))
    }
}
