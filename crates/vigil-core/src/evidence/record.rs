//! Evidence entity types.

use serde::Serialize;

use crate::error::LedgerError;

/// SQL expression yielding the normalized review status of an `evidence`
/// row. Must agree with [`ReviewStatus::from_stored`].
pub(crate) const NORMALIZED_REVIEW_STATUS_SQL: &str = "CASE LOWER(TRIM(COALESCE(review_status, ''))) \
     WHEN 'accepted' THEN 'accepted' \
     WHEN 'rejected' THEN 'rejected' \
     ELSE 'pending' END";

/// Review state of an evidence record as seen by readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Not yet reviewed.
    #[default]
    Pending,
    /// Accepted by a reviewer.
    Accepted,
    /// Rejected by a reviewer.
    Rejected,
}

impl ReviewStatus {
    /// Normalizes a stored status column.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("accepted") => Self::Accepted,
            Some("rejected") => Self::Rejected,
            _ => Self::Pending,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reviewer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    /// Evidence satisfies the control.
    Accepted,
    /// Evidence does not satisfy the control.
    Rejected,
}

impl ReviewDecision {
    /// Parses `accepted` or `rejected`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for any other value.
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(LedgerError::invalid(
                "decision",
                format!("'{raw}' must be accepted or rejected"),
            )),
        }
    }

    /// Status a record holds after this decision.
    #[must_use]
    pub const fn status(self) -> ReviewStatus {
        match self {
            Self::Accepted => ReviewStatus::Accepted,
            Self::Rejected => ReviewStatus::Rejected,
        }
    }
}

impl std::str::FromStr for ReviewDecision {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A unit of compliance evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceRecord {
    /// Row id.
    pub id: i64,
    /// Owning tenant.
    pub tenant_id: String,
    /// `None` means organization-level evidence.
    pub drone_id: Option<String>,
    /// Related incident.
    pub incident_id: Option<String>,
    /// Framework, e.g. `faa_107`.
    pub framework_id: String,
    /// Control within the framework, e.g. `107.12`.
    pub control_id: String,
    /// Originating event type, or the manual attestation kind.
    pub evidence_type: String,
    /// Generating event; `None` for manual evidence.
    pub source_event_id: Option<i64>,
    /// Correlation string: the incident, else the drone.
    pub reference_id: Option<String>,
    /// Justification text, manual evidence only.
    pub attestation: Option<String>,
    /// Normalized review state.
    pub review_status: ReviewStatus,
    /// Reviewer of the latest decision.
    pub reviewed_by: Option<String>,
    /// Time of the latest decision.
    pub reviewed_at: Option<String>,
    /// Reviewer note of the latest decision.
    pub review_note: Option<String>,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
}

/// Input for attaching evidence by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualEvidence {
    /// Framework the evidence supports (required).
    pub framework_id: String,
    /// Control within the framework (required).
    pub control_id: String,
    /// Attestation kind, e.g. `pilot_certificate` (required).
    pub evidence_type: String,
    /// Justification text (required).
    pub attestation: String,
    /// Drone scope; `None` for organization-level evidence.
    pub drone_id: Option<String>,
    /// Related incident.
    pub incident_id: Option<String>,
    /// Correlation string; defaults to the incident, then the drone.
    pub reference_id: Option<String>,
}

impl ManualEvidence {
    /// Starts a manual attestation.
    #[must_use]
    pub fn new(
        framework_id: impl Into<String>,
        control_id: impl Into<String>,
        evidence_type: impl Into<String>,
        attestation: impl Into<String>,
    ) -> Self {
        Self {
            framework_id: framework_id.into(),
            control_id: control_id.into(),
            evidence_type: evidence_type.into(),
            attestation: attestation.into(),
            ..Self::default()
        }
    }

    /// Scopes the evidence to a drone.
    #[must_use]
    pub fn with_drone(mut self, drone_id: impl Into<String>) -> Self {
        self.drone_id = Some(drone_id.into());
        self
    }

    /// Links the evidence to an incident.
    #[must_use]
    pub fn with_incident(mut self, incident_id: impl Into<String>) -> Self {
        self.incident_id = Some(incident_id.into());
        self
    }

    /// Sets an explicit reference id.
    #[must_use]
    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}
