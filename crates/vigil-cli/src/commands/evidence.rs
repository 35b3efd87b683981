//! Evidence commands: `attach`, `review`, `evidence` and `summary`.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use vigil_core::{ListParams, ManualEvidence, ReviewDecision, SummaryQuery};

use super::{Session, emit};

/// Arguments for `vigil attach`.
#[derive(Debug, Args)]
pub struct AttachArgs {
    /// Framework id, e.g. `faa_107`
    #[arg(long)]
    pub framework: String,

    /// Control id, e.g. `107.12`
    #[arg(long)]
    pub control: String,

    /// Attestation kind, e.g. `pilot_certificate`
    #[arg(long)]
    pub evidence_type: String,

    /// Justification text
    #[arg(long)]
    pub attestation: String,

    /// Drone scope; omit for organization-level evidence
    #[arg(long)]
    pub drone: Option<String>,

    /// Related incident
    #[arg(long)]
    pub incident: Option<String>,

    /// Reference id (defaults to the incident, then the drone)
    #[arg(long)]
    pub reference: Option<String>,
}

/// Review verdicts accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Decision {
    Accepted,
    Rejected,
}

impl From<Decision> for ReviewDecision {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => Self::Accepted,
            Decision::Rejected => Self::Rejected,
        }
    }
}

/// Arguments for `vigil review`.
#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// Evidence id
    pub evidence_id: i64,

    /// Verdict
    #[arg(long, value_enum)]
    pub decision: Decision,

    /// Reviewer note
    #[arg(long)]
    pub note: Option<String>,
}

/// Filters shared by `vigil evidence` and `vigil summary`.
#[derive(Debug, Args)]
pub struct ScopeArgs {
    /// Drone scope (organization-level evidence is always included)
    #[arg(long)]
    pub drone: Option<String>,

    /// First day included (YYYY-MM-DD, UTC)
    #[arg(long)]
    pub date_from: Option<String>,

    /// Last day included (YYYY-MM-DD, UTC)
    #[arg(long)]
    pub date_to: Option<String>,
}

/// Arguments for `vigil evidence`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Framework id
    #[arg(long)]
    pub framework: Option<String>,

    /// Control id
    #[arg(long)]
    pub control: Option<String>,

    /// Related incident
    #[arg(long)]
    pub incident: Option<String>,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Maximum number of records (1-500, default 200)
    #[arg(long)]
    pub limit: Option<String>,
}

/// Arguments for `vigil summary`.
#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Framework id
    #[arg(long)]
    pub framework: String,

    #[command(flatten)]
    pub scope: ScopeArgs,
}

/// Parses flags through the same parameter rules the ledger applies to any
/// transport.
fn list_params(
    framework: Option<&str>,
    control: Option<&str>,
    incident: Option<&str>,
    scope: &ScopeArgs,
    limit: Option<&str>,
) -> Result<ListParams> {
    let pairs = [
        ("framework_id", framework),
        ("control_id", control),
        ("incident_id", incident),
        ("drone_id", scope.drone.as_deref()),
        ("date_from", scope.date_from.as_deref()),
        ("date_to", scope.date_to.as_deref()),
        ("limit", limit),
    ];
    let params = ListParams::from_pairs(
        pairs
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v))),
    )?;
    Ok(params)
}

/// Attaches manual evidence.
pub fn attach(session: &Session, args: &AttachArgs) -> Result<()> {
    let evidence = ManualEvidence {
        framework_id: args.framework.clone(),
        control_id: args.control.clone(),
        evidence_type: args.evidence_type.clone(),
        attestation: args.attestation.clone(),
        drone_id: args.drone.clone(),
        incident_id: args.incident.clone(),
        reference_id: args.reference.clone(),
    };
    let record = session
        .ledger
        .attach_evidence(&session.identity, evidence)
        .context("failed to attach evidence")?;
    emit("evidence", &record)
}

/// Records a review decision as the authenticated user.
pub fn review(session: &Session, args: &ReviewArgs) -> Result<()> {
    let record = session
        .ledger
        .review_evidence(
            &session.identity,
            args.evidence_id,
            args.decision.into(),
            args.note.as_deref(),
        )
        .with_context(|| format!("failed to review evidence {}", args.evidence_id))?;
    emit("evidence", &record)
}

/// Lists evidence newest first.
pub fn list(session: &Session, args: &ListArgs) -> Result<()> {
    let params = list_params(
        args.framework.as_deref(),
        args.control.as_deref(),
        args.incident.as_deref(),
        &args.scope,
        args.limit.as_deref(),
    )?;
    let records = session
        .ledger
        .list_evidence(&session.identity, &params.evidence_filter())
        .context("failed to list evidence")?;
    emit("evidence", &records)
}

/// Prints per-control counts.
pub fn summary(session: &Session, args: &SummaryArgs) -> Result<()> {
    let params = list_params(Some(args.framework.as_str()), None, None, &args.scope, None)?;
    let query = SummaryQuery::from_params(&params)?;
    let summary = session
        .ledger
        .summarize_evidence(&session.identity, &query)
        .context("failed to summarize evidence")?;
    emit("summary", &summary)
}
