//! Incident lifecycle and operator assignment commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use vigil_core::NewIncident;

use super::{Session, emit};

/// Arguments for `vigil assign-operator`.
#[derive(Debug, Args)]
pub struct AssignArgs {
    /// Drone receiving the operator
    #[arg(long)]
    pub drone: String,

    /// Operator to assign
    #[arg(long)]
    pub operator: String,

    /// Incident the assignment is made for
    #[arg(long)]
    pub incident: Option<String>,
}

/// `vigil incident` subcommands.
#[derive(Debug, Subcommand)]
pub enum IncidentCommand {
    /// Open an incident (records `incident_created`)
    Open(OpenArgs),

    /// Mark an incident mitigated (records `mitigation_action_executed`)
    Mitigate(MitigateArgs),

    /// Close an incident (records `incident_closed`)
    Close {
        /// Incident id
        incident_id: String,
    },

    /// Show one incident
    Show {
        /// Incident id
        incident_id: String,
    },

    /// List active incidents, newest first
    List {
        /// Only incidents for this drone
        #[arg(long)]
        drone: Option<String>,
    },
}

/// Arguments for `vigil incident open`.
#[derive(Debug, Args)]
pub struct OpenArgs {
    /// Threat type, e.g. `gps_spoof`
    #[arg(long)]
    pub threat_type: String,

    /// Severity, e.g. `high`
    #[arg(long)]
    pub severity: String,

    /// Human-readable title
    #[arg(long)]
    pub title: String,

    /// Affected drone
    #[arg(long)]
    pub drone: Option<String>,

    /// Attributed operator (defaults to the drone's latest assignment)
    #[arg(long)]
    pub operator: Option<String>,

    /// Free-form details
    #[arg(long)]
    pub details: Option<String>,

    /// Live incident rather than a training simulation
    #[arg(long)]
    pub live: bool,
}

/// Arguments for `vigil incident mitigate`.
#[derive(Debug, Args)]
pub struct MitigateArgs {
    /// Incident id
    pub incident_id: String,

    /// Mitigation action executed, e.g. `return_to_home`
    #[arg(long)]
    pub action: String,
}

/// Assigns an operator to a drone.
pub fn assign(session: &Session, args: &AssignArgs) -> Result<()> {
    let outcome = session
        .ledger
        .assign_operator(
            &session.identity,
            &args.drone,
            args.incident.as_deref(),
            &args.operator,
        )
        .with_context(|| format!("failed to assign {} to {}", args.operator, args.drone))?;
    emit("assignment", &outcome)
}

/// Dispatches `vigil incident`.
pub fn run(session: &Session, cmd: &IncidentCommand) -> Result<()> {
    let ledger = &session.ledger;
    let identity = &session.identity;

    let incident = match cmd {
        IncidentCommand::Open(args) => {
            let mut incident = NewIncident::new(
                args.threat_type.as_str(),
                args.severity.as_str(),
                args.title.as_str(),
            );
            incident.drone_id.clone_from(&args.drone);
            incident.details.clone_from(&args.details);
            incident.operator.clone_from(&args.operator);
            incident.training = !args.live;
            ledger
                .open_incident(identity, incident)
                .context("failed to open incident")?
        },
        IncidentCommand::Mitigate(args) => ledger
            .mitigate_incident(identity, &args.incident_id, &args.action)
            .with_context(|| format!("failed to mitigate {}", args.incident_id))?,
        IncidentCommand::Close { incident_id } => ledger
            .close_incident(identity, incident_id)
            .with_context(|| format!("failed to close {incident_id}"))?,
        IncidentCommand::Show { incident_id } => ledger
            .get_incident(identity, incident_id)
            .with_context(|| format!("failed to load {incident_id}"))?,
        IncidentCommand::List { drone } => {
            let incidents = ledger
                .list_active_incidents(identity, drone.as_deref())
                .context("failed to list incidents")?;
            return emit("incidents", &incidents);
        },
    };
    emit("incident", &incident)
}
