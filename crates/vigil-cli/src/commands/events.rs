//! `vigil record` and `vigil events`.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use vigil_core::{EventQuery, NewEvent};

use super::{Session, emit};

/// Arguments for `vigil record`.
#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Event type, e.g. `operator_assigned`
    #[arg(long)]
    pub event_type: String,

    /// Correlated drone
    #[arg(long)]
    pub drone: Option<String>,

    /// Correlated incident
    #[arg(long)]
    pub incident: Option<String>,

    /// Record on behalf of another actor (admin only); defaults to the
    /// authenticated user
    #[arg(long)]
    pub actor: Option<String>,

    /// Record a system event whose actor is resolved from operator
    /// assignments (admin only)
    #[arg(long, conflicts_with = "actor")]
    pub system: bool,

    /// Free-text action description
    #[arg(long)]
    pub action: Option<String>,

    /// Outcome (`ok`, `error`, ...)
    #[arg(long)]
    pub result: Option<String>,

    /// JSON payload
    #[arg(long, value_parser = parse_json)]
    pub payload: Option<Value>,

    /// RFC 3339 occurrence time
    #[arg(long)]
    pub timestamp: Option<String>,
}

/// Arguments for `vigil events`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only events for this drone
    #[arg(long)]
    pub drone: Option<String>,

    /// Only events for this incident
    #[arg(long)]
    pub incident: Option<String>,

    /// Maximum number of events (1-500)
    #[arg(long)]
    pub limit: Option<u32>,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

/// Records one event. The authenticated user is the actor unless an admin
/// passes `--actor` or `--system`.
pub fn record(session: &Session, args: &RecordArgs) -> Result<()> {
    let event = NewEvent {
        event_type: args.event_type.clone(),
        drone_id: args.drone.clone(),
        incident_id: args.incident.clone(),
        actor: args.actor.clone(),
        action: args.action.clone(),
        result: args.result.clone(),
        payload: args.payload.clone(),
        timestamp: args.timestamp.clone(),
    };
    let recorded = if args.system {
        session
            .ledger
            .record_system_event(&session.identity, event)
            .context("failed to record system event")?
    } else {
        session
            .ledger
            .record_event(&session.identity, event)
            .context("failed to record event")?
    };
    emit("event", &recorded)
}

/// Lists events oldest first.
pub fn list(session: &Session, args: &ListArgs) -> Result<()> {
    let query = EventQuery {
        drone_id: args.drone.clone(),
        incident_id: args.incident.clone(),
        limit: args.limit,
    };
    let events = session
        .ledger
        .list_events(&session.identity, &query)
        .context("failed to list events")?;
    emit("events", &events)
}
