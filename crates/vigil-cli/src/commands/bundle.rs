//! `vigil export` and `vigil verify`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Value, json};
use vigil_core::bundle;

use super::{Session, emit};

/// Arguments for `vigil export`.
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Incident to export
    pub incident_id: String,

    /// Write the bundle to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `vigil verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Bundle file produced by `vigil export`
    pub path: PathBuf,
}

/// Exports an incident bundle.
pub fn export(session: &Session, args: &ExportArgs) -> Result<()> {
    let bundle = session
        .ledger
        .export_bundle(&session.identity, &args.incident_id)
        .with_context(|| format!("failed to export incident {}", args.incident_id))?;

    match &args.output {
        Some(path) => {
            let body = serde_json::to_string_pretty(&json!({"ok": true, "bundle": bundle}))?;
            std::fs::write(path, body)
                .with_context(|| format!("failed to write {}", path.display()))?;
            emit(
                "export",
                &json!({
                    "path": path.display().to_string(),
                    "bundle_hash": bundle.bundle_hash,
                    "event_count": bundle.events.len(),
                }),
            )
        },
        None => emit("bundle", &bundle),
    }
}

/// Recomputes the hash of a bundle file. Needs no database or identity.
pub fn verify(args: &VerifyArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", args.path.display()))?;
    let hash = bundle::verify_json(&value)
        .with_context(|| format!("bundle {} failed verification", args.path.display()))?;
    emit("verified", &json!({"bundle_hash": hash}))
}
