//! Command implementations.
//!
//! Every command prints one pretty JSON document to stdout of the form
//! `{"ok": true, ...}`. Failures propagate to `main`, which prints the
//! error kind to stderr and exits with code 1.

pub mod bundle;
pub mod events;
pub mod evidence;
pub mod incident;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use tracing::debug;
use vigil_core::{
    ForensicsLedger, IdentityContext, IdentityProvider, StaticIdentityProvider, VigilConfig,
};

/// An authenticated caller with an open ledger.
pub struct Session {
    pub ledger: ForensicsLedger,
    pub identity: IdentityContext,
}

impl Session {
    /// Authenticates against the configured principals and opens the ledger.
    pub fn open(config: &VigilConfig, user: Option<&str>, secret: Option<&str>) -> Result<Self> {
        let provider = StaticIdentityProvider::from_principals(&config.principals);
        if provider.is_empty() {
            bail!("no principals configured; add a [[principals]] entry to the config file");
        }
        let (Some(user), Some(secret)) = (user, secret) else {
            bail!("--user and --secret (or VIGIL_USER and VIGIL_SECRET) are required");
        };
        let identity = provider
            .authenticate(user, secret)
            .context("authentication failed")?;

        let ledger = ForensicsLedger::from_config(config).with_context(|| {
            format!(
                "failed to open ledger at {}",
                config.ledger.database.display()
            )
        })?;
        debug!(
            actor = %identity.actor_id,
            role = %identity.role,
            tenant_id = %identity.tenant_id,
            database = %config.ledger.database.display(),
            "opened session"
        );
        Ok(Self { ledger, identity })
    }
}

/// Prints `{"ok": true, <key>: <value>}`.
pub fn emit<T: serde::Serialize>(key: &str, value: &T) -> Result<()> {
    let mut body = Map::new();
    body.insert("ok".to_string(), Value::Bool(true));
    body.insert(key.to_string(), serde_json::to_value(value)?);
    println!("{}", serde_json::to_string_pretty(&Value::Object(body))?);
    Ok(())
}

/// `vigil stats`
pub fn stats(session: &Session) -> Result<()> {
    let stats = session.ledger.stats().context("failed to read stats")?;
    emit("stats", &stats)
}
