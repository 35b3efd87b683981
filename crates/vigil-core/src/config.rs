//! Configuration parsing and management.
//!
//! The CLI reads a TOML file describing where the ledger database lives, the
//! default log level, and the principals backing the static identity
//! provider:
//!
//! ```toml
//! [ledger]
//! database = "/var/lib/vigil/vigil.db"
//! busy_timeout_ms = 5000
//!
//! [log]
//! level = "info"
//!
//! [[principals]]
//! username = "alice"
//! role = "admin"
//! tenant_id = "t1"
//! secret_sha256 = "…64 hex chars…"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::decode_digest;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration parsed but is not usable.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Storage settings.
    #[serde(default)]
    pub ledger: LedgerSection,

    /// Logging settings.
    #[serde(default)]
    pub log: LogSection,

    /// Principals for the static identity provider.
    #[serde(default)]
    pub principals: Vec<PrincipalConfig>,
}

/// `[ledger]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Path to the `SQLite` database.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// How long a writer waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            database: default_database(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl LedgerSection {
    /// Busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    /// Default `tracing` filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One `[[principals]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalConfig {
    /// Login name, recorded as the actor on events.
    pub username: String,
    /// Role name (`admin`, `operator`, `viewer`, ...).
    pub role: String,
    /// Tenant the principal belongs to.
    pub tenant_id: String,
    /// Hex SHA-256 of the principal's secret.
    pub secret_sha256: String,
}

fn default_database() -> PathBuf {
    PathBuf::from("vigil.db")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl VigilConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.database.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "ledger.database must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, principal) in self.principals.iter().enumerate() {
            if principal.username.trim().is_empty() || principal.tenant_id.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "principals[{index}]: username and tenant_id are required"
                )));
            }
            if !seen.insert(principal.username.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "principals[{index}]: duplicate username '{}'",
                    principal.username
                )));
            }
            if decode_digest(&principal.secret_sha256).is_none() {
                return Err(ConfigError::Validation(format!(
                    "principals[{index}]: secret_sha256 must be 64 hex characters"
                )));
            }
        }
        Ok(())
    }
}
