//! Error taxonomy for ledger operations.
//!
//! Every failure a caller can observe classifies into one [`ErrorKind`].
//! `NotFound` errors only ever echo identifiers the caller supplied, so a
//! record that exists in another tenant is indistinguishable from one that
//! does not exist at all.

use serde::Serialize;
use thiserror::Error;

use crate::canonical::CanonicalJsonError;

/// Caller-facing classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The referenced incident or evidence does not exist for this tenant.
    NotFound,
    /// A parameter was malformed or out of range.
    InvalidArgument,
    /// The caller's role may not perform the operation.
    Forbidden,
    /// The backing store failed or did not commit.
    StorageFailure,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::Forbidden => "forbidden",
            Self::StorageFailure => "storage_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by ledger operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The referenced record does not exist within the caller's tenant.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// Identifier supplied by the caller.
        id: String,
    },

    /// A parameter failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The caller's role is not allowed to perform the action.
    #[error("role '{role}' is not permitted to {action}")]
    Forbidden {
        /// Role presented by the caller.
        role: String,
        /// The attempted action.
        action: &'static str,
    },

    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error while opening the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored payload could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Canonical JSON encoding rejected a value.
    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] CanonicalJsonError),

    /// The shared connection mutex was poisoned by a panicking writer.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    /// Classifies this error for the caller.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument { .. } | Self::Canonical(_) => ErrorKind::InvalidArgument,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::LockPoisoned => {
                ErrorKind::StorageFailure
            },
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// Rejects missing or blank required string parameters.
pub(crate) fn require<'a>(value: &'a str, field: &'static str) -> Result<&'a str, LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid(field, "must not be empty"));
    }
    Ok(trimmed)
}

/// Treats empty optional strings as absent, the way query filters arrive.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
