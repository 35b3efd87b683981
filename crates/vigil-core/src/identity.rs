//! Caller identity.
//!
//! The ledger consumes only the resolved [`IdentityContext`] triple and never
//! inspects how it was produced. Credential checking sits behind the
//! [`IdentityProvider`] trait; [`StaticIdentityProvider`] is the configured
//! default, backed by the `[[principals]]` table of the config file.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::PrincipalConfig;

/// Role presented by an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// Administrators review evidence and assign operators.
    Admin,
    /// Drone operators run mitigations and record events.
    Operator,
    /// Read-only auditors.
    Viewer,
    /// Any role name this build does not know about.
    Other(String),
}

impl Role {
    /// Parses a role name case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "operator" => Self::Operator,
            "viewer" => Self::Viewer,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Viewer => "viewer",
            Self::Other(name) => name,
        }
    }

    /// Whether this role may make reviewer decisions.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// The authenticated `{actor_id, role, tenant_id}` triple.
///
/// Built only through [`IdentityContext::new`], which trims the actor and
/// tenant so every component compares the same tenant string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct IdentityContext {
    /// Authenticated actor, recorded on events as the acting identity.
    pub actor_id: String,
    /// Role used for reviewer checks.
    pub role: Role,
    /// Tenant every operation is scoped to.
    pub tenant_id: String,
}

impl IdentityContext {
    /// Creates an identity context with surrounding whitespace removed from
    /// the actor and tenant.
    #[must_use]
    pub fn new(actor_id: impl AsRef<str>, role: Role, tenant_id: impl AsRef<str>) -> Self {
        Self {
            actor_id: actor_id.as_ref().trim().to_string(),
            role,
            tenant_id: tenant_id.as_ref().trim().to_string(),
        }
    }
}

/// Errors produced while authenticating a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    /// Unknown user or wrong secret; the two are deliberately merged.
    #[error("invalid username or secret")]
    InvalidCredentials,
}

/// Resolves credentials to an identity.
pub trait IdentityProvider: Send + Sync {
    /// Authenticates `username` with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredentials`] on any mismatch.
    fn authenticate(&self, username: &str, secret: &str) -> Result<IdentityContext, IdentityError>;
}

#[derive(Debug, Clone)]
struct Principal {
    role: Role,
    tenant_id: String,
    secret_digest: [u8; 32],
}

/// Identity provider over a fixed principal table.
///
/// Secrets are held only as SHA-256 digests and compared in constant time.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    principals: HashMap<String, Principal>,
}

impl StaticIdentityProvider {
    /// Builds a provider from configured principals.
    ///
    /// Principals whose digest is not 32 bytes of hex are skipped; config
    /// validation rejects them before this point.
    #[must_use]
    pub fn from_principals(principals: &[PrincipalConfig]) -> Self {
        let principals = principals
            .iter()
            .filter_map(|p| {
                let secret_digest = decode_digest(&p.secret_sha256)?;
                Some((
                    p.username.clone(),
                    Principal {
                        role: Role::parse(&p.role),
                        tenant_id: p.tenant_id.clone(),
                        secret_digest,
                    },
                ))
            })
            .collect();
        Self { principals }
    }

    /// Number of usable principals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.principals.len()
    }

    /// Whether no principals are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn authenticate(&self, username: &str, secret: &str) -> Result<IdentityContext, IdentityError> {
        let presented: [u8; 32] = Sha256::digest(secret.as_bytes()).into();

        let Some(principal) = self.principals.get(username) else {
            // Burn the same comparison so unknown users are not faster.
            let _ = presented.ct_eq(&[0u8; 32]);
            return Err(IdentityError::InvalidCredentials);
        };

        if bool::from(presented.ct_eq(&principal.secret_digest)) {
            Ok(IdentityContext::new(
                username,
                principal.role.clone(),
                principal.tenant_id.clone(),
            ))
        } else {
            Err(IdentityError::InvalidCredentials)
        }
    }
}

/// Hex SHA-256 of a secret, in the form stored in `secret_sha256`.
#[must_use]
pub fn secret_digest_hex(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

pub(crate) fn decode_digest(raw: &str) -> Option<[u8; 32]> {
    hex::decode(raw.trim()).ok()?.try_into().ok()
}
