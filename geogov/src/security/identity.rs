//! Credential fingerprinting and identity resolution.
//!
//! Raw credentials exist only for the duration of a call. The registry keys
//! roles by a one-way SHA-256 fingerprint; the comparison at presentation
//! time is fingerprint-to-fingerprint, so no plaintext secret is retained
//! anywhere in the process.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::errors::{GovError, GovResult};
use crate::types::Role;

/// One-way fingerprint of a credential. Empty or whitespace-only input maps
/// to the fixed "anonymous" fingerprint so audit records stay uniform.
pub fn fingerprint_credential(raw: &str) -> String {
    let normalized = raw.trim();
    let normalized = if normalized.is_empty() {
        "anonymous"
    } else {
        normalized
    };
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Resolved caller identity for one request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub fingerprint: String,
    pub role: Role,
    /// Key for rate-limit accounting: the fingerprint for authenticated
    /// callers, `ip:<origin>` for anonymous ones.
    pub rate_key: String,
}

/// Read-mostly mapping from credential fingerprint to role. Built once at
/// startup; anonymous callers resolve to `Role::Public` without an entry.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    entries: HashMap<String, Role>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-computed fingerprint.
    pub fn register_fingerprint(&mut self, fingerprint: impl Into<String>, role: Role) {
        self.entries.insert(fingerprint.into(), role);
    }

    /// Register a raw credential. The credential is hashed immediately and
    /// the raw value is not retained.
    pub fn register_credential(&mut self, raw: &str, role: Role) {
        let fingerprint = fingerprint_credential(raw);
        self.entries.insert(fingerprint, role);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a presented credential to an identity.
    ///
    /// Absent credential: anonymous `public` identity keyed by origin.
    /// Present but unknown credential: `Unauthenticated`.
    pub fn resolve(&self, credential: Option<&str>, origin: Option<&str>) -> GovResult<Identity> {
        match credential.map(str::trim).filter(|c| !c.is_empty()) {
            None => {
                let origin = origin
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .unwrap_or("anonymous");
                Ok(Identity {
                    fingerprint: fingerprint_credential(""),
                    role: Role::Public,
                    rate_key: format!("ip:{}", origin),
                })
            }
            Some(raw) => {
                let fingerprint = fingerprint_credential(raw);
                match self.entries.get(&fingerprint) {
                    Some(role) => Ok(Identity {
                        rate_key: fingerprint.clone(),
                        fingerprint,
                        role: *role,
                    }),
                    None => Err(GovError::Unauthenticated),
                }
            }
        }
    }
}
