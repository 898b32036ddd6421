//! Claims decoded from a verified token.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

/// Token payload as it comes out of `jsonwebtoken::decode`.
///
/// Only the verifier decodes into this type, and only after the signature
/// check, so turning it into a [`ClaimSet`] is the single way to get one.
/// The registered claims default when absent so that presence is reported by
/// claim validation, not as a parse failure.
#[derive(Debug, Deserialize)]
pub(crate) struct VerifiedPayload {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    iss: String,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    exp: u64,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    nbf: Option<u64>,
    #[serde(default)]
    permissions: Option<BTreeSet<String>>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl VerifiedPayload {
    pub(crate) fn expiry(&self) -> u64 {
        self.exp
    }
}

/// Authorization context handed to protected operations.
///
/// Immutable once created. Holds the standard claims as typed fields and
/// keeps every other claim in `extra`.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimSet {
    subject: String,
    issuer: String,
    audiences: Vec<String>,
    expires_at: u64,
    issued_at: Option<u64>,
    not_before: Option<u64>,
    /// `None` when the token had no `permissions` claim at all.
    permissions: Option<BTreeSet<String>>,
    extra: BTreeMap<String, Value>,
}

impl ClaimSet {
    pub(crate) fn from_verified(payload: VerifiedPayload) -> Self {
        let audiences = match payload.aud {
            Some(Audience::One(aud)) => vec![aud],
            Some(Audience::Many(auds)) => auds,
            None => Vec::new(),
        };

        Self {
            subject: payload.sub,
            issuer: payload.iss,
            audiences,
            expires_at: payload.exp,
            issued_at: payload.iat,
            not_before: payload.nbf,
            permissions: payload.permissions,
            extra: payload.extra,
        }
    }

    /// The `sub` claim.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The `iss` claim.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The `aud` claim, normalised to a list.
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    /// The `exp` claim as a Unix timestamp.
    pub fn expiry(&self) -> u64 {
        self.expires_at
    }

    /// The `exp` claim as a UTC time, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.expires_at)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn issued_at(&self) -> Option<u64> {
        self.issued_at
    }

    pub fn not_before(&self) -> Option<u64> {
        self.not_before
    }

    /// The `permissions` claim; `None` if the token did not carry one.
    pub fn permissions(&self) -> Option<&BTreeSet<String>> {
        self.permissions.as_ref()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|perms| perms.contains(permission))
    }

    /// Any non-standard claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

#[cfg(test)]
pub(crate) fn claims_from_json(value: Value) -> ClaimSet {
    ClaimSet::from_verified(serde_json::from_value(value).unwrap())
}
