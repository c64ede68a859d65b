//! Remote activation authority abstraction.
//!
//! The authority is the source of truth for whether a key exists, which
//! machine it is bound to, and when it lapses. Implementations perform one
//! network call per method and never retry; retry policy belongs to callers.

use crate::error::ActivationResult;
use crate::key::{ActivationKey, ActivationType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the authority refused a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Key does not exist or was consumed.
    InvalidKey,
    /// Key is bound to another machine.
    AlreadyActivatedElsewhere,
    /// Key lapsed or was disabled.
    Inactive,
}

/// The authority's answer for a key on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntitlement {
    /// Whether the key currently entitles this machine.
    pub valid: bool,
    /// Entitlement kind as known to the authority.
    pub activation_type: ActivationType,
    /// Authoritative expiry, `None` for keys that do not lapse.
    pub expires_at: Option<DateTime<Utc>>,
    /// Reason for refusal when `valid` is false.
    pub error_kind: Option<RejectionKind>,
}

impl RemoteEntitlement {
    /// An entitlement the authority granted.
    #[must_use]
    pub fn granted(activation_type: ActivationType, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            valid: true,
            activation_type,
            expires_at,
            error_kind: None,
        }
    }

    /// An entitlement the authority refused.
    #[must_use]
    pub fn rejected(kind: RejectionKind) -> Self {
        Self {
            valid: false,
            activation_type: ActivationType::Unknown,
            expires_at: None,
            error_kind: Some(kind),
        }
    }
}

/// Network operations against the activation authority.
///
/// Refusals come back as `Ok` with `valid == false`; `Err` is reserved for
/// failures to obtain an answer at all, reported as
/// [`ActivationError::Network`](crate::ActivationError::Network).
#[async_trait]
pub trait ActivationAuthority: Send + Sync {
    /// Attempts first-time activation of `key` on `machine_id`.
    async fn redeem(&self, key: &ActivationKey, machine_id: &str)
        -> ActivationResult<RemoteEntitlement>;

    /// Re-validates an already activated machine. Idempotent.
    async fn check_entitlement(
        &self,
        key: &ActivationKey,
        machine_id: &str,
    ) -> ActivationResult<RemoteEntitlement>;
}
