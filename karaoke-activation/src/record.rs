//! The persisted activation record.

use crate::key::{ActivationKey, ActivationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single activation row kept on this machine.
///
/// A record without a key is the unactivated state and always carries
/// [`ActivationType::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRecord {
    /// Redeemed key, or `None` if never activated.
    pub key: Option<ActivationKey>,
    /// Entitlement kind as last confirmed.
    pub activation_type: ActivationType,
    /// When the key was redeemed on this machine.
    pub activated_at: Option<DateTime<Utc>>,
    /// Locally enforced expiry. `None` defers entirely to the authority.
    pub expires_at: Option<DateTime<Utc>>,
    /// Opaque device identifier the key is bound to.
    pub machine_id: String,
    /// Last time the authority answered a check.
    pub last_online_check_at: Option<DateTime<Utc>>,
}

impl ActivationRecord {
    /// Creates the all-null record for a machine.
    #[must_use]
    pub fn unactivated(machine_id: impl Into<String>) -> Self {
        Self {
            key: None,
            activation_type: ActivationType::Unknown,
            activated_at: None,
            expires_at: None,
            machine_id: machine_id.into(),
            last_online_check_at: None,
        }
    }

    /// Creates a freshly redeemed record, confirmed online at `now`.
    #[must_use]
    pub fn redeemed(
        key: ActivationKey,
        activation_type: ActivationType,
        expires_at: Option<DateTime<Utc>>,
        machine_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: Some(key),
            activation_type,
            activated_at: Some(now),
            expires_at,
            machine_id: machine_id.into(),
            last_online_check_at: Some(now),
        }
    }

    /// Returns true if a key has been redeemed.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.key.is_some()
    }

    /// Returns true if the record satisfies the key/type invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.key.is_some() || self.activation_type == ActivationType::Unknown
    }
}
