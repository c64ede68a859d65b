//! User-facing activation status.
//!
//! The JSON field names are the desktop UI's contract and must not change.

use crate::key::ActivationType;
use crate::record::ActivationRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The authority answered during this reconciliation.
    Online,
    /// Derived from the local record only.
    Offline,
}

/// Activation status as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationStatus {
    /// The installation is currently authorized.
    #[serde(rename = "ativada")]
    pub activated: bool,
    /// A key is on record but its validity window has closed.
    #[serde(rename = "expirada")]
    pub expired: bool,
    /// Online or offline evaluation.
    #[serde(rename = "modo")]
    pub mode: Mode,
    /// Whole days until the deadline, `None` when no deadline applies.
    #[serde(rename = "diasRestantes")]
    pub days_remaining: Option<i64>,
    /// Whole hours until the deadline, `None` when no deadline applies.
    #[serde(rename = "horasRestantes")]
    pub hours_remaining: Option<i64>,
    /// Entitlement kind, `None` when unactivated.
    #[serde(rename = "tipo")]
    pub activation_type: Option<ActivationType>,
    /// The activation key, `None` when unactivated.
    #[serde(rename = "chave")]
    pub key: Option<String>,
}

impl ActivationStatus {
    /// Status of an installation with no key on record.
    #[must_use]
    pub fn unactivated(mode: Mode) -> Self {
        Self {
            activated: false,
            expired: false,
            mode,
            days_remaining: None,
            hours_remaining: None,
            activation_type: None,
            key: None,
        }
    }

    /// Returns true if activation-dependent features may run.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.activated && !self.expired
    }
}

/// Derives the status of `record` at `now` against `deadline`.
///
/// `deadline` is whichever expiry is authoritative for `mode`; `None` means
/// no deadline applies and the installation stays authorized. Pure.
#[must_use]
pub fn present(
    record: &ActivationRecord,
    mode: Mode,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ActivationStatus {
    let Some(key) = &record.key else {
        return ActivationStatus::unactivated(mode);
    };

    let (activated, days, hours) = match deadline {
        None => (true, None, None),
        Some(deadline) => {
            let remaining = deadline - now;
            let secs = remaining.num_seconds().max(0);
            (
                remaining > chrono::Duration::zero(),
                Some(secs / SECS_PER_DAY),
                Some(secs / SECS_PER_HOUR),
            )
        }
    };

    ActivationStatus {
        activated,
        expired: !activated,
        mode,
        days_remaining: days,
        hours_remaining: hours,
        activation_type: Some(record.activation_type),
        key: Some(key.to_string()),
    }
}

const SECS_PER_HOUR: i64 = 60 * 60;
const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;
