//! Activation key normalization and shape validation.
//!
//! Keys are typed by hand, so the canonical form is recovered from whatever
//! the user entered: surrounding whitespace is dropped, letters are
//! uppercased and internal whitespace runs become a single hyphen.
//!
//! The canonical shape is `XXXX-XXXX-XXXX-XXXX` where every `X` is an ASCII
//! uppercase letter or digit. Anything else is rejected locally, before a
//! network round-trip is spent on it.

use crate::error::{ActivationError, ActivationResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hyphen-separated groups in a key.
pub const KEY_GROUPS: usize = 4;

/// Number of characters per group.
pub const GROUP_LEN: usize = 4;

/// The kind of entitlement a key grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    /// Time-limited evaluation key.
    Trial,
    /// Purchased key or subscription.
    Paid,
    /// Not activated, or a type this build does not recognize.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ActivationType {
    /// Returns the lowercase wire/storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Paid => "paid",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized activation key.
///
/// Produced by [`ActivationKey::normalize`], which never fails. Use
/// [`ActivationKey::parse`] when the key must also be well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationKey(String);

impl ActivationKey {
    /// Normalizes raw user input.
    ///
    /// Trims, uppercases and collapses every internal whitespace run into a
    /// single hyphen. Total: malformed input still yields a key, which then
    /// fails [`is_well_formed`](Self::is_well_formed).
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let joined = raw.split_whitespace().collect::<Vec<_>>().join("-");
        Self(joined.to_uppercase())
    }

    /// Normalizes raw input and rejects anything not shaped like a key.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::MalformedKey`] if the normalized key is not
    /// four groups of four uppercase alphanumerics.
    pub fn parse(raw: &str) -> ActivationResult<Self> {
        let key = Self::normalize(raw);
        if key.is_well_formed() {
            Ok(key)
        } else {
            Err(ActivationError::MalformedKey(
                "expected format XXXX-XXXX-XXXX-XXXX".to_string(),
            ))
        }
    }

    /// Returns true iff the key is exactly `XXXX-XXXX-XXXX-XXXX`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let groups: Vec<&str> = self.0.split('-').collect();
        groups.len() == KEY_GROUPS
            && groups.iter().all(|g| {
                g.len() == GROUP_LEN
                    && g.bytes()
                        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            })
    }

    /// Returns the key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a log-safe rendering that only keeps the first group.
    #[must_use]
    pub fn masked(&self) -> String {
        let mut groups = self.0.split('-');
        let first = groups.next().unwrap_or_default();
        let rest = groups.map(|g| "*".repeat(g.chars().count()));
        std::iter::once(first.to_string())
            .chain(rest)
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActivationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
