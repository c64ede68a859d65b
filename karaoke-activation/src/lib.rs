//! Activation key licensing for the karaoke desktop app.
//!
//! This crate handles:
//! - Activation key normalization and shape checks
//! - Redemption and entitlement checks against the activation server
//! - A single persisted activation record bound to this machine
//! - Online/offline reconciliation of that record into a user-facing status
//!
//! # Design Principles
//!
//! - **Server is the source of truth**: whenever it answers, its entitlement wins
//! - **Outages never degrade**: an unreachable server leaves the local record untouched
//! - **Outages never extend**: offline use ends at the last confirmed expiry
//! - **Online-only redemption**: a key can only be first redeemed while online
//!
//! # Key Format
//!
//! Keys are four groups of four uppercase letters or digits:
//! `XXXX-XXXX-XXXX-XXXX`. Input is trimmed, uppercased and has whitespace
//! runs turned into hyphens before the shape check.

mod authority;
mod clock;
mod config;
mod engine;
mod error;
#[cfg(feature = "online")]
mod http;
mod key;
mod machine;
mod record;
mod status;
mod store;

pub use authority::{ActivationAuthority, RejectionKind, RemoteEntitlement};
pub use clock::{parse_server_timestamp, Clock, ManualClock, SystemClock};
pub use config::{default_database_path, ActivationConfig, AuthorityConfig};
pub use engine::ActivationEngine;
pub use error::{ActivationError, ActivationResult};
pub use key::{ActivationKey, ActivationType, GROUP_LEN, KEY_GROUPS};
pub use machine::MachineFingerprint;
pub use record::ActivationRecord;
pub use status::{present, ActivationStatus, Mode};
pub use store::{ActivationStore, MemoryActivationStore, SqliteActivationStore};

#[cfg(feature = "online")]
pub use http::HttpAuthority;
