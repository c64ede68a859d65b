//! Reconciliation engine: decides whether this installation is authorized.
//!
//! The engine merges the local record with the authority's answer:
//!
//! - no key on record: unactivated, no network call
//! - authority answered: its entitlement overwrites type, expiry and the
//!   last-check time, and the status is online
//! - authority unreachable: the record is left as it is and evaluated
//!   offline against its cached expiry, or against the last online check
//!   plus the offline grace window when no expiry is cached
//!
//! Store writes are serialized by an async mutex that is never held across
//! a network call. Each reconciliation takes a generation number; outcomes
//! older than the last applied one are discarded.

use crate::authority::{ActivationAuthority, RejectionKind, RemoteEntitlement};
use crate::clock::{Clock, SystemClock};
use crate::config::ActivationConfig;
use crate::error::{ActivationError, ActivationResult};
use crate::key::{ActivationKey, ActivationType};
use crate::record::ActivationRecord;
use crate::status::{present, ActivationStatus, Mode};
use crate::store::ActivationStore;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What the last applied reconciliation established.
#[derive(Debug)]
struct Applied {
    generation: u64,
    mode: Mode,
}

/// The activation decision core.
pub struct ActivationEngine {
    store: Arc<dyn ActivationStore>,
    authority: Arc<dyn ActivationAuthority>,
    clock: Arc<dyn Clock>,
    machine_id: String,
    offline_grace: chrono::Duration,
    request_timeout: Duration,
    next_generation: AtomicU64,
    applied: Mutex<Applied>,
}

impl ActivationEngine {
    /// Creates an engine with the default grace window and request timeout.
    pub fn new(
        store: Arc<dyn ActivationStore>,
        authority: Arc<dyn ActivationAuthority>,
        machine_id: impl Into<String>,
    ) -> Self {
        let defaults = ActivationConfig::default();
        Self {
            store,
            authority,
            clock: Arc::new(SystemClock),
            machine_id: machine_id.into(),
            offline_grace: defaults.offline_grace(),
            request_timeout: defaults.request_timeout(),
            next_generation: AtomicU64::new(0),
            applied: Mutex::new(Applied {
                generation: 0,
                mode: Mode::Offline,
            }),
        }
    }

    /// Creates an engine using the timing settings of `config`.
    pub fn with_config(
        config: &ActivationConfig,
        store: Arc<dyn ActivationStore>,
        authority: Arc<dyn ActivationAuthority>,
        machine_id: impl Into<String>,
    ) -> Self {
        Self::new(store, authority, machine_id)
            .with_offline_grace(config.offline_grace())
            .with_request_timeout(config.request_timeout())
    }

    /// Opens the SQLite store and HTTP authority described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a config or storage error if either cannot be set up.
    #[cfg(feature = "online")]
    pub fn open(config: &ActivationConfig, machine_id: impl Into<String>) -> ActivationResult<Self> {
        config.validate()?;
        let store = crate::store::SqliteActivationStore::open(&config.database_path)?;
        let authority = crate::http::HttpAuthority::new(config.authority.clone())?;
        Ok(Self::with_config(
            config,
            Arc::new(store),
            Arc::new(authority),
            machine_id,
        ))
    }

    /// Replaces the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the offline window used when no expiry is cached.
    #[must_use]
    pub fn with_offline_grace(mut self, grace: chrono::Duration) -> Self {
        self.offline_grace = grace;
        self
    }

    /// Sets the bound on each authority call.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns the machine id keys are bound to.
    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Reconciles the local record with the authority and returns the status.
    ///
    /// Network failures are absorbed into offline evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if the record cannot be read or
    /// written.
    pub async fn verify(&self) -> ActivationResult<ActivationStatus> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let record = self.record().await?;
        let Some(key) = record.key.clone() else {
            debug!("No activation key on record");
            return Ok(ActivationStatus::unactivated(Mode::Offline));
        };

        let outcome = self
            .bounded(self.authority.check_entitlement(&key, &self.machine_id))
            .await;

        let mut applied = self.applied.lock().await;
        let current = self.record().await?;
        let now = self.clock.now();

        if generation < applied.generation || current.key.as_ref() != Some(&key) {
            debug!("Discarding stale entitlement check (generation {generation})");
            return Ok(self.evaluate(&current, applied.mode, now));
        }

        match outcome {
            Ok(entitlement) => {
                let updated = fold_entitlement(current, &entitlement, now);
                self.persist(&updated).await?;
                *applied = Applied {
                    generation,
                    mode: Mode::Online,
                };
                let status = self.evaluate(&updated, Mode::Online, now);
                info!(
                    "Entitlement for {} confirmed online: valid={}, activated={}",
                    key.masked(),
                    entitlement.valid,
                    status.activated
                );
                Ok(status)
            }
            Err(e) if e.is_transient() => {
                warn!("Activation authority unreachable, using local record: {e}");
                *applied = Applied {
                    generation,
                    mode: Mode::Offline,
                };
                Ok(self.evaluate(&current, Mode::Offline, now))
            }
            Err(e) => Err(e),
        }
    }

    /// Redeems a user-entered key on this machine.
    ///
    /// Malformed keys fail before any network call. Redemption requires the
    /// authority; there is no offline path.
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey`, `InvalidKey`, `AlreadyActivatedElsewhere` or
    /// `Inactive` without touching the local record, `Network` if the
    /// authority could not be reached, or `Storage` if the new record could
    /// not be written.
    pub async fn redeem(&self, raw_key: &str) -> ActivationResult<ActivationStatus> {
        let key = ActivationKey::parse(raw_key)?;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Redeeming activation key {}", key.masked());

        let entitlement = self
            .bounded(self.authority.redeem(&key, &self.machine_id))
            .await?;

        if !entitlement.valid {
            let err = match entitlement.error_kind {
                Some(RejectionKind::InvalidKey) => ActivationError::InvalidKey,
                Some(RejectionKind::AlreadyActivatedElsewhere) => {
                    ActivationError::AlreadyActivatedElsewhere
                }
                Some(RejectionKind::Inactive) | None => ActivationError::Inactive,
            };
            warn!("Redemption of {} refused: {err}", key.masked());
            return Err(err);
        }

        let mut applied = self.applied.lock().await;
        let now = self.clock.now();
        let record = ActivationRecord::redeemed(
            key,
            entitlement.activation_type,
            entitlement.expires_at,
            self.machine_id.clone(),
            now,
        );
        self.persist(&record).await?;
        *applied = Applied {
            generation: applied.generation.max(generation),
            mode: Mode::Online,
        };
        info!("Activation key redeemed ({})", record.activation_type);
        Ok(self.evaluate(&record, Mode::Online, now))
    }

    /// Evaluates the local record offline, without contacting the authority.
    ///
    /// Does not wait for in-flight reconciliations.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if the record cannot be read.
    pub async fn status(&self) -> ActivationResult<ActivationStatus> {
        let record = self.record().await?;
        Ok(self.evaluate(&record, Mode::Offline, self.clock.now()))
    }

    /// Forgets the local activation. The server-side binding is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if the reset cannot be written.
    pub async fn deactivate(&self) -> ActivationResult<ActivationStatus> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut applied = self.applied.lock().await;
        self.persist(&ActivationRecord::unactivated(self.machine_id.clone()))
            .await?;
        *applied = Applied {
            generation: applied.generation.max(generation),
            mode: Mode::Offline,
        };
        info!("Local activation removed");
        Ok(ActivationStatus::unactivated(Mode::Offline))
    }

    /// Returns the record as this machine sees it.
    ///
    /// A record bound to a different machine id reads as unactivated.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if the record cannot be read.
    pub async fn record(&self) -> ActivationResult<ActivationRecord> {
        let store = Arc::clone(&self.store);
        let machine_id = self.machine_id.clone();
        let record = tokio::task::spawn_blocking(move || store.read(&machine_id))
            .await
            .map_err(|e| ActivationError::Storage(format!("store task failed: {e}")))??;

        if record.is_activated() && record.machine_id != self.machine_id {
            warn!("Activation record belongs to another machine; ignoring it");
            return Ok(ActivationRecord::unactivated(self.machine_id.clone()));
        }
        Ok(record)
    }

    async fn persist(&self, record: &ActivationRecord) -> ActivationResult<()> {
        let store = Arc::clone(&self.store);
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.write(&record))
            .await
            .map_err(|e| ActivationError::Storage(format!("store task failed: {e}")))?
    }

    async fn bounded<F>(&self, call: F) -> ActivationResult<RemoteEntitlement>
    where
        F: Future<Output = ActivationResult<RemoteEntitlement>>,
    {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(ActivationError::Network(format!(
                    "authority did not answer within {:?}",
                    self.request_timeout
                )))
            })
    }

    fn evaluate(&self, record: &ActivationRecord, mode: Mode, now: DateTime<Utc>) -> ActivationStatus {
        match mode {
            Mode::Online => present(record, mode, record.expires_at, now),
            Mode::Offline => {
                // Never let a clock set backwards reopen a closed window.
                let now = record.last_online_check_at.map_or(now, |t| now.max(t));
                present(record, mode, Some(self.offline_deadline(record)), now)
            }
        }
    }

    /// The instant after which the record stops authorizing offline use.
    #[must_use]
    pub fn offline_deadline(&self, record: &ActivationRecord) -> DateTime<Utc> {
        record
            .expires_at
            .or_else(|| {
                record
                    .last_online_check_at
                    .or(record.activated_at)
                    .map(|t| t + self.offline_grace)
            })
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Applies an authority answer to the record.
///
/// A refusal clamps the expiry to `now` so the record cannot authorize
/// offline use afterwards.
fn fold_entitlement(
    mut record: ActivationRecord,
    entitlement: &RemoteEntitlement,
    now: DateTime<Utc>,
) -> ActivationRecord {
    if entitlement.activation_type != ActivationType::Unknown {
        record.activation_type = entitlement.activation_type;
    }
    record.expires_at = if entitlement.valid {
        entitlement.expires_at
    } else {
        Some(entitlement.expires_at.map_or(now, |exp| exp.min(now)))
    };
    record.last_online_check_at = Some(now);
    record
}
