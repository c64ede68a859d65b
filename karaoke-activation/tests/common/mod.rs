//! Shared test helpers for activation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use karaoke_activation::{
    ActivationAuthority, ActivationEngine, ActivationError, ActivationKey, ActivationRecord,
    ActivationResult, ActivationStore, ActivationType, ManualClock, MemoryActivationStore,
    RejectionKind, RemoteEntitlement,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MACHINE: &str = "machine-a";
pub const OTHER_MACHINE: &str = "machine-b";
pub const KEY: &str = "AB12-CD34-EF56-GH78";

/// Fixed reference instant used by engine tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn key() -> ActivationKey {
    ActivationKey::parse(KEY).unwrap()
}

/// A paid record confirmed online at `checked_at`, expiring at `expires_at`.
pub fn paid_record(
    expires_at: Option<DateTime<Utc>>,
    checked_at: DateTime<Utc>,
) -> ActivationRecord {
    ActivationRecord {
        key: Some(key()),
        activation_type: ActivationType::Paid,
        activated_at: Some(checked_at - Duration::days(10)),
        expires_at,
        machine_id: MACHINE.to_string(),
        last_online_check_at: Some(checked_at),
    }
}

pub fn network_error() -> ActivationError {
    ActivationError::Network("connection refused".to_string())
}

struct Scripted {
    delay: std::time::Duration,
    result: ActivationResult<RemoteEntitlement>,
}

/// Authority that replays queued answers and counts calls.
#[derive(Default)]
pub struct ScriptedAuthority {
    redeem: Mutex<VecDeque<Scripted>>,
    check: Mutex<VecDeque<Scripted>>,
    redeem_calls: AtomicUsize,
    check_calls: AtomicUsize,
}

impl ScriptedAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_redeem(&self, result: ActivationResult<RemoteEntitlement>) {
        self.redeem.lock().unwrap().push_back(Scripted {
            delay: std::time::Duration::ZERO,
            result,
        });
    }

    pub fn push_check(&self, result: ActivationResult<RemoteEntitlement>) {
        self.push_check_after(std::time::Duration::ZERO, result);
    }

    pub fn push_check_after(
        &self,
        delay: std::time::Duration,
        result: ActivationResult<RemoteEntitlement>,
    ) {
        self.check
            .lock()
            .unwrap()
            .push_back(Scripted { delay, result });
    }

    pub fn redeem_calls(&self) -> usize {
        self.redeem_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    async fn replay(queue: &Mutex<VecDeque<Scripted>>) -> ActivationResult<RemoteEntitlement> {
        let next = queue.lock().unwrap().pop_front();
        match next {
            Some(scripted) => {
                if !scripted.delay.is_zero() {
                    tokio::time::sleep(scripted.delay).await;
                }
                scripted.result
            }
            None => Err(ActivationError::Network("no scripted answer".to_string())),
        }
    }
}

#[async_trait]
impl ActivationAuthority for ScriptedAuthority {
    async fn redeem(
        &self,
        _key: &ActivationKey,
        _machine_id: &str,
    ) -> ActivationResult<RemoteEntitlement> {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);
        Self::replay(&self.redeem).await
    }

    async fn check_entitlement(
        &self,
        _key: &ActivationKey,
        _machine_id: &str,
    ) -> ActivationResult<RemoteEntitlement> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        Self::replay(&self.check).await
    }
}

/// Store whose writes always fail.
pub struct ReadOnlyStore {
    inner: MemoryActivationStore,
}

impl ReadOnlyStore {
    pub fn with_record(record: ActivationRecord) -> Self {
        Self {
            inner: MemoryActivationStore::with_record(record),
        }
    }
}

impl ActivationStore for ReadOnlyStore {
    fn load(&self) -> ActivationResult<Option<ActivationRecord>> {
        self.inner.load()
    }

    fn write(&self, _record: &ActivationRecord) -> ActivationResult<()> {
        Err(ActivationError::Storage("disk full".to_string()))
    }
}

/// Store whose reads always fail.
pub struct UnreadableStore;

impl ActivationStore for UnreadableStore {
    fn load(&self) -> ActivationResult<Option<ActivationRecord>> {
        Err(ActivationError::Storage("database is locked".to_string()))
    }

    fn write(&self, _record: &ActivationRecord) -> ActivationResult<()> {
        Err(ActivationError::Storage("database is locked".to_string()))
    }
}

/// Everything an engine test needs to inspect afterwards.
pub struct Harness {
    pub engine: Arc<ActivationEngine>,
    pub store: Arc<MemoryActivationStore>,
    pub authority: Arc<ScriptedAuthority>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(record: Option<ActivationRecord>) -> Harness {
    let store = Arc::new(match record {
        Some(r) => MemoryActivationStore::with_record(r),
        None => MemoryActivationStore::new(),
    });
    let authority = Arc::new(ScriptedAuthority::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = ActivationEngine::new(store.clone(), authority.clone(), MACHINE)
        .with_clock(clock.clone())
        .with_offline_grace(Duration::hours(72))
        .with_request_timeout(std::time::Duration::from_secs(5));
    Harness {
        engine: Arc::new(engine),
        store,
        authority,
        clock,
    }
}

pub fn granted(expires_at: Option<DateTime<Utc>>) -> RemoteEntitlement {
    RemoteEntitlement::granted(ActivationType::Paid, expires_at)
}

pub fn refused(kind: RejectionKind) -> RemoteEntitlement {
    RemoteEntitlement::rejected(kind)
}
