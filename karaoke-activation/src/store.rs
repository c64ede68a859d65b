//! Local persistence for the activation record.
//!
//! The store holds exactly one row. Writes replace it as a whole inside a
//! transaction, so a crash mid-write leaves the previous record intact.

use crate::error::{ActivationError, ActivationResult};
use crate::key::{ActivationKey, ActivationType};
use crate::record::ActivationRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Durable storage for the single activation record.
pub trait ActivationStore: Send + Sync {
    /// Loads the stored record, or `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if the medium is unreadable or
    /// the stored row is corrupt.
    fn load(&self) -> ActivationResult<Option<ActivationRecord>>;

    /// Atomically replaces the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if the write could not be
    /// committed. The previous record is left untouched in that case.
    fn write(&self, record: &ActivationRecord) -> ActivationResult<()>;

    /// Returns the stored record, or the unactivated record for `machine_id`.
    ///
    /// # Errors
    ///
    /// Propagates [`load`](Self::load) failures; a missing row is not one.
    fn read(&self, machine_id: &str) -> ActivationResult<ActivationRecord> {
        Ok(self
            .load()?
            .unwrap_or_else(|| ActivationRecord::unactivated(machine_id)))
    }
}

fn ensure_consistent(record: &ActivationRecord) -> ActivationResult<()> {
    if record.is_consistent() {
        Ok(())
    } else {
        Err(ActivationError::Storage(
            "refusing to persist a typed record without a key".to_string(),
        ))
    }
}

/// Persistent store backed by SQLite.
pub struct SqliteActivationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteActivationStore {
    /// Opens (or creates) a store at the given path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if the directory or database
    /// cannot be created, or the schema cannot be initialized.
    pub fn open(path: &Path) -> ActivationResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ActivationError::Storage(format!(
                    "failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            ActivationError::Storage(format!("failed to open activation store: {e}"))
        })?;
        debug!("Opened activation store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory SQLite store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Storage`] if SQLite cannot allocate the
    /// database.
    pub fn open_in_memory() -> ActivationResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ActivationError::Storage(format!("failed to open in-memory activation store: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> ActivationResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> ActivationResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ActivationError::Storage("activation store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> ActivationResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS activation_record (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                activation_key TEXT,
                activation_type TEXT NOT NULL,
                activated_at INTEGER,
                expires_at INTEGER,
                machine_id TEXT NOT NULL,
                last_online_check_at INTEGER,
                updated_at INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| ActivationError::Storage(format!("failed to init activation schema: {e}")))?;
        Ok(())
    }
}

type RawRow = (
    Option<String>,
    String,
    Option<i64>,
    Option<i64>,
    String,
    Option<i64>,
);

impl ActivationStore for SqliteActivationStore {
    fn load(&self) -> ActivationResult<Option<ActivationRecord>> {
        let conn = self.lock()?;
        let row: Option<RawRow> = conn
            .query_row(
                "SELECT activation_key, activation_type, activated_at, expires_at, machine_id, last_online_check_at
                 FROM activation_record WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| ActivationError::Storage(format!("failed to read activation record: {e}")))?;

        let Some((key, activation_type, activated_at, expires_at, machine_id, last_check)) = row
        else {
            return Ok(None);
        };

        let key = match key {
            Some(raw) => {
                let key = ActivationKey::normalize(&raw);
                if !key.is_well_formed() {
                    return Err(ActivationError::Storage(
                        "stored activation key is corrupt".to_string(),
                    ));
                }
                Some(key)
            }
            None => None,
        };

        let record = ActivationRecord {
            key,
            activation_type: decode_activation_type(&activation_type)?,
            activated_at: decode_millis(activated_at, "activated_at")?,
            expires_at: decode_millis(expires_at, "expires_at")?,
            machine_id,
            last_online_check_at: decode_millis(last_check, "last_online_check_at")?,
        };
        if !record.is_consistent() {
            return Err(ActivationError::Storage(
                "stored activation record has a type but no key".to_string(),
            ));
        }
        Ok(Some(record))
    }

    fn write(&self, record: &ActivationRecord) -> ActivationResult<()> {
        ensure_consistent(record)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO activation_record
             (id, activation_key, activation_type, activated_at, expires_at, machine_id, last_online_check_at, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.key.as_ref().map(ActivationKey::as_str),
                record.activation_type.as_str(),
                record.activated_at.map(|t| t.timestamp_millis()),
                record.expires_at.map(|t| t.timestamp_millis()),
                record.machine_id,
                record.last_online_check_at.map(|t| t.timestamp_millis()),
                Utc::now().timestamp_millis(),
            ],
        )
        .map_err(|e| ActivationError::Storage(format!("failed to write activation record: {e}")))?;
        tx.commit()
            .map_err(|e| ActivationError::Storage(format!("failed to commit activation record: {e}")))?;
        Ok(())
    }
}

fn decode_activation_type(raw: &str) -> ActivationResult<ActivationType> {
    match raw {
        "trial" => Ok(ActivationType::Trial),
        "paid" => Ok(ActivationType::Paid),
        "unknown" => Ok(ActivationType::Unknown),
        other => Err(ActivationError::Storage(format!(
            "stored activation type is unknown: {other}"
        ))),
    }
}

fn decode_millis(value: Option<i64>, field: &str) -> ActivationResult<Option<DateTime<Utc>>> {
    value
        .map(|ms| {
            DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                ActivationError::Storage(format!("stored {field} is out of range: {ms}"))
            })
        })
        .transpose()
}

/// Volatile store for tests and sessions that must not touch disk.
#[derive(Default)]
pub struct MemoryActivationStore {
    record: Mutex<Option<ActivationRecord>>,
}

impl MemoryActivationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `record`.
    #[must_use]
    pub fn with_record(record: ActivationRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl ActivationStore for MemoryActivationStore {
    fn load(&self) -> ActivationResult<Option<ActivationRecord>> {
        self.record
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| ActivationError::Storage("activation store lock poisoned".to_string()))
    }

    fn write(&self, record: &ActivationRecord) -> ActivationResult<()> {
        ensure_consistent(record)?;
        let mut guard = self
            .record
            .lock()
            .map_err(|_| ActivationError::Storage("activation store lock poisoned".to_string()))?;
        *guard = Some(record.clone());
        Ok(())
    }
}
