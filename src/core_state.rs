//! Shared engine state.
//!
//! `CoreState` is built once at startup and shared behind an `Arc` by the
//! HTTP layer and the sweep scheduler. Connections are opened per call; the
//! per-patient timeline locks serialize writers to one patient's doses.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;
use uuid::Uuid;

use crate::api::ApiServer;
use crate::config::EngineConfig;
use crate::db::{self, AuditRecord, DATETIME_FORMAT};

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

/// Audit rows older than this are pruned on flush.
const AUDIT_RETENTION_DAYS: i64 = 90;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    db_path: PathBuf,
    config: EngineConfig,
    /// One mutex per patient timeline, created on first use.
    timelines: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Running API server handle. Uses tokio Mutex for async.
    pub api_server: tokio::sync::Mutex<Option<ApiServer>>,
    /// Audit log for writes and overrides.
    audit: AuditLogger,
}

impl CoreState {
    /// Open (and migrate) the configured database, then build the state.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Storage(e.to_string()))?;
        }
        // Opening once runs migrations before any handler races for them.
        db::open_database(&db_path)?;

        Ok(Self {
            db_path,
            config,
            timelines: Mutex::new(HashMap::new()),
            api_server: tokio::sync::Mutex::new(None),
            audit: AuditLogger::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    /// Open a database connection.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    // ── Patient timelines ───────────────────────────────────

    fn timeline_lock(&self, patient_id: &Uuid) -> Result<Arc<Mutex<()>>, CoreError> {
        let mut map = self.timelines.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(map.entry(*patient_id).or_default().clone())
    }

    /// Drop the patient's entry once no other caller holds or awaits it.
    fn release_timeline(&self, patient_id: &Uuid, lock: Arc<Mutex<()>>) {
        drop(lock);
        if let Ok(mut map) = self.timelines.lock() {
            if map.get(patient_id).is_some_and(|l| Arc::strong_count(l) == 1) {
                map.remove(patient_id);
            }
        }
    }

    /// Run `f` as the single writer of a patient's timeline.
    ///
    /// The patient's lock is held for the whole call and released before
    /// returning. Callers must not nest timelines of different patients.
    pub fn with_patient_timeline<T, E>(
        &self,
        patient_id: &Uuid,
        f: impl FnOnce(&mut Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<CoreError>,
    {
        let lock = self.timeline_lock(patient_id)?;
        let result = {
            // Guards `()`; a poisoned lock holds no state and stays usable.
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            match self.open_db() {
                Ok(mut conn) => f(&mut conn),
                Err(e) => Err(e.into()),
            }
        };
        self.release_timeline(patient_id, lock);
        result
    }

    // ── Audit logging ───────────────────────────────────────

    /// Log an access event. Auto-flushes to DB when buffer is full.
    pub fn log_access(&self, source: AccessSource, action: &str, entity: &str, patient_id: Option<Uuid>) {
        let needs_flush = self.audit.log(source, action, entity, patient_id);
        if needs_flush {
            if let Err(e) = self.flush_and_prune_audit() {
                tracing::warn!("Auto-flush audit failed: {e}");
            }
        }
    }

    /// Current audit buffer contents.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Flush audit buffer to DB and prune entries past retention.
    pub fn flush_and_prune_audit(&self) -> Result<(), CoreError> {
        let conn = self.open_db()?;
        self.audit.flush_to_db(&conn)?;
        if let Err(e) = db::prune_audit_log(&conn, AUDIT_RETENTION_DAYS) {
            tracing::warn!("Failed to prune audit log: {e}");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Storage error: {0}")]
    Storage(String),
}

// ═══════════════════════════════════════════════════════════
// Access source tracking
// ═══════════════════════════════════════════════════════════

/// Identifies who caused an audited event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    /// An HTTP request with no identified actor.
    Api,
    /// The background sweep.
    Scheduler,
    /// A known doctor, caretaker or staff member.
    Actor(Uuid),
}

impl std::fmt::Display for AccessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Scheduler => write!(f, "scheduler"),
            Self::Actor(id) => write!(f, "actor:{id}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

/// In-memory audit log buffer. Entries are flushed to SQLite
/// when the buffer reaches capacity or on explicit flush.
pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
}

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: AccessSource,
    pub action: String,
    pub entity: String,
    pub patient_id: Option<Uuid>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Buffer an event. Returns `true` once the flush threshold is reached.
    pub fn log(&self, source: AccessSource, action: &str, entity: &str, patient_id: Option<Uuid>) -> bool {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(AuditEntry {
                timestamp: chrono::Utc::now(),
                source,
                action: action.to_string(),
                entity: entity.to_string(),
                patient_id,
            });
            buf.len() >= AUDIT_BUFFER_CAPACITY
        } else {
            false
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Write buffered entries to the audit_log table.
    pub fn flush_to_db(&self, conn: &Connection) -> Result<usize, CoreError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }

        let records: Vec<AuditRecord> = entries
            .iter()
            .map(|e| AuditRecord {
                timestamp: e.timestamp.format(DATETIME_FORMAT).to_string(),
                source: e.source.to_string(),
                action: e.action.clone(),
                entity: e.entity.clone(),
                patient_id: e.patient_id.map(|id| id.to_string()),
            })
            .collect();

        db::insert_audit_entries(conn, &records)?;

        tracing::debug!(count = records.len(), "Flushed audit entries to database");
        Ok(records.len())
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::test_support::test_core;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn new_state_creates_database() {
        let (dir, core) = test_core();
        assert!(core.db_path().starts_with(dir.path()));
        assert!(core.db_path().exists());
        core.open_db().unwrap();
    }

    #[test]
    fn audit_logger_records_entries() {
        let logger = AuditLogger::new();
        assert_eq!(logger.buffer_len(), 0);

        let patient = Uuid::new_v4();
        logger.log(AccessSource::Api, "patient.condition", "patient", Some(patient));
        assert_eq!(logger.buffer_len(), 1);

        let entries = logger.entries();
        assert_eq!(entries[0].action, "patient.condition");
        assert_eq!(entries[0].source, AccessSource::Api);
        assert_eq!(entries[0].patient_id, Some(patient));
    }

    #[test]
    fn audit_logger_drain_clears_buffer() {
        let logger = AuditLogger::new();
        logger.log(AccessSource::Api, "action1", "entity1", None);
        logger.log(AccessSource::Scheduler, "action2", "entity2", None);
        assert_eq!(logger.drain().len(), 2);
        assert_eq!(logger.buffer_len(), 0);
    }

    #[test]
    fn audit_log_returns_true_at_capacity() {
        let logger = AuditLogger::new();
        for i in 0..(AUDIT_BUFFER_CAPACITY - 1) {
            assert!(!logger.log(AccessSource::Api, &format!("action_{i}"), "entity", None));
        }
        assert!(logger.log(AccessSource::Api, "action_final", "entity", None));
    }

    #[test]
    fn audit_flush_to_db_persists_entries() {
        let conn = open_memory_database().unwrap();
        let logger = AuditLogger::new();
        let patient = Uuid::new_v4();
        let doctor = Uuid::new_v4();
        logger.log(AccessSource::Actor(doctor), "dose.doctor_override", "dose:1", Some(patient));
        logger.log(AccessSource::Api, "medicine.create", "medicine", None);

        assert_eq!(logger.flush_to_db(&conn).unwrap(), 2);
        assert_eq!(logger.buffer_len(), 0);

        let rows = db::query_audit_by_patient(&conn, &patient.to_string()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, format!("actor:{doctor}"));
    }

    #[test]
    fn audit_flush_empty_buffer_is_noop() {
        let conn = open_memory_database().unwrap();
        assert_eq!(AuditLogger::new().flush_to_db(&conn).unwrap(), 0);
    }

    #[test]
    fn access_source_display() {
        let id = Uuid::nil();
        assert_eq!(AccessSource::Api.to_string(), "api");
        assert_eq!(AccessSource::Scheduler.to_string(), "scheduler");
        assert_eq!(
            AccessSource::Actor(id).to_string(),
            "actor:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn core_error_display() {
        assert_eq!(CoreError::LockPoisoned.to_string(), "Internal lock error");
    }

    #[test]
    fn same_patient_timeline_serializes_writers() {
        let (_dir, core) = test_core();
        let core = Arc::new(core);
        let patient = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let core = Arc::clone(&core);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    core.with_patient_timeline(&patient, |_conn| {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, CoreError>(())
                    })
                    .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_timelines_are_pruned() {
        let (_dir, core) = test_core();
        for _ in 0..5 {
            let patient = Uuid::new_v4();
            core.with_patient_timeline(&patient, |_| Ok::<_, CoreError>(())).unwrap();
        }
        assert!(core.timelines.lock().unwrap().is_empty());
    }

    #[test]
    fn panicked_writer_does_not_lock_patient_out() {
        let (_dir, core) = test_core();
        let patient = Uuid::new_v4();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            core.with_patient_timeline(&patient, |_| -> Result<(), CoreError> {
                panic!("writer failed mid-update")
            })
        }));
        assert!(outcome.is_err());

        let value = core.with_patient_timeline(&patient, |_| Ok::<_, CoreError>(7)).unwrap();
        assert_eq!(value, 7);
        assert!(core.timelines.lock().unwrap().is_empty());
    }

    #[test]
    fn flush_and_prune_writes_to_state_database() {
        let (_dir, core) = test_core();
        let patient = Uuid::new_v4();
        core.log_access(AccessSource::Api, "patient.caretaker", "patient", Some(patient));
        core.flush_and_prune_audit().unwrap();
        assert!(core.audit_entries().is_empty());

        let conn = core.open_db().unwrap();
        assert_eq!(db::query_audit_by_patient(&conn, &patient.to_string()).unwrap().len(), 1);
    }
}
