//! SQLite persistence for sessions.
//!
//! The event log is the durable ground truth: events are stored append-only
//! and never deleted, even once covered by a snapshot, so any session can be
//! audited by full replay. Snapshots are an optimization — derived store
//! state serialized to JSON inside a BLOB column, tagged with the id of the
//! last event it covers, so restoration only replays the tail.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS sessions  (session_id, clock_tick, updated_at);
//! CREATE TABLE IF NOT EXISTS events    (session_id, event_id, tick, data);
//! CREATE TABLE IF NOT EXISTS snapshots (session_id, last_event_id, data,
//!                                       checksum, updated_at);
//! ```
//!
//! WAL mode allows concurrent reads during play. A CRC-32 checksum over the
//! snapshot bytes detects save corruption; a mismatch is fatal for the
//! session (`ReplayInconsistency`), never silently repaired — the full log
//! is still intact for manual recovery. SQLite lock contention past the
//! configured busy timeout surfaces as the recoverable `PersistenceTimeout`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::{ContinuityError, Result};
use crate::event::Event;
use crate::store::EntityStore;
use crate::types::{EventId, SessionId};

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as a lowercase hex string. Shared with replay
/// verification so checksums read the same everywhere.
pub(crate) fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SessionStore trait
// ---------------------------------------------------------------------------

/// A snapshot of derived store state, tagged with its coverage checkpoint.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    /// Last event id the snapshot covers.
    pub last_event_id: EventId,
    /// The restored entity store.
    pub store: EntityStore,
}

/// Everything needed to resume a session.
#[derive(Debug, Clone)]
pub struct SavedSession {
    /// The session.
    pub session_id: SessionId,
    /// Clock tick at last save.
    pub clock_tick: u64,
    /// The full event log, in total order.
    pub events: Vec<Event>,
    /// Latest valid snapshot, if one was saved.
    pub snapshot: Option<SnapshotRecord>,
}

impl SavedSession {
    /// Events after the snapshot checkpoint — what restoration must replay.
    #[must_use]
    pub fn tail_events(&self) -> &[Event] {
        let start = self.snapshot.as_ref().map_or(0, |s| {
            (s.last_event_id.0 as usize + 1).min(self.events.len())
        });
        &self.events[start..]
    }
}

/// Durable storage interface for sessions.
///
/// The SQLite implementation is the production one; the trait seam exists so
/// tests and embedders can supply their own (an in-memory fake, a different
/// engine).
pub trait SessionStore {
    /// Load a session's saved state, or `None` if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::ReplayInconsistency`] on snapshot checksum
    /// mismatch, [`ContinuityError::PersistenceTimeout`] on lock contention,
    /// or [`ContinuityError::Database`] on other SQLite failures.
    fn load(&self, session_id: SessionId) -> Result<Option<SavedSession>>;

    /// Append new events and record the clock tick. Append-only: existing
    /// event rows are never modified, and re-appending an already-stored id
    /// is a no-op (idempotent save).
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::PersistenceTimeout`] or
    /// [`ContinuityError::Database`].
    fn append_events(
        &mut self,
        session_id: SessionId,
        events: &[Event],
        clock_tick: u64,
    ) -> Result<()>;

    /// Save a snapshot of derived state at its current checkpoint.
    /// Overwrites any previous snapshot; the event log is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::Serialization`],
    /// [`ContinuityError::PersistenceTimeout`] or
    /// [`ContinuityError::Database`].
    fn save_snapshot(&mut self, store: &EntityStore, clock_tick: u64) -> Result<()>;

    /// All sessions with stored state.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::Database`] on SQLite failures.
    fn list_sessions(&self) -> Result<Vec<SessionId>>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// SQLite-backed [`SessionStore`].
pub struct SqliteSessionStore {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        clock_tick INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS events (
        session_id TEXT NOT NULL,
        event_id   INTEGER NOT NULL,
        tick       INTEGER NOT NULL,
        data       BLOB NOT NULL,
        PRIMARY KEY (session_id, event_id)
    );
    CREATE TABLE IF NOT EXISTS snapshots (
        session_id    TEXT PRIMARY KEY,
        last_event_id INTEGER NOT NULL,
        data          BLOB NOT NULL,
        checksum      TEXT,
        updated_at    TEXT NOT NULL
    );
";

impl SqliteSessionStore {
    /// Open (or create) the database at `path`, creating the schema and
    /// applying the configured pragmas.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(&format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Session store opened"
        );

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (tests, ephemeral sessions).
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run SQLite's integrity check; `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::Database`] if the check query itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, session_id: SessionId) -> Result<Option<SavedSession>> {
        let start = Instant::now();
        let id_str = session_id.to_string();

        let clock_tick: Option<i64> = self
            .conn
            .query_row(
                "SELECT clock_tick FROM sessions WHERE session_id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| timeout_or_db("load", e))?;
        let Some(clock_tick) = clock_tick else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT data FROM events WHERE session_id = ?1 ORDER BY event_id",
        )?;
        let rows = stmt.query_map(params![id_str], |row| row.get::<_, Vec<u8>>(0))?;
        let mut events = Vec::new();
        for row in rows {
            let data = row?;
            let event: Event = serde_json::from_slice(&data)
                .map_err(|e| ContinuityError::Serialization(e.to_string()))?;
            events.push(event);
        }

        let snapshot = self.load_snapshot(session_id)?;

        info!(
            session = %session_id,
            events = events.len(),
            snapshot = snapshot.is_some(),
            elapsed_us = start.elapsed().as_micros(),
            "Session loaded"
        );

        #[allow(clippy::cast_sign_loss)]
        let clock_tick = clock_tick as u64;
        Ok(Some(SavedSession {
            session_id,
            clock_tick,
            events,
            snapshot,
        }))
    }

    fn append_events(
        &mut self,
        session_id: SessionId,
        events: &[Event],
        clock_tick: u64,
    ) -> Result<()> {
        let start = Instant::now();
        let id_str = session_id.to_string();
        let now = Utc::now().to_rfc3339();

        let tx = self
            .conn
            .transaction()
            .map_err(|e| timeout_or_db("append_events", e))?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO events (session_id, event_id, tick, data)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id, event_id) DO NOTHING",
            )?;
            for event in events {
                let data = serde_json::to_vec(event)
                    .map_err(|e| ContinuityError::Serialization(e.to_string()))?;
                #[allow(clippy::cast_possible_wrap)]
                stmt.execute(params![id_str, event.id.0 as i64, event.tick as i64, data])
                    .map_err(|e| timeout_or_db("append_events", e))?;
            }
        }
        #[allow(clippy::cast_possible_wrap)]
        tx.execute(
            "INSERT INTO sessions (session_id, clock_tick, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET
                clock_tick = excluded.clock_tick,
                updated_at = excluded.updated_at",
            params![id_str, clock_tick as i64, now],
        )
        .map_err(|e| timeout_or_db("append_events", e))?;
        tx.commit().map_err(|e| timeout_or_db("append_events", e))?;

        debug!(
            session = %session_id,
            appended = events.len(),
            clock_tick,
            elapsed_us = start.elapsed().as_micros(),
            "Events persisted"
        );
        Ok(())
    }

    fn save_snapshot(&mut self, store: &EntityStore, clock_tick: u64) -> Result<()> {
        let Some(last_event_id) = store.last_applied() else {
            return Ok(()); // nothing applied yet, nothing worth snapshotting
        };
        let start = Instant::now();
        let session_id = store.session_id();
        let id_str = session_id.to_string();

        let data = serde_json::to_vec(store)
            .map_err(|e| ContinuityError::Serialization(e.to_string()))?;
        let checksum = if self.config.checksum_enabled {
            Some(crc32_hex(&data))
        } else {
            None
        };
        let now = Utc::now().to_rfc3339();

        #[allow(clippy::cast_possible_wrap)]
        self.conn
            .execute(
                "INSERT INTO snapshots (session_id, last_event_id, data, checksum, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(session_id) DO UPDATE SET
                    last_event_id = excluded.last_event_id,
                    data = excluded.data,
                    checksum = excluded.checksum,
                    updated_at = excluded.updated_at",
                params![id_str, last_event_id.0 as i64, data, checksum, now],
            )
            .map_err(|e| timeout_or_db("save_snapshot", e))?;

        // Keep the session row's clock in step with the snapshot.
        #[allow(clippy::cast_possible_wrap)]
        self.conn
            .execute(
                "INSERT INTO sessions (session_id, clock_tick, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET
                    clock_tick = excluded.clock_tick,
                    updated_at = excluded.updated_at",
                params![id_str, clock_tick as i64, now],
            )
            .map_err(|e| timeout_or_db("save_snapshot", e))?;

        debug!(
            session = %session_id,
            checkpoint = %last_event_id,
            bytes = data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT session_id FROM sessions ORDER BY session_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut sessions = Vec::new();
        for row in rows {
            let id_str = row?;
            if let Ok(uuid) = uuid::Uuid::parse_str(&id_str) {
                sessions.push(SessionId(uuid));
            }
        }
        Ok(sessions)
    }
}

impl SqliteSessionStore {
    fn load_snapshot(&self, session_id: SessionId) -> Result<Option<SnapshotRecord>> {
        let id_str = session_id.to_string();
        let row: Option<(i64, Vec<u8>, Option<String>)> = self
            .conn
            .prepare_cached(
                "SELECT last_event_id, data, checksum FROM snapshots WHERE session_id = ?1",
            )?
            .query_row(params![id_str], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()
            .map_err(|e| timeout_or_db("load", e))?;
        let Some((last_event_id, data, stored_checksum)) = row else {
            return Ok(None);
        };

        #[allow(clippy::cast_sign_loss)]
        let last_event_id = EventId(last_event_id as u64);

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    return Err(ContinuityError::ReplayInconsistency {
                        session_id,
                        last_event_id: Some(last_event_id),
                        expected,
                        actual,
                    });
                }
            }
        }

        let store: EntityStore = serde_json::from_slice(&data)
            .map_err(|e| ContinuityError::Serialization(e.to_string()))?;
        Ok(Some(SnapshotRecord {
            last_event_id,
            store,
        }))
    }
}

/// Map SQLite lock contention (past the busy timeout) to the recoverable
/// timeout error; everything else stays a database error.
fn timeout_or_db(operation: &str, error: rusqlite::Error) -> ContinuityError {
    let busy = matches!(
        error.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    if busy {
        ContinuityError::PersistenceTimeout {
            operation: operation.to_string(),
        }
    } else {
        ContinuityError::Database(error)
    }
}

/// Extension trait adding an `.optional()` combinator to `rusqlite::Result`,
/// converting `Err(QueryReturnedNoRows)` into `Ok(None)`.
trait OptionalExt<T> {
    /// Convert `QueryReturnedNoRows` into `Ok(None)`.
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecayConfig;
    use crate::event::{EventDraft, EventKind, EventLog};
    use crate::types::CharacterId;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    fn sample_session() -> (SessionId, EventLog, EntityStore) {
        let session = SessionId::new();
        let mut log = EventLog::new(session);
        let mut store = EntityStore::new(session);
        let config = DecayConfig::default();
        let hero = CharacterId::new();
        for (tick, kind, summary) in [
            (0, EventKind::Dialogue, "a quiet morning"),
            (2, EventKind::Kindness, "bread shared with a beggar"),
            (5, EventKind::Conflict, "words turn sharp at the well"),
        ] {
            let id = log
                .append(
                    EventDraft::new(tick, kind, summary)
                        .actors(vec![hero])
                        .weighted(0.2, 0.6),
                )
                .expect("append");
            let event = log.get(id).expect("stored").clone();
            store.apply(&event, &config).expect("apply");
        }
        (session, log, store)
    }

    #[test]
    fn load_unknown_session_is_none() {
        let store = SqliteSessionStore::open_in_memory(&test_config()).expect("open");
        assert!(store.load(SessionId::new()).expect("load").is_none());
    }

    #[test]
    fn events_round_trip_in_order() {
        let mut db = SqliteSessionStore::open_in_memory(&test_config()).expect("open");
        let (session, log, _) = sample_session();

        db.append_events(session, log.events(), 5).expect("persist");
        let saved = db.load(session).expect("load").expect("Some");

        assert_eq!(saved.clock_tick, 5);
        assert_eq!(saved.events.len(), 3);
        let ids: Vec<u64> = saved.events.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(saved.events[1].summary, "bread shared with a beggar");
    }

    #[test]
    fn reappending_stored_events_is_idempotent() {
        let mut db = SqliteSessionStore::open_in_memory(&test_config()).expect("open");
        let (session, log, _) = sample_session();

        db.append_events(session, log.events(), 5).expect("first");
        db.append_events(session, log.events(), 5).expect("second");

        let saved = db.load(session).expect("load").expect("Some");
        assert_eq!(saved.events.len(), 3);
    }

    #[test]
    fn snapshot_round_trip_with_tail() {
        let mut db = SqliteSessionStore::open_in_memory(&test_config()).expect("open");
        let (session, mut log, mut store) = sample_session();
        let config = DecayConfig::default();

        // Snapshot at event #2, then one more event arrives.
        db.append_events(session, log.events(), 5).expect("persist");
        db.save_snapshot(&store, 5).expect("snapshot");

        let id = log
            .append(EventDraft::new(8, EventKind::Dialogue, "a late visitor"))
            .expect("append");
        let event = log.get(id).expect("stored").clone();
        store.apply(&event, &config).expect("apply");
        db.append_events(session, &[event], 8).expect("persist tail");

        let saved = db.load(session).expect("load").expect("Some");
        let snapshot = saved.snapshot.as_ref().expect("snapshot present");
        assert_eq!(snapshot.last_event_id, EventId(2));
        assert_eq!(saved.tail_events().len(), 1);
        assert_eq!(saved.tail_events()[0].summary, "a late visitor");
        assert_eq!(snapshot.store.last_applied(), Some(EventId(2)));
    }

    #[test]
    fn corrupted_snapshot_checksum_is_fatal() {
        let mut db = SqliteSessionStore::open_in_memory(&test_config()).expect("open");
        let (session, log, store) = sample_session();

        db.append_events(session, log.events(), 5).expect("persist");
        db.save_snapshot(&store, 5).expect("snapshot");

        db.conn
            .execute(
                "UPDATE snapshots SET checksum = 'deadbeef' WHERE session_id = ?1",
                params![session.to_string()],
            )
            .expect("corrupt");

        let err = db.load(session).expect_err("corruption must surface");
        assert!(matches!(
            err,
            ContinuityError::ReplayInconsistency { session_id, .. } if session_id == session
        ));
    }

    #[test]
    fn checksum_disabled_skips_verification() {
        let config = PersistenceConfig {
            checksum_enabled: false,
            ..PersistenceConfig::default()
        };
        let mut db = SqliteSessionStore::open_in_memory(&config).expect("open");
        let (session, log, store) = sample_session();
        db.append_events(session, log.events(), 5).expect("persist");
        db.save_snapshot(&store, 5).expect("snapshot");
        let saved = db.load(session).expect("load").expect("Some");
        assert!(saved.snapshot.is_some());
    }

    #[test]
    fn list_sessions_returns_saved_ids() {
        let mut db = SqliteSessionStore::open_in_memory(&test_config()).expect("open");
        let (s1, log1, _) = sample_session();
        let (s2, log2, _) = sample_session();
        db.append_events(s1, log1.events(), 5).expect("persist");
        db.append_events(s2, log2.events(), 5).expect("persist");

        let sessions = db.list_sessions().expect("list");
        assert_eq!(sessions.len(), 2);
        assert!(sessions.contains(&s1));
        assert!(sessions.contains(&s2));
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("continuity.db");
        let (session, log, store) = sample_session();

        {
            let mut db = SqliteSessionStore::open(&path, &test_config()).expect("open");
            db.append_events(session, log.events(), 5).expect("persist");
            db.save_snapshot(&store, 5).expect("snapshot");
        }

        let db = SqliteSessionStore::open(&path, &test_config()).expect("reopen");
        assert!(db.integrity_check().expect("integrity"));
        let saved = db.load(session).expect("load").expect("Some");
        assert_eq!(saved.events.len(), 3);
        assert!(saved.snapshot.is_some());
    }

    #[test]
    fn crc32_known_vector() {
        // CRC-32 of "123456789" = 0xCBF43926
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}
