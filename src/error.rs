//! Error types for the continuity engine.
//!
//! Every surfaced failure carries enough context (session id, tick, offending
//! event id) for caller-side diagnostics. Budget exhaustion during digest
//! assembly is deliberately *not* an error — it is reported on the manifest.

use thiserror::Error;

use crate::types::{EventId, SessionId};

/// Top-level error type for all continuity-engine operations.
#[derive(Error, Debug)]
pub enum ContinuityError {
    /// An event append violated tick monotonicity. The log is unchanged;
    /// the caller must resubmit with a corrected tick.
    #[error("out-of-order event in session {session_id}: tick {tick} is below the log floor {floor}")]
    OutOfOrderEvent {
        /// Session whose log rejected the append.
        session_id: SessionId,
        /// Tick of the rejected event.
        tick: u64,
        /// Current tick floor of the log.
        floor: u64,
    },

    /// An already-applied event was applied again outside a replay.
    /// This indicates a caller bug and is surfaced, never silently ignored.
    #[error("duplicate application of event {event_id} (tick {tick}) in session {session_id}")]
    DuplicateApplication {
        /// Session whose store detected the reapplication.
        session_id: SessionId,
        /// The offending event id.
        event_id: EventId,
        /// Tick of the offending event.
        tick: u64,
    },

    /// A persistence operation exceeded its configured timeout.
    /// Recoverable: the operation is pure and may be retried with backoff.
    #[error("persistence timeout during {operation}")]
    PersistenceTimeout {
        /// Which operation timed out (e.g. "append_events", "load").
        operation: String,
    },

    /// Derived state failed to match a stored snapshot checksum.
    /// Fatal for the session — signals corruption, never auto-repaired.
    #[error(
        "replay inconsistency in session {session_id} at checkpoint {last_event_id:?}: \
         expected checksum {expected}, got {actual}"
    )]
    ReplayInconsistency {
        /// The corrupted session.
        session_id: SessionId,
        /// Last event id covered by the snapshot, if any.
        last_event_id: Option<EventId>,
        /// Checksum recorded at save time.
        expected: String,
        /// Checksum computed at load time.
        actual: String,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ContinuityError>;
