//! Session orchestration — the engine's public surface.
//!
//! A [`ContinuitySession`] owns one story's clock, log, store and graph
//! behind a single `parking_lot::RwLock`: turn ingestion, time commits and
//! restoration serialize on the write lock; digest rendering and queries
//! take read locks against a consistent snapshot and have no side effects,
//! so an abandoned digest costs nothing. Sessions are independent values —
//! running many in parallel is the caller's choice and needs no coordination
//! here.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::assembler::{ContextAssembler, DigestManifest};
use crate::clock::SimClock;
use crate::config::ContinuityConfig;
use crate::environment::{Environment, EnvironmentState};
use crate::error::Result;
use crate::event::{EventDetail, EventDraft, EventKind, EventLog};
use crate::persistence::{SavedSession, SessionStore};
use crate::relationship::RelationshipGraph;
use crate::signal;
use crate::store::{EntityStore, Location};
use crate::types::{CharacterId, ContextBudget, EventId, FocusSet, LocationId, MoodVector, SessionId};

/// Acknowledgement returned by turn ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReceipt {
    /// Log id assigned to the turn's event.
    pub event_id: EventId,
    /// Tick the event was recorded at.
    pub tick: u64,
    /// How the turn was classified.
    pub kind: EventKind,
    /// Known characters detected in the turn text.
    pub mentioned: Vec<CharacterId>,
    /// Number of state deltas the event produced.
    pub delta_count: usize,
    /// Ticks of queued time committed before the turn was recorded.
    pub committed_ticks: u64,
}

/// Everything guarded by the session lock, mutated as one unit.
#[derive(Debug)]
struct SessionState {
    clock: SimClock,
    log: EventLog,
    store: EntityStore,
    graph: RelationshipGraph,
    /// Index of the first log event not yet persisted.
    persisted: usize,
}

/// One story's continuity engine.
pub struct ContinuitySession {
    session_id: SessionId,
    config: ContinuityConfig,
    assembler: ContextAssembler,
    environment: Environment,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for ContinuitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuitySession")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl ContinuitySession {
    /// Start a fresh session.
    #[must_use]
    pub fn new(session_id: SessionId, config: ContinuityConfig) -> Self {
        let state = SessionState {
            clock: SimClock::new(config.clock.clone()),
            log: EventLog::new(session_id),
            store: EntityStore::new(session_id),
            graph: RelationshipGraph::new(),
            persisted: 0,
        };
        info!(session = %session_id, "Session started");
        Self {
            environment: Environment::new(session_id, config.clock.climate),
            assembler: ContextAssembler::new(config.assembler.clone()),
            session_id,
            config,
            state: RwLock::new(state),
        }
    }

    /// Resume a session from saved state: restore the snapshot if present,
    /// replay the tail (or the full log when there is no snapshot), and put
    /// the clock back at its saved tick.
    ///
    /// # Errors
    ///
    /// Propagates replay failures; a saved log that cannot replay is corrupt.
    pub fn resume(saved: SavedSession, config: ContinuityConfig) -> Result<Self> {
        let session_id = saved.session_id;
        let log = EventLog::from_events(session_id, saved.events.clone());

        let mut store = match &saved.snapshot {
            Some(record) => record.store.clone(),
            None => EntityStore::new(session_id),
        };
        for event in saved.tail_events() {
            store.apply(event, &config.decay)?;
        }

        let graph = RelationshipGraph::rebuild(&store);
        let persisted = log.len();
        info!(
            session = %session_id,
            tick = saved.clock_tick,
            events = log.len(),
            "Session resumed"
        );
        let state = SessionState {
            clock: SimClock::at_tick(saved.clock_tick, config.clock.clone()),
            log,
            store,
            graph,
            persisted,
        };
        Ok(Self {
            environment: Environment::new(session_id, config.clock.climate),
            assembler: ContextAssembler::new(config.assembler.clone()),
            session_id,
            config,
            state: RwLock::new(state),
        })
    }

    /// The session id.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Current clock tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.state.read().clock.tick()
    }

    /// Read access to the entity store (consistent snapshot under the lock).
    pub fn store(&self) -> MappedRwLockReadGuard<'_, EntityStore> {
        RwLockReadGuard::map(self.state.read(), |s| &s.store)
    }

    /// Read access to the relationship graph.
    pub fn graph(&self) -> MappedRwLockReadGuard<'_, RelationshipGraph> {
        RwLockReadGuard::map(self.state.read(), |s| &s.graph)
    }

    /// Read access to the event log.
    pub fn log(&self) -> MappedRwLockReadGuard<'_, EventLog> {
        RwLockReadGuard::map(self.state.read(), |s| &s.log)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Introduce a character, logging a registration event.
    ///
    /// # Errors
    ///
    /// Propagates log and store failures.
    pub fn register_character(
        &self,
        name: impl Into<String>,
        baseline: MoodVector,
    ) -> Result<CharacterId> {
        let name = name.into();
        let id = CharacterId::new();
        let mut state = self.state.write();
        let draft = EventDraft::new(
            state.clock.tick(),
            EventKind::CharacterRegistered,
            format!("{name} enters the story"),
        )
        .actors(vec![id])
        .detail(EventDetail::NewCharacter {
            name,
            baseline,
        });
        self.record(&mut state, draft)?;
        Ok(id)
    }

    /// Introduce a location, logging a registration event.
    ///
    /// # Errors
    ///
    /// Propagates log and store failures.
    pub fn register_location(&self, mut location: Location) -> Result<LocationId> {
        let mut state = self.state.write();
        location.id = LocationId::new();
        let id = location.id;
        let draft = EventDraft::new(
            state.clock.tick(),
            EventKind::LocationRegistered,
            format!("{} enters the story", location.name),
        )
        .detail(EventDetail::NewLocation { location });
        self.record(&mut state, draft)?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Queue simulated time without committing it. Nothing reaches the log
    /// until [`Self::commit_time`] (turn ingestion commits implicitly).
    pub fn request_time(&self, ticks: u64) {
        self.state.write().clock.request(ticks);
    }

    /// Ticks queued but not yet committed.
    #[must_use]
    pub fn pending_time(&self) -> u64 {
        self.state.read().clock.pending()
    }

    /// Discard queued time (LLM regeneration, edited turn). Returns how many
    /// ticks were dropped.
    pub fn rollback_time(&self) -> u64 {
        let dropped = self.state.write().clock.rollback();
        if dropped > 0 {
            debug!(session = %self.session_id, dropped, "Pending time rolled back");
        }
        dropped
    }

    /// Commit queued time to the timeline. Logs a `TimeAdvanced` event,
    /// which runs the decay pass as part of ordinary event application — so
    /// decay cadence is in the log and replay reproduces it exactly.
    ///
    /// # Errors
    ///
    /// Propagates log and store failures.
    pub fn commit_time(&self) -> Result<u64> {
        let mut state = self.state.write();
        self.commit_pending(&mut state)
    }

    fn commit_pending(&self, state: &mut SessionState) -> Result<u64> {
        let pending = state.clock.pending();
        if pending == 0 {
            return Ok(0);
        }
        // Append first, move the clock second: a failed append leaves the
        // queued time intact instead of a clock the log knows nothing about.
        let tick = state.clock.tick() + pending;
        let draft = EventDraft::new(
            tick,
            EventKind::TimeAdvanced,
            format!("{pending} ticks pass"),
        );
        self.record(state, draft)?;
        state.clock.rollback();
        debug_assert_eq!(state.clock.tick(), tick);
        Ok(pending)
    }

    // ------------------------------------------------------------------
    // Turn ingestion
    // ------------------------------------------------------------------

    /// Ingest one turn of narration: commit any queued time, extract
    /// signals, append the classified event, and apply it to the store.
    /// Returns an acknowledgement only — prompt content comes from
    /// [`Self::digest`].
    ///
    /// # Errors
    ///
    /// Propagates log and store failures.
    pub fn ingest_turn(&self, text: &str, focus: &FocusSet) -> Result<TurnReceipt> {
        let mut state = self.state.write();
        let committed_ticks = self.commit_pending(&mut state)?;

        let signals = signal::extract(text, &state.store);
        let tick = state.clock.tick();

        // The mentioned roster drives actor/target assignment; a turn that
        // names nobody is attributed to the focus characters.
        let (actors, target) = match signals.mentioned.as_slice() {
            [] => (focus.characters().to_vec(), None),
            [only] => (vec![*only], None),
            [first, second, ..] => (vec![*first], Some(*second)),
        };

        let mut draft = EventDraft::new(tick, signals.kind, text.trim())
            .actors(actors)
            .tags(signals.tags.clone())
            .weighted(signals.sentiment, signals.importance);
        if let Some(target) = target {
            draft = draft.target(target);
        }
        if let Some(&location) = focus.locations().first() {
            draft = draft.at(location);
            // A travel turn moves its actors to wherever the focus points.
            if signals.kind == EventKind::Travel {
                draft = draft.detail(EventDetail::Moved { to: location });
            }
        }
        if let Some(skill) = &signals.skill {
            draft = draft.detail(EventDetail::Skill {
                name: skill.clone(),
            });
        }

        let (event_id, delta_count) = self.record(&mut state, draft)?;
        debug!(
            session = %self.session_id,
            event = %event_id,
            kind = signals.kind.name(),
            mentioned = signals.mentioned.len(),
            "Turn ingested"
        );
        Ok(TurnReceipt {
            event_id,
            tick,
            kind: signals.kind,
            mentioned: signals.mentioned,
            delta_count,
            committed_ticks,
        })
    }

    /// Append a pre-built event draft directly (tool-driven callers that
    /// already know the classification).
    ///
    /// # Errors
    ///
    /// Propagates log and store failures.
    pub fn record_event(&self, draft: EventDraft) -> Result<EventId> {
        let mut state = self.state.write();
        let (id, _) = self.record(&mut state, draft)?;
        Ok(id)
    }

    /// Append + apply + graph refresh, as one unit under the write lock.
    ///
    /// The clock is pulled up to the event's tick: drafts may sit ahead of
    /// the clock, and letting the clock lag the log floor would doom every
    /// later draft stamped with the (stale) clock tick.
    fn record(&self, state: &mut SessionState, draft: EventDraft) -> Result<(EventId, usize)> {
        let tick = draft.tick;
        let id = state.log.append(draft)?;
        let event = state
            .log
            .get(id)
            .cloned()
            .ok_or_else(|| crate::ContinuityError::Serialization(format!("event {id} vanished")))?;
        let deltas = state.store.apply(&event, &self.config.decay)?;
        state.graph = RelationshipGraph::rebuild(&state.store);
        if tick > state.clock.tick() {
            state.clock.advance(tick - state.clock.tick());
        }
        Ok((id, deltas.len()))
    }

    // ------------------------------------------------------------------
    // Digest
    // ------------------------------------------------------------------

    /// Render a prompt-ready digest under the given budget. Read-only and
    /// side-effect-free; safe to abandon.
    #[must_use]
    pub fn digest(&self, budget: &ContextBudget) -> (String, DigestManifest) {
        let state = self.state.read();
        let environment = self.environment_state(&state, budget);
        self.assembler.assemble(
            &state.store,
            &state.log,
            &state.graph,
            &state.clock,
            &environment,
            budget,
        )
    }

    /// Current ambient state for the focused location (or the open world).
    #[must_use]
    pub fn environment(&self, focus: &FocusSet) -> EnvironmentState {
        let state = self.state.read();
        let budget = ContextBudget::new(0, focus.clone());
        self.environment_state(&state, &budget)
    }

    fn environment_state(
        &self,
        state: &SessionState,
        budget: &ContextBudget,
    ) -> EnvironmentState {
        let location = budget
            .focus
            .locations()
            .first()
            .and_then(|&id| state.store.location(id));
        let occupants = location.map_or(0, |loc| {
            state
                .store
                .characters()
                .values()
                .filter(|c| !c.archived && c.location == Some(loc.id))
                .count()
        });
        self.environment.state(&state.clock, location, occupants)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Persist unsaved events and a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures; on failure nothing is marked saved,
    /// so the next call retries the same events.
    pub fn save(&self, db: &mut dyn SessionStore) -> Result<()> {
        let mut state = self.state.write();
        let tick = state.clock.tick();
        let unsaved = &state.log.events()[state.persisted..];
        db.append_events(self.session_id, unsaved, tick)?;
        db.save_snapshot(&state.store, tick)?;
        state.persisted = state.log.len();
        Ok(())
    }

    /// Rebuild derived state by full replay and verify it matches the live
    /// store. Returns the replayed store's serialized byte length on
    /// success (diagnostic value).
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContinuityError::ReplayInconsistency`] if the
    /// replayed state diverges from the live state.
    pub fn verify_replay(&self) -> Result<usize> {
        let state = self.state.read();
        let replayed = EntityStore::from_replay(&state.log, &self.config.decay)?;
        let live = serde_json::to_vec(&state.store)
            .map_err(|e| crate::ContinuityError::Serialization(e.to_string()))?;
        let fresh = serde_json::to_vec(&replayed)
            .map_err(|e| crate::ContinuityError::Serialization(e.to_string()))?;
        if live != fresh {
            return Err(crate::ContinuityError::ReplayInconsistency {
                session_id: self.session_id,
                last_event_id: state.store.last_applied(),
                expected: crate::persistence::crc32_hex(&live),
                actual: crate::persistence::crc32_hex(&fresh),
            });
        }
        Ok(fresh.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::token_len;
    use crate::persistence::SqliteSessionStore;

    fn session() -> ContinuitySession {
        ContinuitySession::new(SessionId::new(), ContinuityConfig::default())
    }

    #[test]
    fn ingest_attributes_turn_to_mentioned_characters() {
        let s = session();
        let mira = s.register_character("Mira", MoodVector::NEUTRAL).expect("register");
        let tom = s.register_character("Tom", MoodVector::NEUTRAL).expect("register");

        let receipt = s
            .ingest_turn("Mira helped Tom carry water from the well.", &FocusSet::default())
            .expect("ingest");
        assert_eq!(receipt.kind, EventKind::Kindness);
        assert_eq!(receipt.mentioned.len(), 2);
        assert!(receipt.mentioned.contains(&mira));
        assert!(receipt.mentioned.contains(&tom));
        assert!(receipt.delta_count > 0);
    }

    #[test]
    fn time_commits_through_the_log() {
        let s = session();
        s.register_character("Mira", MoodVector::NEUTRAL).expect("register");
        s.request_time(48);
        assert_eq!(s.pending_time(), 48);
        assert_eq!(s.tick(), 0);

        let committed = s.commit_time().expect("commit");
        assert_eq!(committed, 48);
        assert_eq!(s.tick(), 48);
        assert_eq!(s.pending_time(), 0);
        assert!(s.verify_replay().is_ok(), "decay via the log must replay");
    }

    #[test]
    fn directly_recorded_events_pull_the_clock_forward() {
        let s = session();
        let mira = s.register_character("Mira", MoodVector::NEUTRAL).expect("register");
        s.record_event(
            EventDraft::new(209, EventKind::Dialogue, "a word at dusk").actors(vec![mira]),
        )
        .expect("record ahead of the clock");
        assert_eq!(s.tick(), 209, "the clock must follow the log floor");

        // Committing time after a direct record must keep working.
        s.request_time(1);
        assert_eq!(s.commit_time().expect("commit"), 1);
        assert_eq!(s.tick(), 210);
        s.ingest_turn("Mira hums a tune.", &FocusSet::default())
            .expect("later turns stay valid");
        assert!(s.verify_replay().is_ok());
    }

    #[test]
    fn rollback_discards_pending_time() {
        let s = session();
        s.request_time(10);
        assert_eq!(s.rollback_time(), 10);
        assert_eq!(s.commit_time().expect("commit"), 0);
        assert_eq!(s.tick(), 0);
    }

    #[test]
    fn travel_turns_move_actors_to_the_focused_location() {
        let s = session();
        let mira = s.register_character("Mira", MoodVector::NEUTRAL).expect("register");
        let mill = s
            .register_location(Location::new(LocationId::new(), "The Mill"))
            .expect("register location");
        let focus = FocusSet::new(vec![mira], vec![mill]);

        s.ingest_turn("Mira arrived at the mill, road-weary.", &focus)
            .expect("ingest");
        assert_eq!(
            s.store().character(mira).expect("mira").location,
            Some(mill),
            "narrated travel must update the character's whereabouts"
        );
    }

    #[test]
    fn digest_respects_budget() {
        let s = session();
        let mira = s.register_character("Mira", MoodVector::NEUTRAL).expect("register");
        s.ingest_turn("Mira trains the longbow at dawn.", &FocusSet::default())
            .expect("ingest");

        let budget = ContextBudget::new(12, FocusSet::characters_only(vec![mira]));
        let (digest, manifest) = s.digest(&budget);
        assert!(token_len(&digest) <= 12);
        assert_eq!(manifest.max_tokens, 12);
    }

    #[test]
    fn save_and_resume_reproduce_state() {
        let s = session();
        let mira = s.register_character("Mira", MoodVector::NEUTRAL).expect("register");
        let tom = s.register_character("Tom", MoodVector::NEUTRAL).expect("register");
        s.ingest_turn("Mira helped Tom bandage a wound.", &FocusSet::default())
            .expect("ingest");
        s.request_time(24);
        s.commit_time().expect("commit");

        let mut db = SqliteSessionStore::open_in_memory(&Default::default()).expect("open");
        s.save(&mut db).expect("save");

        let saved = db.load(s.session_id()).expect("load").expect("Some");
        let resumed =
            ContinuitySession::resume(saved, ContinuityConfig::default()).expect("resume");

        assert_eq!(resumed.tick(), s.tick());
        assert_eq!(
            serde_json::to_string(&*resumed.store()).expect("resumed"),
            serde_json::to_string(&*s.store()).expect("live"),
            "resumed state must match the live session"
        );
        let edge_live = s.graph().get(tom, mira);
        let edge_resumed = resumed.graph().get(tom, mira);
        assert_eq!(edge_live, edge_resumed);
    }

    #[test]
    fn incremental_saves_do_not_duplicate_events() {
        let s = session();
        s.register_character("Mira", MoodVector::NEUTRAL).expect("register");
        let mut db = SqliteSessionStore::open_in_memory(&Default::default()).expect("open");
        s.save(&mut db).expect("first save");
        s.ingest_turn("Mira hums a tune.", &FocusSet::default()).expect("ingest");
        s.save(&mut db).expect("second save");

        let saved = db.load(s.session_id()).expect("load").expect("Some");
        assert_eq!(saved.events.len(), 2);
    }
}
