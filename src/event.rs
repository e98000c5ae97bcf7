//! The event log — the only durable ground truth of a session's history.
//!
//! Events are immutable, totally ordered by (tick, insertion sequence), and
//! append-only. All derived state (entity store, relationship graph) must be
//! reconstructible by replaying the log from empty.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ContinuityError, Result};
use crate::types::{CharacterId, EventId, LocationId, MoodVector, SessionId};

/// Classification tag of an event, used by the store's interpretation rules
/// and the decay policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A character entered the story (explicit or first-reference).
    CharacterRegistered,
    /// A location entered the story.
    LocationRegistered,
    /// Ordinary conversation or narration.
    Dialogue,
    /// An act of help, comfort, or generosity.
    Kindness,
    /// A fight, argument, or hostile act.
    Conflict,
    /// A betrayal of trust.
    Betrayal,
    /// A wounding or deeply distressing occurrence.
    Trauma,
    /// Practice or use of a named skill.
    SkillPractice,
    /// Movement to another location.
    Travel,
    /// A persistent state change (injury, title, vow).
    Transformation,
    /// A past event was brought back up, reviving its salience.
    Recall,
    /// The clock committed forward motion; drives the decay pass.
    TimeAdvanced,
}

impl EventKind {
    /// Lowercase name for rendering and logging.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EventKind::CharacterRegistered => "character_registered",
            EventKind::LocationRegistered => "location_registered",
            EventKind::Dialogue => "dialogue",
            EventKind::Kindness => "kindness",
            EventKind::Conflict => "conflict",
            EventKind::Betrayal => "betrayal",
            EventKind::Trauma => "trauma",
            EventKind::SkillPractice => "skill_practice",
            EventKind::Travel => "travel",
            EventKind::Transformation => "transformation",
            EventKind::Recall => "recall",
            EventKind::TimeAdvanced => "time_advanced",
        }
    }
}

/// Kind-specific payload details that don't fit the common fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum EventDetail {
    /// No extra detail.
    #[default]
    None,
    /// Registration payload for [`EventKind::CharacterRegistered`].
    NewCharacter {
        /// Display name of the character.
        name: String,
        /// Mood baseline the character relaxes toward.
        baseline: MoodVector,
    },
    /// Registration payload for [`EventKind::LocationRegistered`].
    NewLocation {
        /// The location record being introduced.
        location: crate::store::Location,
    },
    /// Which skill was practiced ([`EventKind::SkillPractice`]).
    Skill {
        /// Lowercase skill name.
        name: String,
    },
    /// Destination of a [`EventKind::Travel`] event.
    Moved {
        /// Where the actors went.
        to: LocationId,
    },
    /// Which past event was recalled ([`EventKind::Recall`]).
    Recalled {
        /// The revived event.
        event: EventId,
    },
}

/// An immutable occurrence in the story, timestamped by simulated tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Insertion sequence number; assigns total order within a tick.
    pub id: EventId,
    /// Simulated tick at which the event happened.
    pub tick: u64,
    /// Characters who acted or were directly involved.
    pub actors: Vec<CharacterId>,
    /// Classification tag.
    pub kind: EventKind,
    /// One-line summary of what happened.
    pub summary: String,
    /// Lowercase tags for reinforcement matching.
    pub tags: Vec<String>,
    /// Emotional tone, -1.0 (dire) to 1.0 (joyful).
    pub sentiment: f32,
    /// How memorable this is, 0.0 to 1.0. Seeds salience.
    pub importance: f32,
    /// The character acted upon, if any.
    pub target: Option<CharacterId>,
    /// Where it happened, if known.
    pub location: Option<LocationId>,
    /// Kind-specific detail.
    pub detail: EventDetail,
}

/// An event awaiting its log-assigned id.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Simulated tick of the occurrence.
    pub tick: u64,
    /// Characters involved.
    pub actors: Vec<CharacterId>,
    /// Classification tag.
    pub kind: EventKind,
    /// One-line summary.
    pub summary: String,
    /// Lowercase tags.
    pub tags: Vec<String>,
    /// Emotional tone, clamped to [-1, 1] on append.
    pub sentiment: f32,
    /// Memorability, clamped to [0, 1] on append.
    pub importance: f32,
    /// The character acted upon, if any.
    pub target: Option<CharacterId>,
    /// Where it happened.
    pub location: Option<LocationId>,
    /// Kind-specific detail.
    pub detail: EventDetail,
}

impl EventDraft {
    /// Start a draft with neutral payload fields.
    #[must_use]
    pub fn new(tick: u64, kind: EventKind, summary: impl Into<String>) -> Self {
        Self {
            tick,
            actors: Vec::new(),
            kind,
            summary: summary.into(),
            tags: Vec::new(),
            sentiment: 0.0,
            importance: 0.5,
            target: None,
            location: None,
            detail: EventDetail::None,
        }
    }

    /// Set the actors.
    #[must_use]
    pub fn actors(mut self, actors: Vec<CharacterId>) -> Self {
        self.actors = actors;
        self
    }

    /// Set sentiment and importance.
    #[must_use]
    pub fn weighted(mut self, sentiment: f32, importance: f32) -> Self {
        self.sentiment = sentiment;
        self.importance = importance;
        self
    }

    /// Set the lowercase tags.
    #[must_use]
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the target character.
    #[must_use]
    pub fn target(mut self, target: CharacterId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the location.
    #[must_use]
    pub fn at(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the kind-specific detail.
    #[must_use]
    pub fn detail(mut self, detail: EventDetail) -> Self {
        self.detail = detail;
        self
    }
}

/// Append-only ordered record of a session's occurrences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    session_id: SessionId,
    events: Vec<Event>,
}

impl EventLog {
    /// Create an empty log for a session.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            events: Vec::new(),
        }
    }

    /// Rebuild a log from previously persisted events.
    ///
    /// Events must already be ordered; this is the persistence layer's
    /// responsibility (the journal stores them by id).
    #[must_use]
    pub fn from_events(session_id: SessionId, events: Vec<Event>) -> Self {
        Self { session_id, events }
    }

    /// The session this log belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Current tick floor: appends below this tick are rejected.
    #[must_use]
    pub fn tick_floor(&self) -> u64 {
        self.events.last().map_or(0, |e| e.tick)
    }

    /// Append an event, assigning its id.
    ///
    /// Sentiment and importance are clamped to their declared ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::OutOfOrderEvent`] if the draft's tick is
    /// strictly below the log's tick floor; the log is left unchanged.
    pub fn append(&mut self, draft: EventDraft) -> Result<EventId> {
        let floor = self.tick_floor();
        if draft.tick < floor {
            return Err(ContinuityError::OutOfOrderEvent {
                session_id: self.session_id,
                tick: draft.tick,
                floor,
            });
        }

        let id = EventId(self.events.len() as u64);
        let event = Event {
            id,
            tick: draft.tick,
            actors: draft.actors,
            kind: draft.kind,
            summary: draft.summary,
            tags: draft.tags,
            sentiment: draft.sentiment.clamp(-1.0, 1.0),
            importance: draft.importance.clamp(0.0, 1.0),
            target: draft.target,
            location: draft.location,
            detail: draft.detail,
        };

        debug!(
            session = %self.session_id,
            event = %id,
            tick = event.tick,
            kind = event.kind.name(),
            "Appended event"
        );
        self.events.push(event);
        Ok(id)
    }

    /// Number of events in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events, in total order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Look up an event by id.
    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(id.0 as usize)
    }

    /// Id of the most recent event, if any.
    #[must_use]
    pub fn last_id(&self) -> Option<EventId> {
        self.events.last().map(|e| e.id)
    }

    /// Ordered, restartable replay of events with tick in
    /// `from_tick..=to_tick`.
    pub fn replay(&self, from_tick: u64, to_tick: u64) -> impl Iterator<Item = &Event> {
        self.events
            .iter()
            .filter(move |e| e.tick >= from_tick && e.tick <= to_tick)
    }

    /// Events strictly after a checkpoint id (for snapshot resumption).
    #[must_use]
    pub fn events_after(&self, checkpoint: Option<EventId>) -> &[Event] {
        match checkpoint {
            None => &self.events,
            Some(id) => {
                let start = (id.0 as usize + 1).min(self.events.len());
                &self.events[start..]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> EventLog {
        EventLog::new(SessionId::new())
    }

    #[test]
    fn append_assigns_sequential_ids() {
        let mut log = log();
        let a = log
            .append(EventDraft::new(1, EventKind::Dialogue, "hello"))
            .expect("append");
        let b = log
            .append(EventDraft::new(1, EventKind::Dialogue, "again"))
            .expect("append");
        assert_eq!(a, EventId(0));
        assert_eq!(b, EventId(1));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn out_of_order_append_is_rejected_and_log_unchanged() {
        let mut log = log();
        log.append(EventDraft::new(10, EventKind::Dialogue, "later"))
            .expect("append");

        let err = log
            .append(EventDraft::new(5, EventKind::Dialogue, "earlier"))
            .unwrap_err();
        assert!(matches!(
            err,
            ContinuityError::OutOfOrderEvent { tick: 5, floor: 10, .. }
        ));
        assert_eq!(log.len(), 1, "rejected append must not modify the log");
    }

    #[test]
    fn equal_tick_appends_are_accepted() {
        let mut log = log();
        log.append(EventDraft::new(10, EventKind::Dialogue, "a"))
            .expect("append");
        log.append(EventDraft::new(10, EventKind::Dialogue, "b"))
            .expect("same tick is fine");
    }

    #[test]
    fn payload_fields_are_clamped() {
        let mut log = log();
        let id = log
            .append(EventDraft::new(0, EventKind::Trauma, "bad day").weighted(-3.0, 7.0))
            .expect("append");
        let event = log.get(id).expect("stored");
        assert!((event.sentiment + 1.0).abs() < f32::EPSILON);
        assert!((event.importance - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn replay_filters_by_tick_range() {
        let mut log = log();
        for tick in [1u64, 3, 5, 7] {
            log.append(EventDraft::new(tick, EventKind::Dialogue, format!("t{tick}")))
                .expect("append");
        }
        let ticks: Vec<u64> = log.replay(3, 5).map(|e| e.tick).collect();
        assert_eq!(ticks, vec![3, 5]);
    }

    #[test]
    fn events_after_checkpoint() {
        let mut log = log();
        for tick in 0..4u64 {
            log.append(EventDraft::new(tick, EventKind::Dialogue, "e"))
                .expect("append");
        }
        assert_eq!(log.events_after(None).len(), 4);
        assert_eq!(log.events_after(Some(EventId(1))).len(), 2);
        assert_eq!(log.events_after(Some(EventId(3))).len(), 0);
    }
}
