//! Entity store — owns all character and location records of a session.
//!
//! The store is pure derived state: it interprets events into bounded,
//! clamped deltas and can always be rebuilt by replaying the log from empty.
//! Every mutation returns the [`StateDelta`]s it produced for auditability.
//!
//! Characters are never deleted — archiving keeps them out of digests while
//! preserving continuity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::DecayConfig;
use crate::decay::{self, JitterSource};
use crate::error::{ContinuityError, Result};
use crate::event::{Event, EventDetail, EventKind, EventLog};
use crate::relationship::RelationshipEdge;
use crate::types::{CharacterId, EventId, LocationId, MoodVector, SessionId};

/// Changes below this magnitude are not reported as deltas.
const DELTA_EPSILON: f32 = 1e-4;

/// Salience boost when a past event is recalled (memory revival).
const RECALL_BOOST: f32 = 0.15;

/// Salience boost when a new event shares tags with an old memory.
const TAG_REINFORCEMENT: f32 = 0.05;

/// A skill goes from "sharp" to "rusty" after this many ticks unpracticed.
const RUSTY_AFTER_TICKS: u64 = 720;

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// Qualitative proficiency tier, derived from the proficiency scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillTier {
    /// proficiency < 0.2
    Disastrous,
    /// 0.2 ≤ proficiency < 0.4
    Bad,
    /// 0.4 ≤ proficiency < 0.6
    Neutral,
    /// 0.6 ≤ proficiency < 0.8
    Good,
    /// 0.8 ≤ proficiency < 0.95
    Perfect,
    /// proficiency ≥ 0.95
    Veteran,
}

impl SkillTier {
    /// Tier for a proficiency value.
    #[must_use]
    pub fn for_proficiency(proficiency: f32) -> Self {
        match proficiency {
            p if p < 0.2 => SkillTier::Disastrous,
            p if p < 0.4 => SkillTier::Bad,
            p if p < 0.6 => SkillTier::Neutral,
            p if p < 0.8 => SkillTier::Good,
            p if p < 0.95 => SkillTier::Perfect,
            _ => SkillTier::Veteran,
        }
    }

    /// Lowercase name for rendering.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SkillTier::Disastrous => "disastrous",
            SkillTier::Bad => "bad",
            SkillTier::Neutral => "neutral",
            SkillTier::Good => "good",
            SkillTier::Perfect => "perfect",
            SkillTier::Veteran => "veteran",
        }
    }
}

/// A character's standing in one named skill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillState {
    /// Proficiency, 0.0 to 1.0.
    pub proficiency: f32,
    /// How many times the skill has been practiced.
    pub practice_count: u32,
    /// Tick of the most recent practice.
    pub last_practiced_tick: u64,
}

impl SkillState {
    /// Record one practice: proficiency follows a log curve of the practice
    /// count, so early repetitions matter most.
    pub fn reinforce(&mut self, tick: u64) {
        self.practice_count += 1;
        self.proficiency = (0.2 + 0.3 * (1.0 + f64::from(self.practice_count)).ln() as f32)
            .clamp(0.0, 1.0);
        self.last_practiced_tick = tick;
    }

    /// Qualitative tier.
    #[must_use]
    pub fn tier(&self) -> SkillTier {
        SkillTier::for_proficiency(self.proficiency)
    }

    /// "sharp" while recently practiced, "rusty" after long disuse.
    #[must_use]
    pub fn clarity(&self, now_tick: u64) -> &'static str {
        if now_tick.saturating_sub(self.last_practiced_tick) > RUSTY_AFTER_TICKS {
            "rusty"
        } else {
            "sharp"
        }
    }
}

impl Default for SkillState {
    fn default() -> Self {
        Self {
            proficiency: 0.0,
            practice_count: 0,
            last_practiced_tick: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Memory traces
// ---------------------------------------------------------------------------

/// One entry in a character's salience map: how memorable a logged event
/// remains, plus the fields decay and reinforcement need without going back
/// to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTrace {
    /// Decaying salience weight.
    pub weight: f32,
    /// Kind of the remembered event; selects the decay policy row.
    pub kind: EventKind,
    /// Tags of the remembered event, for reinforcement matching.
    pub tags: Vec<String>,
    /// Tick the memory was formed.
    pub formed_tick: u64,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A character record. Owned exclusively by the [`EntityStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Stable identity.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Current mood; every axis stays within [-1, 1].
    pub mood: MoodVector,
    /// Baseline the mood relaxes toward during decay.
    pub baseline: MoodVector,
    /// Named skills.
    pub skills: BTreeMap<String, SkillState>,
    /// Salience map: remembered event → decaying trace.
    pub memories: BTreeMap<EventId, MemoryTrace>,
    /// Outbound directed relationship edges.
    pub relationships: BTreeMap<CharacterId, RelationshipEdge>,
    /// Persistent state changes (injuries, titles, vows).
    pub transformations: Vec<String>,
    /// Where the character currently is, if known.
    pub location: Option<LocationId>,
    /// Archived characters are kept for continuity but left out of digests.
    pub archived: bool,
    /// Last tick a decay pass settled this character (idempotence stamp).
    pub last_decay_tick: u64,
    /// Tick the character entered the story.
    pub created_tick: u64,
}

impl Character {
    /// Create a default-neutral character.
    #[must_use]
    pub fn new(id: CharacterId, name: impl Into<String>, tick: u64) -> Self {
        Self {
            id,
            name: name.into(),
            mood: MoodVector::NEUTRAL,
            baseline: MoodVector::NEUTRAL,
            skills: BTreeMap::new(),
            memories: BTreeMap::new(),
            relationships: BTreeMap::new(),
            transformations: Vec::new(),
            location: None,
            archived: false,
            last_decay_tick: tick,
            created_tick: tick,
        }
    }
}

/// A location record: environmental attributes referenced by characters
/// (non-owning relation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Stable identity.
    pub id: LocationId,
    /// Display name.
    pub name: String,
    /// Local temperature bias, -0.25 (chilly hollow) to 0.25 (heat trap).
    pub temperature_bias: f32,
    /// Baseline noise, 0.0 (still) to 1.0 (deafening).
    pub noise: f32,
    /// Baseline comfort, 0.0 (hostile) to 1.0 (homely).
    pub comfort: f32,
    /// Notable landmarks.
    pub landmarks: Vec<String>,
}

impl Location {
    /// Create a location with neutral attributes.
    #[must_use]
    pub fn new(id: LocationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            temperature_bias: 0.0,
            noise: 0.3,
            comfort: 0.5,
            landmarks: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// An audited state change produced by applying one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateDelta {
    /// A character entered the store.
    CharacterRegistered {
        /// New character.
        character: CharacterId,
        /// Display name.
        name: String,
    },
    /// A location entered the store.
    LocationRegistered {
        /// New location.
        location: LocationId,
    },
    /// A mood vector changed (shift or settling).
    MoodChanged {
        /// Whose mood.
        character: CharacterId,
        /// Mood before.
        before: MoodVector,
        /// Mood after (clamped).
        after: MoodVector,
    },
    /// A skill was reinforced or settled.
    SkillChanged {
        /// Whose skill.
        character: CharacterId,
        /// Skill name.
        skill: String,
        /// Proficiency before.
        before: f32,
        /// Proficiency after.
        after: f32,
    },
    /// A directed relationship edge changed.
    RelationshipChanged {
        /// Edge source.
        source: CharacterId,
        /// Edge target.
        target: CharacterId,
        /// Edge before.
        before: RelationshipEdge,
        /// Edge after (clamped).
        after: RelationshipEdge,
    },
    /// A memory trace weight changed (formation, reinforcement, decay).
    SalienceChanged {
        /// Whose memory.
        character: CharacterId,
        /// Remembered event.
        event: EventId,
        /// Weight before (None = newly formed).
        before: Option<f32>,
        /// Weight after.
        after: f32,
    },
    /// A transformation flag was added.
    TransformationAdded {
        /// Whose flag.
        character: CharacterId,
        /// The flag text.
        flag: String,
    },
    /// A character moved.
    Moved {
        /// Who moved.
        character: CharacterId,
        /// Destination.
        to: LocationId,
    },
    /// A character was archived (never purged).
    Archived {
        /// Who was archived.
        character: CharacterId,
    },
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// Exclusive owner of all character and location records for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStore {
    session_id: SessionId,
    characters: BTreeMap<CharacterId, Character>,
    locations: BTreeMap<LocationId, Location>,
    /// Watermark of the highest applied event id. Event application is
    /// ordered and single-writer, so a watermark is equivalent to a full
    /// applied-id set.
    last_applied: Option<EventId>,
    /// Tick of the most recently applied event.
    tick: u64,
}

impl EntityStore {
    /// Create an empty store for a session.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            characters: BTreeMap::new(),
            locations: BTreeMap::new(),
            last_applied: None,
            tick: 0,
        }
    }

    /// Rebuild derived state by replaying a full log from empty.
    ///
    /// Running this twice over the same log produces byte-identical state,
    /// including decay jitter.
    ///
    /// # Errors
    ///
    /// Propagates any application error (a log that fails to replay is
    /// corrupt by definition).
    pub fn from_replay(log: &EventLog, config: &DecayConfig) -> Result<Self> {
        let mut store = Self::new(log.session_id());
        for event in log.events() {
            store.apply(event, config)?;
        }
        Ok(store)
    }

    /// The session this store belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Tick of the most recently applied event.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Watermark of the highest applied event id.
    #[must_use]
    pub fn last_applied(&self) -> Option<EventId> {
        self.last_applied
    }

    /// All characters, in stable id order.
    #[must_use]
    pub fn characters(&self) -> &BTreeMap<CharacterId, Character> {
        &self.characters
    }

    /// All locations, in stable id order.
    #[must_use]
    pub fn locations(&self) -> &BTreeMap<LocationId, Location> {
        &self.locations
    }

    /// Look up one character.
    #[must_use]
    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    /// Look up one location.
    #[must_use]
    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    /// Find a character by display name (case-insensitive).
    #[must_use]
    pub fn character_by_name(&self, name: &str) -> Option<&Character> {
        self.characters
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    #[cfg(test)]
    pub(crate) fn characters_mut_for_test(&mut self) -> &mut BTreeMap<CharacterId, Character> {
        &mut self.characters
    }

    /// Interpret one event into bounded state deltas.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuityError::DuplicateApplication`] if the event id is
    /// at or below the applied watermark — reapplying outside a replay is a
    /// caller bug and is surfaced, never ignored.
    pub fn apply(&mut self, event: &Event, config: &DecayConfig) -> Result<Vec<StateDelta>> {
        if let Some(last) = self.last_applied {
            if event.id <= last {
                return Err(ContinuityError::DuplicateApplication {
                    session_id: self.session_id,
                    event_id: event.id,
                    tick: event.tick,
                });
            }
        }

        let mut deltas = Vec::new();

        match event.kind {
            EventKind::CharacterRegistered => self.apply_character_registration(event, &mut deltas),
            EventKind::LocationRegistered => self.apply_location_registration(event, &mut deltas),
            EventKind::TimeAdvanced => {
                let settled = self.settle_all(event.tick, config);
                deltas.extend(settled);
            }
            _ => self.apply_story_event(event, config, &mut deltas),
        }

        self.last_applied = Some(event.id);
        self.tick = event.tick;

        debug!(
            session = %self.session_id,
            event = %event.id,
            kind = event.kind.name(),
            deltas = deltas.len(),
            "Applied event"
        );
        Ok(deltas)
    }

    // ------------------------------------------------------------------
    // Event interpretation
    // ------------------------------------------------------------------

    fn apply_character_registration(&mut self, event: &Event, deltas: &mut Vec<StateDelta>) {
        let Some(&id) = event.actors.first() else {
            return; // registration without an actor carries nothing to do
        };
        let (name, baseline) = match &event.detail {
            EventDetail::NewCharacter { name, baseline } => (name.clone(), *baseline),
            _ => (placeholder_name(id), MoodVector::NEUTRAL),
        };
        let entry = self
            .characters
            .entry(id)
            .or_insert_with(|| Character::new(id, name.clone(), event.tick));
        entry.name = name.clone();
        entry.baseline = baseline;
        deltas.push(StateDelta::CharacterRegistered { character: id, name });
    }

    fn apply_location_registration(&mut self, event: &Event, deltas: &mut Vec<StateDelta>) {
        if let EventDetail::NewLocation { location } = &event.detail {
            deltas.push(StateDelta::LocationRegistered { location: location.id });
            self.locations.insert(location.id, location.clone());
        }
    }

    fn apply_story_event(
        &mut self,
        event: &Event,
        config: &DecayConfig,
        deltas: &mut Vec<StateDelta>,
    ) {
        let mut involved: Vec<CharacterId> = event.actors.clone();
        if let Some(target) = event.target {
            if !involved.contains(&target) {
                involved.push(target);
            }
        }

        // Unknown participants are registered default-neutral rather than
        // failing: the engine is tolerant of partial history.
        for &id in &involved {
            if !self.characters.contains_key(&id) {
                self.characters
                    .insert(id, Character::new(id, placeholder_name(id), event.tick));
                deltas.push(StateDelta::CharacterRegistered {
                    character: id,
                    name: placeholder_name(id),
                });
            }
        }

        self.apply_mood_and_relationships(event, deltas);
        self.form_memories(event, config, &involved, deltas);
        self.reinforce_by_tags(event, &involved, deltas);

        match (&event.kind, &event.detail) {
            (EventKind::SkillPractice, EventDetail::Skill { name }) => {
                for &id in &event.actors {
                    self.reinforce_skill(id, name, event.tick, deltas);
                }
            }
            (EventKind::Travel, EventDetail::Moved { to }) => {
                for &id in &event.actors {
                    if let Some(ch) = self.characters.get_mut(&id) {
                        ch.location = Some(*to);
                        deltas.push(StateDelta::Moved { character: id, to: *to });
                    }
                }
            }
            (EventKind::Transformation, _) => {
                for &id in &event.actors {
                    self.add_transformation(id, event, deltas);
                }
            }
            (EventKind::Recall, EventDetail::Recalled { event: recalled }) => {
                for &id in &involved {
                    self.revive_memory(id, *recalled, deltas);
                }
            }
            _ => {}
        }
    }

    /// Per-kind bounded mood and relationship deltas, scaled by importance
    /// and sentiment, clamped after every shift.
    fn apply_mood_and_relationships(&mut self, event: &Event, deltas: &mut Vec<StateDelta>) {
        let imp = event.importance;
        let sent = event.sentiment;

        // (valence, energy, tension) shifts for everyone involved.
        let mood_shift = match event.kind {
            EventKind::Dialogue => (0.05 * sent, 0.02 * sent.abs(), -0.02 * sent),
            EventKind::Kindness => (0.10 * imp, 0.02 * imp, -0.05 * imp),
            EventKind::Conflict => (-0.08 * imp, 0.05 * imp, 0.15 * imp),
            EventKind::Betrayal => (-0.15 * imp, 0.0, 0.20 * imp),
            EventKind::Trauma => (-0.20 * imp, -0.10 * imp, 0.25 * imp),
            _ => (0.0, 0.0, 0.0),
        };

        // (affinity, trust) deltas on the target→actor edge; the actor→target
        // edge moves at half strength (the one acted upon feels it more).
        let edge_shift = match event.kind {
            EventKind::Dialogue => (0.03 * sent, 0.01 * sent),
            EventKind::Kindness => (0.10 * imp, 0.05 * imp),
            EventKind::Conflict => (-0.10 * imp, -0.05 * imp),
            EventKind::Betrayal => (-0.25 * imp, -0.20 * imp),
            _ => (0.0, 0.0),
        };

        let mut shifted: Vec<CharacterId> = event.actors.clone();
        if let Some(t) = event.target {
            if !shifted.contains(&t) {
                shifted.push(t);
            }
        }
        if mood_shift != (0.0, 0.0, 0.0) {
            for &id in &shifted {
                if let Some(ch) = self.characters.get_mut(&id) {
                    let before = ch.mood;
                    ch.mood = ch.mood.shifted(mood_shift.0, mood_shift.1, mood_shift.2);
                    if mood_changed(before, ch.mood) {
                        deltas.push(StateDelta::MoodChanged {
                            character: id,
                            before,
                            after: ch.mood,
                        });
                    }
                }
            }
        }

        if edge_shift != (0.0, 0.0) {
            if let (Some(&actor), Some(target)) = (event.actors.first(), event.target) {
                self.adjust_edge(target, actor, edge_shift.0, edge_shift.1, event.tick, deltas);
                self.adjust_edge(
                    actor,
                    target,
                    edge_shift.0 * 0.5,
                    edge_shift.1 * 0.5,
                    event.tick,
                    deltas,
                );
            }
        }
    }

    fn adjust_edge(
        &mut self,
        source: CharacterId,
        target: CharacterId,
        d_affinity: f32,
        d_trust: f32,
        tick: u64,
        deltas: &mut Vec<StateDelta>,
    ) {
        if source == target {
            return;
        }
        let Some(ch) = self.characters.get_mut(&source) else {
            return;
        };
        let before = *ch
            .relationships
            .entry(target)
            .or_insert(RelationshipEdge::NEUTRAL);
        let after = before.adjusted(d_affinity, d_trust, tick);
        ch.relationships.insert(target, after);
        if (after.affinity - before.affinity).abs() > DELTA_EPSILON
            || (after.trust - before.trust).abs() > DELTA_EPSILON
        {
            deltas.push(StateDelta::RelationshipChanged {
                source,
                target,
                before,
                after,
            });
        }
    }

    /// Form a memory trace of the event for everyone involved. Initial
    /// weight is importance plus a bonus for emotional charge.
    fn form_memories(
        &mut self,
        event: &Event,
        config: &DecayConfig,
        involved: &[CharacterId],
        deltas: &mut Vec<StateDelta>,
    ) {
        let policy = decay::policy_for(event.kind, config);
        let weight = (event.importance + 0.25 * event.sentiment.abs())
            .clamp(policy.floor, 1.0);
        if weight < DELTA_EPSILON {
            return;
        }
        for &id in involved {
            if let Some(ch) = self.characters.get_mut(&id) {
                ch.memories.insert(
                    event.id,
                    MemoryTrace {
                        weight,
                        kind: event.kind,
                        tags: event.tags.clone(),
                        formed_tick: event.tick,
                    },
                );
                deltas.push(StateDelta::SalienceChanged {
                    character: id,
                    event: event.id,
                    before: None,
                    after: weight,
                });
            }
        }
    }

    /// An incoming event nudges old memories that share any of its tags —
    /// retelling keeps a memory alive.
    fn reinforce_by_tags(
        &mut self,
        event: &Event,
        involved: &[CharacterId],
        deltas: &mut Vec<StateDelta>,
    ) {
        if event.tags.is_empty() {
            return;
        }
        for &id in involved {
            let Some(ch) = self.characters.get_mut(&id) else {
                continue;
            };
            for (&mem_id, trace) in &mut ch.memories {
                if mem_id == event.id {
                    continue;
                }
                if trace.tags.iter().any(|t| event.tags.contains(t)) {
                    let before = trace.weight;
                    trace.weight = (trace.weight + TAG_REINFORCEMENT).min(1.0);
                    if (trace.weight - before).abs() > DELTA_EPSILON {
                        deltas.push(StateDelta::SalienceChanged {
                            character: id,
                            event: mem_id,
                            before: Some(before),
                            after: trace.weight,
                        });
                    }
                }
            }
        }
    }

    fn reinforce_skill(
        &mut self,
        id: CharacterId,
        skill: &str,
        tick: u64,
        deltas: &mut Vec<StateDelta>,
    ) {
        let Some(ch) = self.characters.get_mut(&id) else {
            return;
        };
        let entry = ch.skills.entry(skill.to_lowercase()).or_default();
        let before = entry.proficiency;
        entry.reinforce(tick);
        deltas.push(StateDelta::SkillChanged {
            character: id,
            skill: skill.to_lowercase(),
            before,
            after: entry.proficiency,
        });
    }

    fn add_transformation(
        &mut self,
        id: CharacterId,
        event: &Event,
        deltas: &mut Vec<StateDelta>,
    ) {
        let Some(ch) = self.characters.get_mut(&id) else {
            return;
        };
        if !ch.transformations.contains(&event.summary) {
            ch.transformations.push(event.summary.clone());
            deltas.push(StateDelta::TransformationAdded {
                character: id,
                flag: event.summary.clone(),
            });
        }
        // An "archived" tag retires the character from digests; the record
        // itself is preserved for continuity.
        if event.tags.iter().any(|t| t == "archived") && !ch.archived {
            ch.archived = true;
            deltas.push(StateDelta::Archived { character: id });
        }
    }

    fn revive_memory(&mut self, id: CharacterId, recalled: EventId, deltas: &mut Vec<StateDelta>) {
        let Some(ch) = self.characters.get_mut(&id) else {
            return;
        };
        // A recall of a memory this character never formed is tolerated.
        if let Some(trace) = ch.memories.get_mut(&recalled) {
            let before = trace.weight;
            trace.weight = (trace.weight + RECALL_BOOST).min(1.0);
            deltas.push(StateDelta::SalienceChanged {
                character: id,
                event: recalled,
                before: Some(before),
                after: trace.weight,
            });
        }
    }

    // ------------------------------------------------------------------
    // Decay pass
    // ------------------------------------------------------------------

    /// Settle every character's salience, mood, and relationships up to
    /// `tick`. Idempotent per tick boundary: characters already settled at
    /// or past `tick` are skipped.
    pub fn settle_all(&mut self, tick: u64, config: &DecayConfig) -> Vec<StateDelta> {
        let mut deltas = Vec::new();
        for (&id, ch) in &mut self.characters {
            settle_character(id, ch, tick, config, &mut deltas);
        }
        deltas
    }
}

fn settle_character(
    id: CharacterId,
    ch: &mut Character,
    tick: u64,
    config: &DecayConfig,
    deltas: &mut Vec<StateDelta>,
) {
    if tick <= ch.last_decay_tick {
        return; // already settled for this boundary
    }
    let elapsed = tick - ch.last_decay_tick;
    let mut jitter = JitterSource::new(id, tick, config.jitter_frac);

    // Memory salience decays toward its per-kind floor.
    for (&mem_id, trace) in &mut ch.memories {
        let policy = decay::policy_for(trace.kind, config);
        let before = trace.weight;
        trace.weight = decay::settle_fuzzy(
            trace.weight,
            policy.floor,
            policy.rate,
            elapsed,
            &mut jitter,
            0.0,
            1.0,
        );
        if (trace.weight - before).abs() > DELTA_EPSILON {
            deltas.push(StateDelta::SalienceChanged {
                character: id,
                event: mem_id,
                before: Some(before),
                after: trace.weight,
            });
        }
    }

    // Mood relaxes toward the character's baseline.
    let before_mood = ch.mood;
    ch.mood = MoodVector::new(
        decay::settle_fuzzy(
            ch.mood.valence,
            ch.baseline.valence,
            config.mood_rate,
            elapsed,
            &mut jitter,
            -1.0,
            1.0,
        ),
        decay::settle_fuzzy(
            ch.mood.energy,
            ch.baseline.energy,
            config.mood_rate,
            elapsed,
            &mut jitter,
            -1.0,
            1.0,
        ),
        decay::settle_fuzzy(
            ch.mood.tension,
            ch.baseline.tension,
            config.mood_rate,
            elapsed,
            &mut jitter,
            -1.0,
            1.0,
        ),
    );
    if mood_changed(before_mood, ch.mood) {
        deltas.push(StateDelta::MoodChanged {
            character: id,
            before: before_mood,
            after: ch.mood,
        });
    }

    // Relationship intensity cools: affinity toward 0, trust toward 0.5.
    for (&target, edge) in &mut ch.relationships {
        let before = *edge;
        edge.affinity = decay::settle_fuzzy(
            edge.affinity,
            0.0,
            config.affinity_rate,
            elapsed,
            &mut jitter,
            -1.0,
            1.0,
        );
        edge.trust = decay::settle_fuzzy(
            edge.trust,
            0.5,
            config.trust_rate,
            elapsed,
            &mut jitter,
            0.0,
            1.0,
        );
        if (edge.affinity - before.affinity).abs() > DELTA_EPSILON
            || (edge.trust - before.trust).abs() > DELTA_EPSILON
        {
            edge.last_updated_tick = tick;
            deltas.push(StateDelta::RelationshipChanged {
                source: id,
                target,
                before,
                after: *edge,
            });
        }
    }

    ch.last_decay_tick = tick;
}

fn mood_changed(before: MoodVector, after: MoodVector) -> bool {
    (after.valence - before.valence).abs() > DELTA_EPSILON
        || (after.energy - before.energy).abs() > DELTA_EPSILON
        || (after.tension - before.tension).abs() > DELTA_EPSILON
}

fn placeholder_name(id: CharacterId) -> String {
    let hex = id.0.simple().to_string();
    format!("stranger-{}", &hex[..8])
}
