//! Core type definitions shared across the continuity engine.
//!
//! Identity newtypes are UUID-backed and serializable; bounded scalars are
//! clamped at construction so invalid values cannot enter the state model.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a roleplay session.
///
/// All engine state is scoped per-session; sessions are fully independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a character in the fiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    /// Create a new random character ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub Uuid);

impl LocationId {
    /// Create a new random location ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an event in a session's log.
///
/// Event IDs are the insertion sequence number, so they double as the total
/// order within a tick and as the snapshot checkpoint tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Mood
// ---------------------------------------------------------------------------

/// Three-axis mood vector. Each axis ranges from -1.0 to 1.0:
///
/// - **Valence**: miserable (-1) → delighted (+1)
/// - **Energy**: drained (-1) → animated (+1)
/// - **Tension**: relaxed (-1) → strained (+1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodVector {
    /// Miserable (-1.0) to delighted (+1.0).
    pub valence: f32,
    /// Drained (-1.0) to animated (+1.0).
    pub energy: f32,
    /// Relaxed (-1.0) to strained (+1.0).
    pub tension: f32,
}

impl MoodVector {
    /// Neutral mood.
    pub const NEUTRAL: Self = Self {
        valence: 0.0,
        energy: 0.0,
        tension: 0.0,
    };

    /// Create a mood vector, clamping each axis to [-1, 1].
    #[must_use]
    pub fn new(valence: f32, energy: f32, tension: f32) -> Self {
        Self {
            valence: valence.clamp(-1.0, 1.0),
            energy: energy.clamp(-1.0, 1.0),
            tension: tension.clamp(-1.0, 1.0),
        }
    }

    /// Overall emotional intensity (vector magnitude).
    #[must_use]
    pub fn intensity(&self) -> f32 {
        (self.valence * self.valence + self.energy * self.energy + self.tension * self.tension)
            .sqrt()
    }

    /// Shift the mood by bounded deltas, clamping each axis.
    #[must_use]
    pub fn shifted(&self, d_valence: f32, d_energy: f32, d_tension: f32) -> Self {
        Self::new(
            self.valence + d_valence,
            self.energy + d_energy,
            self.tension + d_tension,
        )
    }

    /// One-word label for prompt rendering.
    #[must_use]
    pub fn label(&self) -> &'static str {
        if self.tension > 0.5 {
            return if self.valence < 0.0 { "distressed" } else { "keyed-up" };
        }
        match (self.valence, self.energy) {
            (v, e) if v > 0.4 && e > 0.2 => "cheerful",
            (v, _) if v > 0.4 => "content",
            (v, e) if v < -0.4 && e > 0.2 => "agitated",
            (v, _) if v < -0.4 => "gloomy",
            (_, e) if e < -0.4 => "weary",
            _ => "even-tempered",
        }
    }
}

impl Default for MoodVector {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

// ---------------------------------------------------------------------------
// Focus & Budget
// ---------------------------------------------------------------------------

/// The entities and locations relevant to the current chat turn.
///
/// Members are kept sorted so two focus sets with the same contents compare
/// equal and drive byte-identical digest output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSet {
    /// Characters in focus, sorted, deduplicated.
    characters: Vec<CharacterId>,
    /// Locations in focus, sorted, deduplicated.
    locations: Vec<LocationId>,
}

impl FocusSet {
    /// Build a focus set from character and location ids (order-insensitive).
    #[must_use]
    pub fn new(characters: Vec<CharacterId>, locations: Vec<LocationId>) -> Self {
        let mut characters = characters;
        characters.sort_unstable();
        characters.dedup();
        let mut locations = locations;
        locations.sort_unstable();
        locations.dedup();
        Self {
            characters,
            locations,
        }
    }

    /// Focus set containing only characters.
    #[must_use]
    pub fn characters_only(characters: Vec<CharacterId>) -> Self {
        Self::new(characters, Vec::new())
    }

    /// Characters in focus, in stable order.
    #[must_use]
    pub fn characters(&self) -> &[CharacterId] {
        &self.characters
    }

    /// Locations in focus, in stable order.
    #[must_use]
    pub fn locations(&self) -> &[LocationId] {
        &self.locations
    }

    /// Whether a character is in focus.
    #[must_use]
    pub fn contains_character(&self, id: CharacterId) -> bool {
        self.characters.binary_search(&id).is_ok()
    }

    /// Whether a location is in focus.
    #[must_use]
    pub fn contains_location(&self, id: LocationId) -> bool {
        self.locations.binary_search(&id).is_ok()
    }

    /// Whether the focus set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty() && self.locations.is_empty()
    }
}

/// Requested digest budget: a token ceiling plus the turn's focus set.
///
/// A token is a whitespace-delimited word; see [`crate::assembler::token_len`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Maximum rendered digest length, in tokens.
    pub max_tokens: usize,
    /// Entities and locations relevant this turn.
    pub focus: FocusSet,
}

impl ContextBudget {
    /// Create a budget with the given token ceiling and focus set.
    #[must_use]
    pub fn new(max_tokens: usize, focus: FocusSet) -> Self {
        Self { max_tokens, focus }
    }
}

// ---------------------------------------------------------------------------
// Relevance Score
// ---------------------------------------------------------------------------

/// Total-ordered relevance score used to rank digest facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelevanceScore(pub OrderedFloat<f32>);

impl RelevanceScore {
    /// Wrap a raw score.
    #[must_use]
    pub fn new(score: f32) -> Self {
        Self(OrderedFloat(score))
    }

    /// Raw score value.
    #[must_use]
    pub fn value(self) -> f32 {
        self.0.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_axes_are_clamped() {
        let m = MoodVector::new(2.0, -3.0, 0.5);
        assert!((m.valence - 1.0).abs() < f32::EPSILON);
        assert!((m.energy + 1.0).abs() < f32::EPSILON);
        assert!((m.tension - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn mood_shift_stays_in_bounds() {
        let m = MoodVector::new(0.9, 0.0, 0.0).shifted(0.5, 0.0, -2.0);
        assert!((m.valence - 1.0).abs() < f32::EPSILON);
        assert!((m.tension + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn focus_set_is_order_insensitive() {
        let a = CharacterId::new();
        let b = CharacterId::new();
        let f1 = FocusSet::characters_only(vec![a, b]);
        let f2 = FocusSet::characters_only(vec![b, a, b]);
        assert_eq!(f1, f2);
        assert!(f1.contains_character(a));
        assert!(!f1.contains_location(LocationId::new()));
    }

    #[test]
    fn mood_labels_cover_quadrants() {
        assert_eq!(MoodVector::new(0.8, 0.5, 0.0).label(), "cheerful");
        assert_eq!(MoodVector::new(-0.8, 0.0, 0.0).label(), "gloomy");
        assert_eq!(MoodVector::new(-0.2, 0.0, 0.9).label(), "distressed");
        assert_eq!(MoodVector::NEUTRAL.label(), "even-tempered");
    }
}
