//! Relationship edges and the derived relationship graph.
//!
//! Characters own their outbound directed edges (asymmetric affinity is
//! allowed); the graph is a rebuildable index over the entity store, never
//! an independent source of truth. Absent edges read as the neutral default
//! rather than erroring, so partial history never fails a lookup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::EntityStore;
use crate::types::CharacterId;

/// A directed relationship edge from one character to another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// How warmly the source regards the target, -1.0 to 1.0.
    pub affinity: f32,
    /// How far the source trusts the target, 0.0 to 1.0.
    pub trust: f32,
    /// Tick of the last mutation or settling pass that touched this edge.
    pub last_updated_tick: u64,
}

impl RelationshipEdge {
    /// The default edge for strangers: zero affinity, neutral trust.
    pub const NEUTRAL: Self = Self {
        affinity: 0.0,
        trust: 0.5,
        last_updated_tick: 0,
    };

    /// Apply bounded deltas, clamping to declared ranges.
    #[must_use]
    pub fn adjusted(&self, d_affinity: f32, d_trust: f32, tick: u64) -> Self {
        Self {
            affinity: (self.affinity + d_affinity).clamp(-1.0, 1.0),
            trust: (self.trust + d_trust).clamp(0.0, 1.0),
            last_updated_tick: tick,
        }
    }

    /// One-word label for prompt rendering.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self.affinity {
            a if a > 0.6 => "devoted to",
            a if a > 0.25 => "fond of",
            a if a > -0.25 => "neutral toward",
            a if a > -0.6 => "wary of",
            _ => "hostile toward",
        }
    }
}

impl Default for RelationshipEdge {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Derived, rebuildable index of all directed edges in a session.
///
/// `rebuild` produces an independent snapshot, safe to read while the store
/// moves on under its own lock. Never persisted — the store's per-character
/// edge maps are the serialized form.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    edges: BTreeMap<(CharacterId, CharacterId), RelationshipEdge>,
}

impl RelationshipGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from the entity store's ground truth.
    #[must_use]
    pub fn rebuild(store: &EntityStore) -> Self {
        let mut edges = BTreeMap::new();
        for (source, character) in store.characters() {
            for (target, edge) in &character.relationships {
                edges.insert((*source, *target), *edge);
            }
        }
        Self { edges }
    }

    /// The directed edge from `a` to `b`, or the neutral default.
    /// Edge absence is not an error.
    #[must_use]
    pub fn get(&self, a: CharacterId, b: CharacterId) -> RelationshipEdge {
        self.edges
            .get(&(a, b))
            .copied()
            .unwrap_or(RelationshipEdge::NEUTRAL)
    }

    /// Number of stored edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no stored edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All edges in stable (source, target) order.
    pub fn iter(&self) -> impl Iterator<Item = (CharacterId, CharacterId, RelationshipEdge)> + '_ {
        self.edges.iter().map(|((a, b), e)| (*a, *b, *e))
    }

    /// The strongest edges by |affinity|, stable-ordered: ties break on
    /// (source, target) id so identical state always ranks identically.
    #[must_use]
    pub fn strongest(&self, limit: usize) -> Vec<(CharacterId, CharacterId, RelationshipEdge)> {
        let mut all: Vec<_> = self.iter().collect();
        all.sort_by(|(a1, b1, e1), (a2, b2, e2)| {
            ordered_float::OrderedFloat(e2.affinity.abs())
                .cmp(&ordered_float::OrderedFloat(e1.affinity.abs()))
                .then_with(|| (a1, b1).cmp(&(a2, b2)))
        });
        all.truncate(limit);
        all
    }
}
