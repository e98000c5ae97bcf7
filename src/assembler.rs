//! Context assembly — compressing live state into a budget-bounded digest.
//!
//! The assembler turns the store, graph, log and environment into scored
//! candidate facts, ranks them, and greedily packs them against a token
//! budget. Packing is best-effort: a fact too large to fit is skipped and
//! smaller facts after it are still attempted. Output is byte-identical for
//! identical (state, budget, focus) — ties in score break on stable keys,
//! never on hash order.
//!
//! A token is a whitespace-delimited word ([`token_len`]); exceeding the
//! budget is reported in the manifest, never an error.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::SimClock;
use crate::config::AssemblerConfig;
use crate::environment::EnvironmentState;
use crate::event::{EventKind, EventLog};
use crate::relationship::RelationshipGraph;
use crate::store::{Character, EntityStore};
use crate::types::{ContextBudget, RelevanceScore};

/// Number of tokens in a text: whitespace-delimited words.
#[must_use]
pub fn token_len(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Section a digest fact belongs to; also the render order of sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// Calendar, weather, ambience.
    World,
    /// A character's current mood.
    Mood,
    /// A character's skill summary.
    Skills,
    /// A character's persistent transformation flags.
    Transformation,
    /// A directed relationship line.
    Relationship,
    /// A recent high-salience event.
    RecentEvent,
}

/// Why a fact was left out of the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The fact alone exceeds the whole budget.
    Oversized,
    /// The remaining budget could not fit this fact.
    BudgetExhausted,
}

/// One fact in the digest manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Section the fact belongs to.
    pub kind: FactKind,
    /// Rendered fact text (one line).
    pub text: String,
    /// Token cost of the fact.
    pub tokens: usize,
    /// Relevance score the fact was ranked by.
    pub score: RelevanceScore,
    /// Why the fact was excluded; `None` for included facts.
    pub reason: Option<ExclusionReason>,
}

/// Serializable record of what the digest contains and what it dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestManifest {
    /// The requested token ceiling.
    pub max_tokens: usize,
    /// Tokens actually used.
    pub used_tokens: usize,
    /// Facts included, in render order.
    pub included: Vec<ManifestEntry>,
    /// Facts excluded, in ranking order.
    pub excluded: Vec<ManifestEntry>,
    /// True when at least one fact was left out, whether oversized on its
    /// own or squeezed out by earlier facts. A warning condition, never an
    /// error.
    pub budget_exhausted: bool,
}

/// A scored candidate fact. `order` is the generation index: facts are
/// generated in section order, so it doubles as the stable render key and
/// the final ranking tie-break.
#[derive(Debug, Clone)]
struct Fact {
    kind: FactKind,
    text: String,
    tokens: usize,
    score: RelevanceScore,
    order: usize,
}

/// Stateless digest builder; all state arrives through `assemble`.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    config: AssemblerConfig,
}

impl ContextAssembler {
    /// Create an assembler with the given weights and limits.
    #[must_use]
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Build a prompt-ready digest and its manifest.
    ///
    /// Renders one fact per line in stable section order: world, characters
    /// (focused first), relationships, recent events.
    #[must_use]
    pub fn assemble(
        &self,
        store: &EntityStore,
        log: &EventLog,
        graph: &RelationshipGraph,
        clock: &SimClock,
        environment: &EnvironmentState,
        budget: &ContextBudget,
    ) -> (String, DigestManifest) {
        let facts = self.collect_facts(store, log, graph, clock, environment, budget);
        let (included, manifest) = pack(facts, budget.max_tokens);

        if manifest.budget_exhausted {
            warn!(
                session = %store.session_id(),
                max_tokens = budget.max_tokens,
                used = manifest.used_tokens,
                dropped = manifest.excluded.len(),
                "Digest budget exhausted"
            );
        }

        let digest = included
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        (digest, manifest)
    }

    // ------------------------------------------------------------------
    // Fact generation
    // ------------------------------------------------------------------

    fn collect_facts(
        &self,
        store: &EntityStore,
        log: &EventLog,
        graph: &RelationshipGraph,
        clock: &SimClock,
        environment: &EnvironmentState,
        budget: &ContextBudget,
    ) -> Vec<Fact> {
        let mut facts = Vec::new();
        let now = store.tick();

        facts.push(self.fact(FactKind::World, environment.describe(), 1.0, facts.len()));

        // Focused characters first (in focus order), then the rest by id.
        let mut roster: Vec<&Character> = Vec::new();
        for &id in budget.focus.characters() {
            if let Some(ch) = store.character(id) {
                if !ch.archived {
                    roster.push(ch);
                }
            }
        }
        for ch in store.characters().values() {
            if !ch.archived && !budget.focus.contains_character(ch.id) {
                roster.push(ch);
            }
        }

        for &ch in &roster {
            let focused = budget.focus.contains_character(ch.id);
            self.character_facts(ch, store, focused, &mut facts);
        }

        for (source, target, edge) in graph.strongest(self.config.max_relationships) {
            let (Some(a), Some(b)) = (store.character(source), store.character(target)) else {
                continue;
            };
            if a.archived || b.archived {
                continue;
            }
            let focused = budget.focus.contains_character(source)
                || budget.focus.contains_character(target);
            let text = format!(
                "{} is {} {} (trust {:.2}).",
                a.name,
                edge.label(),
                b.name,
                edge.trust
            );
            let order = facts.len();
            facts.push(self.scored_fact(
                FactKind::Relationship,
                text,
                focused,
                edge.affinity.abs(),
                self.recency(now, edge.last_updated_tick),
                order,
            ));
        }

        self.recent_event_facts(store, log, clock, budget, &mut facts);
        facts
    }

    fn character_facts(
        &self,
        ch: &Character,
        store: &EntityStore,
        focused: bool,
        facts: &mut Vec<Fact>,
    ) {
        let whereabouts = ch
            .location
            .and_then(|l| store.location(l))
            .map_or(String::new(), |l| format!(" at {}", l.name));
        let mood_text = format!("{} is {}{}.", ch.name, ch.mood.label(), whereabouts);
        let order = facts.len();
        // Mood intensity normalized by the vector's maximum magnitude.
        let intensity = (ch.mood.intensity() / 3.0_f32.sqrt()).min(1.0);
        facts.push(self.scored_fact(FactKind::Mood, mood_text, focused, intensity, 1.0, order));

        if !ch.skills.is_empty() {
            let now = store.tick();
            let summary = ch
                .skills
                .iter()
                .map(|(name, s)| format!("{name} ({}, {})", s.tier().name(), s.clarity(now)))
                .collect::<Vec<_>>()
                .join(", ");
            let best = ch
                .skills
                .values()
                .map(|s| s.proficiency)
                .fold(0.0_f32, f32::max);
            let order = facts.len();
            facts.push(self.scored_fact(
                FactKind::Skills,
                format!("{} skills: {summary}.", ch.name),
                focused,
                best,
                1.0,
                order,
            ));
        }

        if !ch.transformations.is_empty() {
            let order = facts.len();
            facts.push(self.scored_fact(
                FactKind::Transformation,
                format!("{} bears: {}.", ch.name, ch.transformations.join("; ")),
                focused,
                0.8,
                1.0,
                order,
            ));
        }
    }

    fn recent_event_facts(
        &self,
        store: &EntityStore,
        log: &EventLog,
        clock: &SimClock,
        budget: &ContextBudget,
        facts: &mut Vec<Fact>,
    ) {
        let now = store.tick();
        let mut recent: Vec<_> = log
            .events()
            .iter()
            .rev()
            .filter(|e| {
                !matches!(
                    e.kind,
                    EventKind::TimeAdvanced
                        | EventKind::CharacterRegistered
                        | EventKind::LocationRegistered
                )
            })
            .take(self.config.max_recent_events)
            .collect();
        recent.reverse(); // chronological in the digest

        for event in recent {
            let focused = event
                .actors
                .iter()
                .chain(event.target.iter())
                .any(|&id| budget.focus.contains_character(id))
                || event
                    .location
                    .is_some_and(|l| budget.focus.contains_location(l));
            // Salience as the strongest surviving trace of the event, so
            // decayed memories rank below fresh ones; raw importance is the
            // fallback for traceless events.
            let strongest_trace = event
                .actors
                .iter()
                .chain(event.target.iter())
                .filter_map(|id| store.character(*id))
                .filter_map(|ch| ch.memories.get(&event.id))
                .map(|t| t.weight)
                .fold(0.0_f32, f32::max);
            let salience = if strongest_trace > 0.0 {
                strongest_trace
            } else {
                event.importance
            };
            let day = clock.calendar_at(event.tick).day;
            let order = facts.len();
            facts.push(self.scored_fact(
                FactKind::RecentEvent,
                format!("Day {day}: {}.", event.summary.trim_end_matches('.')),
                focused,
                salience,
                self.recency(now, event.tick),
                order,
            ));
        }
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    fn scored_fact(
        &self,
        kind: FactKind,
        text: String,
        focused: bool,
        salience: f32,
        recency: f32,
        order: usize,
    ) -> Fact {
        let focus = if focused { 1.0 } else { 0.0 };
        self.fact(
            kind,
            text,
            self.config.weights.focus * focus
                + self.config.weights.salience * salience.clamp(0.0, 1.0)
                + self.config.weights.recency * recency.clamp(0.0, 1.0),
            order,
        )
    }

    fn fact(&self, kind: FactKind, text: String, score: f32, order: usize) -> Fact {
        let tokens = token_len(&text);
        Fact {
            kind,
            tokens,
            score: RelevanceScore::new(score),
            text,
            order,
        }
    }

    /// Exponential recency: 0.5 at one half-life of age.
    #[allow(clippy::cast_precision_loss)]
    fn recency(&self, now: u64, then: u64) -> f32 {
        let half_life = self.config.recency_half_life_ticks.max(1);
        let age = now.saturating_sub(then);
        0.5_f32.powf(age as f32 / half_life as f32)
    }
}

/// Greedy best-effort packing: rank by (score desc, generation order), take
/// every fact that still fits. Returns the included facts in render order
/// plus the full manifest.
fn pack(facts: Vec<Fact>, max_tokens: usize) -> (Vec<Fact>, DigestManifest) {
    let mut ranked = facts;
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.order.cmp(&b.order)));

    let mut used = 0;
    let mut included: Vec<Fact> = Vec::new();
    let mut excluded: Vec<ManifestEntry> = Vec::new();

    for fact in ranked {
        if fact.tokens > max_tokens {
            excluded.push(entry(&fact, Some(ExclusionReason::Oversized)));
        } else if used + fact.tokens > max_tokens {
            excluded.push(entry(&fact, Some(ExclusionReason::BudgetExhausted)));
        } else {
            used += fact.tokens;
            included.push(fact);
        }
    }

    included.sort_by_key(|f| (f.kind, f.order));
    // Any dropped fact counts: a budget too small for even one fact is the
    // clearest exhaustion of all.
    let budget_exhausted = !excluded.is_empty();

    let manifest = DigestManifest {
        max_tokens,
        used_tokens: used,
        included: included.iter().map(|f| entry(f, None)).collect(),
        excluded,
        budget_exhausted,
    };
    (included, manifest)
}

fn entry(fact: &Fact, reason: Option<ExclusionReason>) -> ManifestEntry {
    ManifestEntry {
        kind: fact.kind,
        text: fact.text.clone(),
        tokens: fact.tokens,
        score: fact.score,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClockConfig, DecayConfig};
    use crate::environment::{ClimateZone, Environment};
    use crate::event::{EventDetail, EventDraft};
    use crate::store::EntityStore;
    use crate::types::{CharacterId, FocusSet, MoodVector, SessionId};

    fn twenty_token_fact(order: usize, score: f32) -> Fact {
        let text = std::iter::repeat("word").take(20).collect::<Vec<_>>().join(" ");
        Fact {
            kind: FactKind::RecentEvent,
            tokens: token_len(&text),
            text,
            score: RelevanceScore::new(score),
            order,
        }
    }

    #[test]
    fn token_len_counts_whitespace_words() {
        assert_eq!(token_len("one two  three\nfour"), 4);
        assert_eq!(token_len(""), 0);
        assert_eq!(token_len("   "), 0);
    }

    #[test]
    fn budget_fifty_fits_two_of_five_twenty_token_facts() {
        let facts: Vec<Fact> = (0..5).map(|i| twenty_token_fact(i, 1.0)).collect();
        let (included, manifest) = pack(facts, 50);
        assert_eq!(included.len(), 2);
        assert_eq!(manifest.excluded.len(), 3);
        assert_eq!(manifest.used_tokens, 40);
        assert!(manifest.budget_exhausted);
        for entry in &manifest.excluded {
            assert_eq!(entry.reason, Some(ExclusionReason::BudgetExhausted));
        }
    }

    #[test]
    fn oversized_fact_is_skipped_but_later_facts_still_fit() {
        let huge = Fact {
            kind: FactKind::World,
            text: std::iter::repeat("w").take(100).collect::<Vec<_>>().join(" "),
            tokens: 100,
            score: RelevanceScore::new(2.0),
            order: 0,
        };
        let small = twenty_token_fact(1, 0.5);
        let (included, manifest) = pack(vec![huge, small], 30);
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].tokens, 20);
        assert_eq!(manifest.excluded[0].reason, Some(ExclusionReason::Oversized));
    }

    #[test]
    fn zero_budget_includes_nothing() {
        let facts: Vec<Fact> = (0..3).map(|i| twenty_token_fact(i, 1.0)).collect();
        let (included, manifest) = pack(facts, 0);
        assert!(included.is_empty());
        assert_eq!(manifest.used_tokens, 0);
    }

    #[test]
    fn budget_below_every_fact_still_flags_exhaustion() {
        let facts: Vec<Fact> = (0..2).map(|i| twenty_token_fact(i, 1.0)).collect();
        let (included, manifest) = pack(facts, 2);
        assert!(included.is_empty(), "nothing fits in a 2-token budget");
        assert_eq!(manifest.excluded.len(), 2);
        assert!(
            manifest.budget_exhausted,
            "an empty digest with dropped facts must warn the caller"
        );
    }

    fn scenario() -> (EntityStore, EventLog, SimClock, CharacterId, CharacterId) {
        let session = SessionId::new();
        let mut log = EventLog::new(session);
        let mut store = EntityStore::new(session);
        let config = DecayConfig::default();
        let hero = CharacterId::new();
        let rival = CharacterId::new();
        for (id, name) in [(hero, "Hero"), (rival, "Rival")] {
            let event_id = log
                .append(
                    EventDraft::new(0, EventKind::CharacterRegistered, format!("{name} arrives"))
                        .actors(vec![id])
                        .detail(EventDetail::NewCharacter {
                            name: name.to_string(),
                            baseline: MoodVector::NEUTRAL,
                        }),
                )
                .expect("append");
            let event = log.get(event_id).expect("stored").clone();
            store.apply(&event, &config).expect("apply");
        }
        let event_id = log
            .append(
                EventDraft::new(5, EventKind::Conflict, "Hero and Rival clash at the gate")
                    .actors(vec![hero])
                    .target(rival)
                    .weighted(-0.5, 0.8),
            )
            .expect("append");
        let event = log.get(event_id).expect("stored").clone();
        store.apply(&event, &config).expect("apply");
        let clock = SimClock::at_tick(5, ClockConfig::default());
        (store, log, clock, hero, rival)
    }

    #[test]
    fn digest_is_deterministic_for_identical_inputs() {
        let (store, log, clock, hero, _) = scenario();
        let graph = RelationshipGraph::rebuild(&store);
        let env = Environment::new(store.session_id(), ClimateZone::Temperate);
        let state = env.state(&clock, None, 0);
        let assembler = ContextAssembler::new(AssemblerConfig::default());
        let budget = ContextBudget::new(200, FocusSet::characters_only(vec![hero]));

        let (d1, m1) = assembler.assemble(&store, &log, &graph, &clock, &state, &budget);
        let (d2, m2) = assembler.assemble(&store, &log, &graph, &clock, &state, &budget);
        assert_eq!(d1, d2, "digest must be byte-identical");
        assert_eq!(m1, m2);
    }

    #[test]
    fn digest_respects_budget_and_flags_exhaustion() {
        let (store, log, clock, hero, _) = scenario();
        let graph = RelationshipGraph::rebuild(&store);
        let env = Environment::new(store.session_id(), ClimateZone::Temperate);
        let state = env.state(&clock, None, 0);
        let assembler = ContextAssembler::new(AssemblerConfig::default());

        let tight = ContextBudget::new(8, FocusSet::characters_only(vec![hero]));
        let (digest, manifest) = assembler.assemble(&store, &log, &graph, &clock, &state, &tight);
        assert!(token_len(&digest) <= 8, "digest exceeds budget: {digest:?}");
        assert_eq!(token_len(&digest), manifest.used_tokens);
        assert!(manifest.budget_exhausted);
    }

    #[test]
    fn focused_character_outranks_unfocused_under_pressure() {
        let (store, log, clock, hero, rival) = scenario();
        let graph = RelationshipGraph::rebuild(&store);
        let env = Environment::new(store.session_id(), ClimateZone::Temperate);
        let state = env.state(&clock, None, 0);
        let assembler = ContextAssembler::new(AssemblerConfig::default());

        let budget = ContextBudget::new(500, FocusSet::characters_only(vec![rival]));
        let (_, manifest) = assembler.assemble(&store, &log, &graph, &clock, &state, &budget);
        let mood_entries: Vec<_> = manifest
            .included
            .iter()
            .filter(|e| e.kind == FactKind::Mood)
            .collect();
        let rival_name = store.character(rival).expect("rival").name.clone();
        let hero_name = store.character(hero).expect("hero").name.clone();
        let rival_score = mood_entries
            .iter()
            .find(|e| e.text.contains(&rival_name))
            .map(|e| e.score)
            .expect("rival mood fact");
        let hero_score = mood_entries
            .iter()
            .find(|e| e.text.contains(&hero_name))
            .map(|e| e.score)
            .expect("hero mood fact");
        assert!(rival_score > hero_score);
    }

    #[test]
    fn digest_sections_render_in_stable_order() {
        let (store, log, clock, hero, _) = scenario();
        let graph = RelationshipGraph::rebuild(&store);
        let env = Environment::new(store.session_id(), ClimateZone::Temperate);
        let state = env.state(&clock, None, 0);
        let assembler = ContextAssembler::new(AssemblerConfig::default());
        let budget = ContextBudget::new(500, FocusSet::characters_only(vec![hero]));

        let (_, manifest) = assembler.assemble(&store, &log, &graph, &clock, &state, &budget);
        let kinds: Vec<FactKind> = manifest.included.iter().map(|e| e.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted, "sections must render in declared order");
        assert_eq!(manifest.included[0].kind, FactKind::World);
    }
}
