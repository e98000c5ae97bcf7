//! Lightweight signal extraction from turn text.
//!
//! Deliberately shallow: word lists and cue words only, no parsing beyond
//! tokenization. The LLM upstream is the real reader of the narration; this
//! layer only needs enough signal to classify the event, score its tone,
//! and spot which known characters were mentioned.

use crate::event::EventKind;
use crate::store::EntityStore;
use crate::types::CharacterId;

/// Words that pull sentiment positive.
const POSITIVE_WORDS: &[&str] = &[
    "smile", "smiles", "smiled", "laugh", "laughs", "laughed", "warm", "kind",
    "gift", "thanks", "thanked", "grateful", "happy", "joy", "relief",
    "embrace", "embraced", "hug", "hugs", "hugged", "safe", "heal", "healed",
    "friend", "love", "loves", "loved", "comfort", "comforted", "praise",
    "praised", "rescue", "rescued", "triumph", "celebrate", "celebrated",
];

/// Words that pull sentiment negative.
const NEGATIVE_WORDS: &[&str] = &[
    "blood", "wound", "wounded", "scream", "screams", "screamed", "dead",
    "death", "died", "kill", "killed", "fear", "afraid", "terror", "cry",
    "cried", "tears", "angry", "anger", "rage", "hate", "hates", "hated",
    "curse", "cursed", "pain", "hurt", "hurts", "grief", "loss", "lost",
    "threat", "threatened", "steal", "stole", "stolen", "abandoned",
];

/// Cue tables: the first kind whose cue appears wins, checked in severity
/// order so "betrayed and attacked" classifies as betrayal.
const BETRAYAL_CUES: &[&str] = &["betray", "betrays", "betrayed", "betrayal", "deceived", "backstabbed", "double-crossed"];
const TRAUMA_CUES: &[&str] = &["trauma", "tortured", "maimed", "massacre", "nightmare", "horrified", "shattered"];
const CONFLICT_CUES: &[&str] = &["fight", "fights", "fought", "attack", "attacks", "attacked", "argue", "argues", "argued", "quarrel", "brawl", "clash", "struck", "strikes", "duel"];
const KINDNESS_CUES: &[&str] = &["help", "helps", "helped", "comfort", "comforts", "comforted", "gift", "gave", "shares", "shared", "bandage", "bandaged", "protect", "protected", "soothe", "soothed"];
const SKILL_CUES: &[&str] = &["practice", "practices", "practiced", "practicing", "train", "trains", "trained", "training", "drill", "drills", "drilled", "rehearse", "rehearses", "rehearsed"];
const TRAVEL_CUES: &[&str] = &["travel", "travels", "traveled", "journey", "journeys", "journeyed", "arrive", "arrives", "arrived", "depart", "departs", "departed", "rode", "walked", "marched"];

/// Extracted signals for one ingested turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSignals {
    /// Classified event kind (defaults to dialogue).
    pub kind: EventKind,
    /// Tone estimate, -1.0 to 1.0.
    pub sentiment: f32,
    /// Memorability estimate, 0.0 to 1.0.
    pub importance: f32,
    /// Lowercase tags harvested from matched cue and charged words.
    pub tags: Vec<String>,
    /// Known characters mentioned by display name, in order of appearance.
    pub mentioned: Vec<CharacterId>,
    /// Skill name when the turn reads as skill practice.
    pub skill: Option<String>,
}

/// Extract signals from one turn of narration, using the store's character
/// roster for mention detection.
#[must_use]
pub fn extract(text: &str, store: &EntityStore) -> TurnSignals {
    let tokens = tokenize(text);

    let positive = tokens.iter().filter(|t| POSITIVE_WORDS.contains(&t.as_str())).count();
    let negative = tokens.iter().filter(|t| NEGATIVE_WORDS.contains(&t.as_str())).count();
    let charged = positive + negative;
    #[allow(clippy::cast_precision_loss)]
    let sentiment = if charged == 0 {
        0.0
    } else {
        (positive as f32 - negative as f32) / charged as f32
    };

    let kind = classify(&tokens);
    #[allow(clippy::cast_precision_loss)]
    let importance = (0.3 + 0.08 * charged as f32 + kind_bonus(kind)).clamp(0.0, 1.0);

    let mut tags = harvest_tags(&tokens, kind);
    tags.sort();
    tags.dedup();

    let mentioned = detect_mentions(&tokens, store);
    let skill = if kind == EventKind::SkillPractice {
        skill_after_cue(&tokens)
    } else {
        None
    };

    TurnSignals {
        kind,
        sentiment,
        importance,
        tags,
        mentioned,
        skill,
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn classify(tokens: &[String]) -> EventKind {
    let has = |cues: &[&str]| tokens.iter().any(|t| cues.contains(&t.as_str()));
    if has(BETRAYAL_CUES) {
        EventKind::Betrayal
    } else if has(TRAUMA_CUES) {
        EventKind::Trauma
    } else if has(CONFLICT_CUES) {
        EventKind::Conflict
    } else if has(KINDNESS_CUES) {
        EventKind::Kindness
    } else if has(SKILL_CUES) {
        EventKind::SkillPractice
    } else if has(TRAVEL_CUES) {
        EventKind::Travel
    } else {
        EventKind::Dialogue
    }
}

fn kind_bonus(kind: EventKind) -> f32 {
    match kind {
        EventKind::Betrayal | EventKind::Trauma => 0.4,
        EventKind::Conflict | EventKind::Kindness => 0.2,
        EventKind::SkillPractice | EventKind::Travel => 0.1,
        _ => 0.0,
    }
}

/// Matched cue words double as reinforcement tags.
fn harvest_tags(tokens: &[String], kind: EventKind) -> Vec<String> {
    let cues: &[&str] = match kind {
        EventKind::Betrayal => BETRAYAL_CUES,
        EventKind::Trauma => TRAUMA_CUES,
        EventKind::Conflict => CONFLICT_CUES,
        EventKind::Kindness => KINDNESS_CUES,
        EventKind::SkillPractice => SKILL_CUES,
        EventKind::Travel => TRAVEL_CUES,
        _ => &[],
    };
    tokens
        .iter()
        .filter(|t| {
            cues.contains(&t.as_str())
                || POSITIVE_WORDS.contains(&t.as_str())
                || NEGATIVE_WORDS.contains(&t.as_str())
        })
        .cloned()
        .collect()
}

/// Roster scan: a character counts as mentioned when every word of their
/// display name appears in sequence. Results are ordered by first occurrence
/// in the text, so the first-named character reads as the acting one.
fn detect_mentions(tokens: &[String], store: &EntityStore) -> Vec<CharacterId> {
    let mut mentioned: Vec<(usize, CharacterId)> = Vec::new();
    for (&id, character) in store.characters() {
        let name_words: Vec<String> = tokenize(&character.name);
        if name_words.is_empty() {
            continue;
        }
        let position = tokens
            .windows(name_words.len())
            .position(|window| window == name_words.as_slice());
        if let Some(position) = position {
            mentioned.push((position, id));
        }
    }
    mentioned.sort_by_key(|&(position, id)| (position, id));
    mentioned.into_iter().map(|(_, id)| id).collect()
}

/// The first non-cue alphabetic token after a skill cue names the skill
/// ("practices lockpicking", "trains the longbow").
fn skill_after_cue(tokens: &[String]) -> Option<String> {
    let cue_pos = tokens.iter().position(|t| SKILL_CUES.contains(&t.as_str()))?;
    tokens[cue_pos + 1..]
        .iter()
        .find(|t| !matches!(t.as_str(), "the" | "a" | "an" | "her" | "his" | "their" | "with" | "at" | "some"))
        .cloned()
}
