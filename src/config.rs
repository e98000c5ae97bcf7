//! Configuration for the continuity engine.
//!
//! Loadable from TOML; every field has a serde default so a partial config
//! file (or none at all) yields a working engine.

use serde::{Deserialize, Serialize};

use crate::clock::Hemisphere;
use crate::environment::ClimateZone;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinuityConfig {
    /// Simulated clock settings.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Decay policy table and jitter settings.
    #[serde(default)]
    pub decay: DecayConfig,
    /// Digest assembly weights and limits.
    #[serde(default)]
    pub assembler: AssemblerConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ContinuityConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`crate::ContinuityError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::ContinuityError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Simulated clock settings. Calendar fields are pure functions of the tick
/// counter plus these static parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Ticks per simulated day. Default 24 (one tick per hour).
    #[serde(default = "default_ticks_per_day")]
    pub ticks_per_day: u64,
    /// Which hemisphere the story is set in (flips the seasons).
    #[serde(default)]
    pub hemisphere: Hemisphere,
    /// Latitude in degrees, used for daylight-hour derivation. Latitude and
    /// climate describe the story's whole region, once per session; locations
    /// differ through their own attributes (temperature bias, noise, comfort).
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    /// Climate zone of the setting.
    #[serde(default)]
    pub climate: ClimateZone,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            ticks_per_day: 24,
            hemisphere: Hemisphere::default(),
            latitude: 45.0,
            climate: ClimateZone::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decay
// ---------------------------------------------------------------------------

/// One row of the decay policy table: per-tick retention rate in (0, 1) and
/// the floor the weight settles toward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecayPolicy {
    /// Per-tick retention multiplier, in (0, 1). Higher = slower forgetting.
    pub rate: f64,
    /// Floor the weight decays toward (never below).
    pub floor: f32,
}

/// Decay policy table and jitter settings.
///
/// Event kinds are grouped into three salience classes; traumatic memories
/// decay slowest and keep the highest floor, trivial ones fade fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Salience decay for trivial kinds (dialogue, travel, weather).
    #[serde(default = "default_trivial_policy")]
    pub trivial: DecayPolicy,
    /// Salience decay for notable kinds (kindness, conflict, skill practice).
    #[serde(default = "default_notable_policy")]
    pub notable: DecayPolicy,
    /// Salience decay for traumatic kinds (betrayal, trauma, transformation).
    #[serde(default = "default_traumatic_policy")]
    pub traumatic: DecayPolicy,
    /// Per-tick retention rate for relationship affinity (decays toward 0).
    #[serde(default = "default_affinity_rate")]
    pub affinity_rate: f64,
    /// Per-tick retention rate for relationship trust (decays toward 0.5).
    #[serde(default = "default_trust_rate")]
    pub trust_rate: f64,
    /// Per-tick retention rate for mood relaxation toward baseline.
    #[serde(default = "default_mood_rate")]
    pub mood_rate: f64,
    /// Bounded jitter applied to each computed decay delta, as a fraction of
    /// the delta (0.05 = ±5 %). Seeded from (character id, tick), so replay
    /// reproduces it exactly.
    #[serde(default = "default_jitter_frac")]
    pub jitter_frac: f32,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            trivial: default_trivial_policy(),
            notable: default_notable_policy(),
            traumatic: default_traumatic_policy(),
            affinity_rate: 0.99,
            trust_rate: 0.995,
            mood_rate: 0.97,
            jitter_frac: 0.05,
        }
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Relevance weights for digest fact scoring — should sum to ~1.0.
///
/// Score = `focus·F + salience·S + recency·R`. These resolve the open
/// weighting question; tune via TOML if a story needs a different balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssemblerWeights {
    /// Weight for focus-set membership.
    #[serde(default = "default_w_focus")]
    pub focus: f32,
    /// Weight for salience / memory weight.
    #[serde(default = "default_w_salience")]
    pub salience: f32,
    /// Weight for recency.
    #[serde(default = "default_w_recency")]
    pub recency: f32,
}

impl Default for AssemblerWeights {
    fn default() -> Self {
        Self {
            focus: 0.40,
            salience: 0.35,
            recency: 0.25,
        }
    }
}

/// Digest assembly limits and weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Relevance weights.
    #[serde(default)]
    pub weights: AssemblerWeights,
    /// At most this many relationship facts are considered.
    #[serde(default = "default_max_relationships")]
    pub max_relationships: usize,
    /// At most this many recent-event facts are considered.
    #[serde(default = "default_max_recent_events")]
    pub max_recent_events: usize,
    /// Recency half-life in ticks: an event this old scores 0.5 on recency.
    #[serde(default = "default_recency_half_life")]
    pub recency_half_life_ticks: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            weights: AssemblerWeights::default(),
            max_relationships: 6,
            max_recent_events: 10,
            recency_half_life_ticks: 48,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Caller-supplied timeout for persistence operations, in milliseconds.
    /// Exceeding it surfaces as the recoverable `PersistenceTimeout` error.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    /// Detect snapshot corruption via CRC-32 checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5000,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_busy_timeout() -> u64 { 5000 }
fn default_ticks_per_day() -> u64 { 24 }
fn default_latitude() -> f64 { 45.0 }
fn default_trivial_policy() -> DecayPolicy { DecayPolicy { rate: 0.985, floor: 0.0 } }
fn default_notable_policy() -> DecayPolicy { DecayPolicy { rate: 0.995, floor: 0.05 } }
fn default_traumatic_policy() -> DecayPolicy { DecayPolicy { rate: 0.999, floor: 0.15 } }
fn default_affinity_rate() -> f64 { 0.99 }
fn default_trust_rate() -> f64 { 0.995 }
fn default_mood_rate() -> f64 { 0.97 }
fn default_jitter_frac() -> f32 { 0.05 }
fn default_w_focus() -> f32 { 0.40 }
fn default_w_salience() -> f32 { 0.35 }
fn default_w_recency() -> f32 { 0.25 }
fn default_max_relationships() -> usize { 6 }
fn default_max_recent_events() -> usize { 10 }
fn default_recency_half_life() -> u64 { 48 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = ContinuityConfig::default();
        assert_eq!(config.clock.ticks_per_day, 24);
        assert!((config.decay.affinity_rate - 0.99).abs() < 1e-9);
        let sum = config.assembler.weights.focus
            + config.assembler.weights.salience
            + config.assembler.weights.recency;
        assert!((sum - 1.0).abs() < 0.001, "weights should sum to ~1.0");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = ContinuityConfig::from_toml(
            r#"
            [clock]
            ticks_per_day = 48
            latitude = 60.0

            [decay]
            jitter_frac = 0.0
            "#,
        )
        .expect("parse");
        assert_eq!(config.clock.ticks_per_day, 48);
        assert!((config.decay.jitter_frac).abs() < f32::EPSILON);
        assert!((config.decay.mood_rate - 0.97).abs() < 1e-9);
        assert_eq!(config.assembler.max_relationships, 6);
        assert_eq!(config.persistence.busy_timeout_ms, 5000);
        assert!(config.persistence.wal_mode);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ContinuityConfig::from_toml("clock = 3").unwrap_err();
        assert!(matches!(err, crate::ContinuityError::Config(_)));
    }
}
