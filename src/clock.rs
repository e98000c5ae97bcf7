//! Simulated clock — the single time axis of a session.
//!
//! Only the tick counter is state. Day, hour, month, season, moon phase and
//! daylight hours are pure functions of the tick plus static configuration,
//! so there is nothing to drift out of sync.
//!
//! A pending-time buffer queues requested time without committing it, so a
//! regenerated LLM response (or an edited turn) can roll queued time back
//! before it ever reaches the event log.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::ClockConfig;

/// Which hemisphere the story is set in; flips the season mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    /// Northern hemisphere (default).
    #[default]
    North,
    /// Southern hemisphere — seasons reversed.
    South,
}

/// A season of the 360-day simulated year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    /// Months 3–5 (north).
    Spring,
    /// Months 6–8 (north).
    Summer,
    /// Months 9–11 (north).
    Autumn,
    /// Months 12–2 (north).
    Winter,
}

impl Season {
    /// Lowercase name for rendering.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        }
    }
}

/// One of the eight moon phases of the 29-day lunar cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoonPhase {
    /// Human-readable phase name, e.g. "Full Moon".
    pub name: &'static str,
    /// How much light the moon sheds (0.05 new → 1.0 full).
    pub light: f32,
}

const MOON_PHASES: [MoonPhase; 8] = [
    MoonPhase { name: "New Moon", light: 0.05 },
    MoonPhase { name: "Waxing Crescent", light: 0.15 },
    MoonPhase { name: "First Quarter", light: 0.3 },
    MoonPhase { name: "Waxing Gibbous", light: 0.5 },
    MoonPhase { name: "Full Moon", light: 1.0 },
    MoonPhase { name: "Waning Gibbous", light: 0.5 },
    MoonPhase { name: "Last Quarter", light: 0.3 },
    MoonPhase { name: "Waning Crescent", light: 0.15 },
];

/// Calendar fields derived from a tick. Never stored — always recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalendarState {
    /// Simulated day, 1-based.
    pub day: u64,
    /// Hour of day, 0.0 ≤ hour < 24.0.
    pub hour: f64,
    /// Day of the 360-day year, 1..=360.
    pub day_of_year: u32,
    /// Month of the year, 1..=12 (30-day months).
    pub month: u32,
    /// Simulated year, 1-based.
    pub year: u64,
    /// Season, hemisphere-adjusted.
    pub season: Season,
    /// Current moon phase.
    pub moon: MoonPhase,
    /// Whether it is night (outside 06:00–18:00).
    pub is_night: bool,
    /// Astronomical daylight hours for the configured latitude.
    pub daylight_hours: f64,
}

/// The session clock: a tick counter plus a pending-time buffer.
#[derive(Debug, Clone)]
pub struct SimClock {
    tick: u64,
    pending: u64,
    config: ClockConfig,
}

impl SimClock {
    /// Create a clock at tick 0.
    #[must_use]
    pub fn new(config: ClockConfig) -> Self {
        Self {
            tick: 0,
            pending: 0,
            config,
        }
    }

    /// Restore a clock at a saved tick.
    #[must_use]
    pub fn at_tick(tick: u64, config: ClockConfig) -> Self {
        Self {
            tick,
            pending: 0,
            config,
        }
    }

    /// Current tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Clock configuration.
    #[must_use]
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Advance the clock immediately (skip-day, travel, forced jumps).
    pub fn advance(&mut self, ticks: u64) {
        self.tick += ticks;
    }

    /// Queue ticks without committing them to the timeline yet.
    pub fn request(&mut self, ticks: u64) {
        self.pending += ticks;
    }

    /// Ticks currently queued but uncommitted.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Commit all pending ticks; returns how many were committed.
    pub fn commit(&mut self) -> u64 {
        let committed = self.pending;
        self.tick += committed;
        self.pending = 0;
        committed
    }

    /// Cancel pending ticks (LLM regeneration, user edit). Returns how many
    /// were discarded.
    pub fn rollback(&mut self) -> u64 {
        std::mem::take(&mut self.pending)
    }

    /// Derive the full calendar state for the current tick.
    #[must_use]
    pub fn calendar(&self) -> CalendarState {
        self.calendar_at(self.tick)
    }

    /// Derive the calendar state for an arbitrary tick.
    #[must_use]
    pub fn calendar_at(&self, tick: u64) -> CalendarState {
        let tpd = self.config.ticks_per_day.max(1);
        let day = tick / tpd + 1;
        let hour = (tick % tpd) as f64 * 24.0 / tpd as f64;
        let day_of_year = ((day - 1) % 360 + 1) as u32;
        let year = (day - 1) / 360 + 1;
        let month = ((day_of_year - 1) / 30 + 1).min(12);
        let season = season_for_month(month, self.config.hemisphere);
        let moon = moon_phase(day_of_year);
        let is_night = !(6.0..18.0).contains(&hour);
        let daylight_hours = daylight_hours(self.config.latitude, day_of_year);

        CalendarState {
            day,
            hour,
            day_of_year,
            month,
            year,
            season,
            moon,
            is_night,
            daylight_hours,
        }
    }
}

/// Season for a month, hemisphere-adjusted.
#[must_use]
pub fn season_for_month(month: u32, hemisphere: Hemisphere) -> Season {
    let northern = match month {
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        9..=11 => Season::Autumn,
        _ => Season::Winter,
    };
    match hemisphere {
        Hemisphere::North => northern,
        Hemisphere::South => match northern {
            Season::Spring => Season::Autumn,
            Season::Summer => Season::Winter,
            Season::Autumn => Season::Spring,
            Season::Winter => Season::Summer,
        },
    }
}

/// Moon phase for a day of the year (29-day cycle, 8 phases).
#[must_use]
pub fn moon_phase(day_of_year: u32) -> MoonPhase {
    let day_index = day_of_year % 29;
    let phase_index = ((day_index as usize) * 8 / 29).min(7);
    MOON_PHASES[phase_index]
}

/// Astronomical daylight hours from latitude and solar declination.
///
/// Polar edge cases collapse to full day or full night depending on the
/// sign of latitude × declination.
#[must_use]
pub fn daylight_hours(latitude: f64, day_of_year: u32) -> f64 {
    let declination =
        23.44 * ((360.0 / 365.0) * (f64::from(day_of_year) - 80.0)).to_radians().sin();
    let cos_hour_angle = -(latitude.to_radians().tan()) * declination.to_radians().tan();
    if cos_hour_angle < -1.0 {
        24.0
    } else if cos_hour_angle > 1.0 {
        0.0
    } else {
        24.0 * cos_hour_angle.acos() / PI
    }
}
