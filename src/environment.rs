//! Ambient world state — climate, weather, temperature, light.
//!
//! Nothing here is stored: the whole environment is a pure function of
//! (session seed, tick, location), so it never drifts from the timeline and
//! replays byte-identically. Weather re-rolls once per simulated day from a
//! seeded PRNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::clock::{CalendarState, Season, SimClock};
use crate::store::Location;
use crate::types::SessionId;

/// Broad climate of the story's setting; biases the weather table and the
/// baseline temperature. Climate (with latitude) is a property of the whole
/// setting, configured once per session; per-location variation comes from
/// [`Location::temperature_bias`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimateZone {
    /// Four full seasons (default).
    #[default]
    Temperate,
    /// Hot and wet, storm-prone, no snow.
    Tropical,
    /// Hot days, cold nights, almost no rain.
    Arid,
    /// Long winters, short cool summers.
    Polar,
}

/// Daily weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    /// Clear skies.
    Clear,
    /// Grey cloud cover.
    Overcast,
    /// Mist or fog.
    Fog,
    /// Steady rain.
    Rain,
    /// Thunderstorm.
    Storm,
    /// Falling snow.
    Snow,
    /// Oppressive heat.
    Heatwave,
}

impl Weather {
    /// Lowercase name for rendering.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Weather::Clear => "clear",
            Weather::Overcast => "overcast",
            Weather::Fog => "fog",
            Weather::Rain => "rain",
            Weather::Storm => "storm",
            Weather::Snow => "snow",
            Weather::Heatwave => "heatwave",
        }
    }
}

/// Snapshot of the ambient world at one tick, for one optional location.
/// Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentState {
    /// Calendar fields at the tick.
    pub calendar: CalendarState,
    /// Today's weather.
    pub weather: Weather,
    /// Normalized temperature, -1.0 (frigid) to 1.0 (scorching).
    pub temperature: f32,
    /// Ambient noise, 0.0 (still) to 1.0 (deafening). Starts from the
    /// location's baseline; crowds and storms raise it, nightfall dampens it.
    pub noise: f32,
    /// How far one can see, 0.0 (blind) to 1.0 (clear daylight). Night
    /// visibility scales with moonlight; fog and storms cut it further.
    pub visibility: f32,
    /// How safe the surroundings feel, 0.0 (perilous) to 1.0 (secure).
    /// Dark, moonless nights and storms erode it.
    pub safety: f32,
    /// Effective comfort, 0.0 (hostile) to 1.0 (homely): the location's
    /// baseline worn down by temperature extremes and foul weather.
    pub comfort: f32,
    /// A notable landmark of the focused location, if it has one.
    pub landmark: Option<String>,
}

impl EnvironmentState {
    /// Coarse temperature word for prompt rendering.
    #[must_use]
    pub fn temperature_label(&self) -> &'static str {
        match self.temperature {
            t if t < -0.6 => "frigid",
            t if t < -0.25 => "cold",
            t if t < 0.0 => "cool",
            t if t < 0.25 => "mild",
            t if t < 0.6 => "warm",
            _ => "scorching",
        }
    }

    /// One-line ambience sentence for the digest.
    #[must_use]
    pub fn describe(&self) -> String {
        let time_of_day = if self.calendar.is_night { "night" } else { "day" };
        let landmark = self
            .landmark
            .as_ref()
            .map_or_else(String::new, |l| format!(" Nearby: {l}."));
        format!(
            "Day {}, {}, {} under a {}, {} and {} ({:.0}h of daylight).{landmark}",
            self.calendar.day,
            self.calendar.season.name(),
            time_of_day,
            self.calendar.moon.name.to_lowercase(),
            self.weather.name(),
            self.temperature_label(),
            self.calendar.daylight_hours,
        )
    }
}

/// Derives ambient state from the session seed. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct Environment {
    seed: u64,
    climate: ClimateZone,
}

impl Environment {
    /// Build the environment for a session. The seed is folded from the
    /// session id, so two sessions see different weather but one session
    /// always replays the same.
    #[must_use]
    pub fn new(session_id: SessionId, climate: ClimateZone) -> Self {
        let bits = session_id.0.as_u128();
        Self {
            seed: (bits as u64) ^ ((bits >> 64) as u64),
            climate,
        }
    }

    /// Climate of the setting.
    #[must_use]
    pub fn climate(&self) -> ClimateZone {
        self.climate
    }

    /// Ambient state at the clock's current tick. `occupants` is how many
    /// characters are present at the location, for the crowd noise term.
    #[must_use]
    pub fn state(
        &self,
        clock: &SimClock,
        location: Option<&Location>,
        occupants: usize,
    ) -> EnvironmentState {
        self.state_at(clock, clock.tick(), location, occupants)
    }

    /// Ambient state at an arbitrary tick.
    #[must_use]
    pub fn state_at(
        &self,
        clock: &SimClock,
        tick: u64,
        location: Option<&Location>,
        occupants: usize,
    ) -> EnvironmentState {
        let calendar = clock.calendar_at(tick);
        let weather = self.weather_for_day(calendar.day, calendar.season);
        let temperature = temperature(self.climate, &calendar, weather, location);
        let noise = ambient_noise(weather, calendar.is_night, location, occupants);
        let visibility = visibility(weather, &calendar);
        let comfort = comfort(temperature, weather, location);
        let safety = safety(comfort, &calendar, weather);
        let landmark = location.and_then(|l| l.landmarks.first().cloned());
        EnvironmentState {
            calendar,
            weather,
            temperature,
            noise,
            visibility,
            safety,
            comfort,
            landmark,
        }
    }

    /// Weather for a simulated day: one weighted roll from a PRNG seeded by
    /// (session seed, day).
    #[must_use]
    pub fn weather_for_day(&self, day: u64, season: Season) -> Weather {
        let mut rng =
            StdRng::seed_from_u64(self.seed ^ day.wrapping_mul(0xA076_1D64_78BD_642F));
        let roll: f32 = rng.gen();
        pick_weather(self.climate, season, roll)
    }
}

/// Weighted weather table per (climate, season). Weights are cumulative
/// thresholds against a uniform roll in [0, 1).
fn pick_weather(climate: ClimateZone, season: Season, roll: f32) -> Weather {
    let table: &[(f32, Weather)] = match (climate, season) {
        (ClimateZone::Temperate, Season::Winter) => &[
            (0.30, Weather::Clear),
            (0.60, Weather::Overcast),
            (0.72, Weather::Fog),
            (0.80, Weather::Rain),
            (1.00, Weather::Snow),
        ],
        (ClimateZone::Temperate, Season::Summer) => &[
            (0.50, Weather::Clear),
            (0.70, Weather::Overcast),
            (0.85, Weather::Rain),
            (0.93, Weather::Storm),
            (1.00, Weather::Heatwave),
        ],
        (ClimateZone::Temperate, _) => &[
            (0.40, Weather::Clear),
            (0.65, Weather::Overcast),
            (0.75, Weather::Fog),
            (0.95, Weather::Rain),
            (1.00, Weather::Storm),
        ],
        (ClimateZone::Tropical, _) => &[
            (0.35, Weather::Clear),
            (0.55, Weather::Overcast),
            (0.80, Weather::Rain),
            (0.95, Weather::Storm),
            (1.00, Weather::Heatwave),
        ],
        (ClimateZone::Arid, _) => &[
            (0.70, Weather::Clear),
            (0.85, Weather::Overcast),
            (0.90, Weather::Fog),
            (0.95, Weather::Rain),
            (1.00, Weather::Heatwave),
        ],
        (ClimateZone::Polar, Season::Summer) => &[
            (0.45, Weather::Clear),
            (0.75, Weather::Overcast),
            (0.90, Weather::Rain),
            (1.00, Weather::Fog),
        ],
        (ClimateZone::Polar, _) => &[
            (0.25, Weather::Clear),
            (0.50, Weather::Overcast),
            (0.65, Weather::Fog),
            (1.00, Weather::Snow),
        ],
    };
    for &(threshold, weather) in table {
        if roll < threshold {
            return weather;
        }
    }
    Weather::Clear
}

/// Normalized temperature from climate base, season, night cooling, weather
/// and the location's own bias. Clamped to [-1, 1].
fn temperature(
    climate: ClimateZone,
    calendar: &CalendarState,
    weather: Weather,
    location: Option<&Location>,
) -> f32 {
    let climate_base = match climate {
        ClimateZone::Temperate => 0.0,
        ClimateZone::Tropical => 0.4,
        ClimateZone::Arid => 0.3,
        ClimateZone::Polar => -0.4,
    };
    let season_shift = match calendar.season {
        Season::Spring | Season::Autumn => 0.0,
        Season::Summer => 0.35,
        Season::Winter => -0.35,
    };
    // Arid nights swing hard.
    let night_shift = if calendar.is_night {
        if climate == ClimateZone::Arid {
            -0.35
        } else {
            -0.15
        }
    } else {
        0.0
    };
    let weather_shift = match weather {
        Weather::Snow => -0.20,
        Weather::Rain | Weather::Storm => -0.10,
        Weather::Fog => -0.05,
        Weather::Heatwave => 0.30,
        Weather::Clear | Weather::Overcast => 0.0,
    };
    let location_bias = location.map_or(0.0, |l| l.temperature_bias);

    (climate_base + season_shift + night_shift + weather_shift + location_bias).clamp(-1.0, 1.0)
}

/// Ambient noise from the location baseline, crowd size, weather and time
/// of day. The crowd term saturates: past a handful of people the din stops
/// growing.
fn ambient_noise(
    weather: Weather,
    is_night: bool,
    location: Option<&Location>,
    occupants: usize,
) -> f32 {
    let base = location.map_or(0.3, |l| l.noise);
    #[allow(clippy::cast_precision_loss)]
    let crowd_shift = 0.07 * occupants.min(5) as f32;
    let weather_shift = match weather {
        Weather::Storm => 0.30,
        Weather::Rain => 0.15,
        Weather::Heatwave => 0.05,
        Weather::Snow | Weather::Fog => -0.05,
        Weather::Clear | Weather::Overcast => 0.0,
    };
    let night_shift = if is_night { -0.15 } else { 0.0 };
    (base + crowd_shift + weather_shift + night_shift).clamp(0.0, 1.0)
}

/// Visibility: full in daylight, moonlight-scaled at night, cut by weather.
fn visibility(weather: Weather, calendar: &CalendarState) -> f32 {
    let light = if calendar.is_night {
        0.15 + 0.55 * calendar.moon.light
    } else {
        1.0
    };
    let weather_factor = match weather {
        Weather::Fog => 0.35,
        Weather::Storm => 0.55,
        Weather::Snow => 0.65,
        Weather::Rain => 0.75,
        Weather::Overcast => 0.9,
        Weather::Clear | Weather::Heatwave => 1.0,
    };
    (light * weather_factor).clamp(0.0, 1.0)
}

/// Effective comfort: the location baseline worn down by temperature
/// extremes and foul weather.
fn comfort(temperature: f32, weather: Weather, location: Option<&Location>) -> f32 {
    let base = location.map_or(0.5, |l| l.comfort);
    let weather_discomfort = match weather {
        Weather::Storm => 0.20,
        Weather::Heatwave => 0.15,
        Weather::Rain | Weather::Snow => 0.10,
        Weather::Clear | Weather::Overcast | Weather::Fog => 0.0,
    };
    (base - 0.3 * temperature.abs() - weather_discomfort).clamp(0.0, 1.0)
}

/// Felt safety: comfort eroded by moonless darkness and storms.
fn safety(comfort: f32, calendar: &CalendarState, weather: Weather) -> f32 {
    let night_penalty = if calendar.is_night {
        0.25 * (1.0 - calendar.moon.light)
    } else {
        0.0
    };
    let storm_penalty = if weather == Weather::Storm { 0.10 } else { 0.0 };
    (comfort - night_penalty - storm_penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClockConfig;
    use crate::types::LocationId;

    fn clock_at(tick: u64) -> SimClock {
        SimClock::at_tick(tick, ClockConfig::default())
    }

    #[test]
    fn weather_is_deterministic_per_day() {
        let session = SessionId::new();
        let env = Environment::new(session, ClimateZone::Temperate);
        let a = env.weather_for_day(12, Season::Spring);
        let b = env.weather_for_day(12, Season::Spring);
        assert_eq!(a, b);
    }

    #[test]
    fn same_session_replays_same_weather() {
        let session = SessionId::new();
        let a = Environment::new(session, ClimateZone::Temperate);
        let b = Environment::new(session, ClimateZone::Temperate);
        for day in 1..=60 {
            assert_eq!(
                a.weather_for_day(day, Season::Summer),
                b.weather_for_day(day, Season::Summer)
            );
        }
    }

    #[test]
    fn tropical_never_snows() {
        let env = Environment::new(SessionId::new(), ClimateZone::Tropical);
        for day in 1..=360 {
            assert_ne!(env.weather_for_day(day, Season::Winter), Weather::Snow);
        }
    }

    #[test]
    fn polar_winter_is_colder_than_tropical_summer() {
        let session = SessionId::new();
        let polar = Environment::new(session, ClimateZone::Polar);
        // Midwinter midnight vs midsummer noon.
        let winter_tick = 355 * 24;
        let summer_tick = 172 * 24 + 12;
        let cold = polar.state_at(&clock_at(winter_tick), winter_tick, None, 0);
        let tropical = Environment::new(session, ClimateZone::Tropical);
        let hot = tropical.state_at(&clock_at(summer_tick), summer_tick, None, 0);
        assert!(cold.temperature < hot.temperature);
        assert!(cold.temperature < 0.0);
        assert!(hot.temperature > 0.0);
    }

    #[test]
    fn location_bias_shifts_temperature() {
        let env = Environment::new(SessionId::new(), ClimateZone::Temperate);
        let clock = clock_at(12);
        let mut forge = Location::new(LocationId::new(), "The Forge");
        forge.temperature_bias = 0.25;
        let baseline = env.state(&clock, None, 0).temperature;
        let inside = env.state(&clock, Some(&forge), 0).temperature;
        assert!((inside - baseline - 0.25).abs() < 1e-6);
    }

    #[test]
    fn temperature_stays_in_bounds() {
        let env = Environment::new(SessionId::new(), ClimateZone::Arid);
        for tick in (0..24 * 360).step_by(7) {
            let t = env.state_at(&clock_at(tick), tick, None, 0).temperature;
            assert!((-1.0..=1.0).contains(&t), "temperature {t} out of bounds");
        }
    }

    #[test]
    fn describe_mentions_weather_and_season() {
        let env = Environment::new(SessionId::new(), ClimateZone::Temperate);
        let clock = clock_at(100 * 24 + 12);
        let state = env.state(&clock, None, 0);
        let line = state.describe();
        assert!(line.contains(state.weather.name()));
        assert!(line.contains(state.calendar.season.name()));
    }

    #[test]
    fn storms_are_louder_than_clear_skies() {
        let clock = clock_at(12);
        let calendar = clock.calendar();
        let calm = ambient_noise(Weather::Clear, calendar.is_night, None, 0);
        let loud = ambient_noise(Weather::Storm, calendar.is_night, None, 0);
        assert!(loud > calm);

        let mut forge = Location::new(LocationId::new(), "The Forge");
        forge.noise = 0.9;
        assert!(ambient_noise(Weather::Clear, false, Some(&forge), 0) > calm);
    }

    #[test]
    fn crowds_raise_the_din_but_only_so_far() {
        let empty = ambient_noise(Weather::Clear, false, None, 0);
        let busy = ambient_noise(Weather::Clear, false, None, 4);
        assert!(busy > empty);
        // The crowd term saturates.
        let packed = ambient_noise(Weather::Clear, false, None, 5);
        let mobbed = ambient_noise(Weather::Clear, false, None, 50);
        assert!((mobbed - packed).abs() < f32::EPSILON);
    }

    #[test]
    fn moonlight_governs_night_visibility() {
        let mut calendar = clock_at(0).calendar();
        assert!(calendar.is_night);
        calendar.moon = crate::clock::moon_phase(15); // near full
        let bright = visibility(Weather::Clear, &calendar);
        calendar.moon = crate::clock::moon_phase(1); // near new
        let dark = visibility(Weather::Clear, &calendar);
        assert!(bright > dark);

        let day = clock_at(12).calendar();
        assert!(visibility(Weather::Clear, &day) > bright);
        assert!(visibility(Weather::Fog, &day) < visibility(Weather::Clear, &day));
    }

    #[test]
    fn moonless_night_erodes_safety() {
        let mut calendar = clock_at(0).calendar();
        calendar.moon = crate::clock::moon_phase(1); // near new
        let dark = safety(0.5, &calendar, Weather::Clear);
        let day = clock_at(12).calendar();
        let safe = safety(0.5, &day, Weather::Clear);
        assert!(dark < safe);
        assert!(safety(0.5, &day, Weather::Storm) < safe);
    }

    #[test]
    fn shelter_comfort_survives_foul_weather_better() {
        let mut hearth = Location::new(LocationId::new(), "The Hearth");
        hearth.comfort = 0.9;
        let sheltered = comfort(0.0, Weather::Storm, Some(&hearth));
        let exposed = comfort(0.0, Weather::Storm, None);
        assert!(sheltered > exposed);
        // Extremes of heat and cold both wear comfort down.
        assert!(comfort(0.9, Weather::Clear, None) < comfort(0.0, Weather::Clear, None));
    }

    #[test]
    fn landmark_surfaces_in_the_ambience_line() {
        let env = Environment::new(SessionId::new(), ClimateZone::Temperate);
        let clock = clock_at(12);
        let mut square = Location::new(LocationId::new(), "Market Square");
        square.landmarks.push("the broken fountain".to_string());
        let line = env.state(&clock, Some(&square), 0).describe();
        assert!(line.contains("the broken fountain"), "line: {line:?}");
    }
}
