use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::limits::DEFAULT_MAX_QUERY_DAYS;
use crate::model::MealDefinition;
use crate::schedule::{parse_hhmm, parse_weekday};

pub const KEY_SERVICE_HOURS: &str = "service_hours";
pub const KEY_SLOT_INTERVAL: &str = "slot_interval";
pub const KEY_TURNOVER: &str = "turnover";
pub const KEY_BUFFER_BEFORE: &str = "buffer_before";
pub const KEY_MAX_PARALLEL_PARTIES: &str = "max_parallel_parties";
pub const KEY_ROOM_MERGE_STRATEGY: &str = "room_merge_strategy";
pub const KEY_DEFAULT_ROOM_CAPACITY: &str = "default_room_capacity";
pub const KEY_LOW_AVAILABILITY_THRESHOLD: &str = "low_availability_threshold";
pub const KEY_MEALS: &str = "meals";
pub const KEY_MAX_QUERY_DAYS: &str = "max_query_days";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("invalid meal definitions: {0}")]
    InvalidMeals(String),
}

/// Read-only key/value settings group.
pub trait Settings {
    fn get(&self, key: &str) -> Option<String>;
}

impl Settings for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Layered lookup: the first source wins.
impl<A: Settings, B: Settings> Settings for (A, B) {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).or_else(|| self.1.get(key))
    }
}

/// Settings from environment variables: `service_hours` → `SEATPLAN_SERVICE_HOURS`.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    prefix: String,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self::new("SEATPLAN_")
    }
}

impl EnvSettings {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Settings for EnvSettings {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, key.to_ascii_uppercase())).ok()
    }
}

/// How room capacities pool into one ceiling when no room is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Plain sum of active room capacities.
    Sum,
    /// Sum, but a slot stops taking parties once `max_parallel_parties` overlap it.
    #[default]
    Smart,
}

impl MergeStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "smart" => Some(Self::Smart),
            _ => None,
        }
    }
}

/// Remaining-seat level below which a slot reports `limited`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LowAvailability {
    /// Fraction of the ceiling, `0.0..=1.0`.
    Fraction(f64),
    /// Absolute seat count.
    Seats(u32),
}

impl Default for LowAvailability {
    fn default() -> Self {
        LowAvailability::Fraction(0.25)
    }
}

impl LowAvailability {
    /// `25%` or a seat count like `4`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let pct: f64 = pct.trim().parse().ok()?;
            return (0.0..=100.0)
                .contains(&pct)
                .then_some(LowAvailability::Fraction(pct / 100.0));
        }
        s.parse().ok().map(LowAvailability::Seats)
    }

    pub fn is_low(&self, remaining: u32, ceiling: u32) -> bool {
        match *self {
            LowAvailability::Fraction(f) => f64::from(remaining) < f64::from(ceiling) * f,
            LowAvailability::Seats(n) => remaining < n,
        }
    }
}

/// Knobs for one availability engine, passed by value at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityConfig {
    /// Weekly service-hours definition, see [`crate::schedule::parse_schedule`].
    pub service_hours: String,
    pub slot_interval: u32,
    pub turnover: u32,
    pub buffer_before: u32,
    /// 0 = unlimited.
    pub max_parallel_parties: u32,
    pub merge_strategy: MergeStrategy,
    /// Used for rooms configured with capacity 0.
    pub default_room_capacity: u32,
    pub low_availability: LowAvailability,
    pub meals: Vec<MealDefinition>,
    pub max_query_days: u32,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            service_hours: String::new(),
            slot_interval: 15,
            turnover: 120,
            buffer_before: 0,
            max_parallel_parties: 0,
            merge_strategy: MergeStrategy::Smart,
            default_room_capacity: 0,
            low_availability: LowAvailability::default(),
            meals: Vec::new(),
            max_query_days: DEFAULT_MAX_QUERY_DAYS,
        }
    }
}

#[derive(Deserialize)]
struct RawMeal {
    key: String,
    label: Option<String>,
    #[serde(default)]
    weekdays: Vec<String>,
    start: String,
    end: String,
}

impl AvailabilityConfig {
    pub fn from_settings(settings: &impl Settings) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let slot_interval = read_u32(settings, KEY_SLOT_INTERVAL, defaults.slot_interval)?;
        if slot_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: KEY_SLOT_INTERVAL,
                reason: "must be positive".into(),
            });
        }

        let merge_strategy = match settings.get(KEY_ROOM_MERGE_STRATEGY) {
            Some(s) => MergeStrategy::parse(&s).ok_or_else(|| ConfigError::InvalidValue {
                key: KEY_ROOM_MERGE_STRATEGY,
                reason: format!("unknown strategy {s:?}"),
            })?,
            None => defaults.merge_strategy,
        };

        let low_availability = match settings.get(KEY_LOW_AVAILABILITY_THRESHOLD) {
            Some(s) => LowAvailability::parse(&s).ok_or_else(|| ConfigError::InvalidValue {
                key: KEY_LOW_AVAILABILITY_THRESHOLD,
                reason: format!("expected a percentage or seat count, got {s:?}"),
            })?,
            None => defaults.low_availability,
        };

        let meals = match settings.get(KEY_MEALS) {
            Some(json) if !json.trim().is_empty() => parse_meals(&json)?,
            _ => Vec::new(),
        };

        Ok(Self {
            service_hours: settings.get(KEY_SERVICE_HOURS).unwrap_or_default(),
            slot_interval,
            turnover: read_u32(settings, KEY_TURNOVER, defaults.turnover)?,
            buffer_before: read_u32(settings, KEY_BUFFER_BEFORE, defaults.buffer_before)?,
            max_parallel_parties: read_u32(
                settings,
                KEY_MAX_PARALLEL_PARTIES,
                defaults.max_parallel_parties,
            )?,
            merge_strategy,
            default_room_capacity: read_u32(
                settings,
                KEY_DEFAULT_ROOM_CAPACITY,
                defaults.default_room_capacity,
            )?,
            low_availability,
            meals,
            max_query_days: read_u32(settings, KEY_MAX_QUERY_DAYS, defaults.max_query_days)?,
        })
    }

    pub fn meal(&self, key: &str) -> Option<&MealDefinition> {
        self.meals.iter().find(|m| m.key == key)
    }
}

fn read_u32(settings: &impl Settings, key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match settings.get(key) {
        Some(s) if !s.trim().is_empty() => {
            s.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key,
                reason: format!("expected a non-negative integer, got {s:?}"),
            })
        }
        _ => Ok(default),
    }
}

/// JSON array of `{key, label, weekdays, start, end}`.
pub fn parse_meals(json: &str) -> Result<Vec<MealDefinition>, ConfigError> {
    let raw: Vec<RawMeal> =
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidMeals(e.to_string()))?;

    let mut meals = Vec::with_capacity(raw.len());
    for m in raw {
        let weekdays = m
            .weekdays
            .iter()
            .map(|d| {
                parse_weekday(d)
                    .ok_or_else(|| ConfigError::InvalidMeals(format!("{}: bad weekday {d:?}", m.key)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let start = parse_hhmm(&m.start)
            .ok_or_else(|| ConfigError::InvalidMeals(format!("{}: bad start {:?}", m.key, m.start)))?;
        let end = parse_hhmm(&m.end)
            .ok_or_else(|| ConfigError::InvalidMeals(format!("{}: bad end {:?}", m.key, m.end)))?;
        if end <= start {
            return Err(ConfigError::InvalidMeals(format!("{}: end before start", m.key)));
        }
        if meals.iter().any(|existing: &MealDefinition| existing.key == m.key) {
            return Err(ConfigError::InvalidMeals(format!("duplicate meal {:?}", m.key)));
        }
        meals.push(MealDefinition {
            label: m.label.unwrap_or_else(|| m.key.clone()),
            key: m.key,
            weekdays,
            start,
            end,
        });
    }
    Ok(meals)
}
