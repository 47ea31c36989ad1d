use crate::season::SeasonKey;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Relative humidity assumed when the station did not report one.
pub const DEFAULT_HUMIDITY_PCT: f64 = 90.0;

/// One station-hour as delivered by the data source, after timestamp
/// normalization. Any field may be missing when its parameter feed had a gap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyReading {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    /// Precipitation accumulated during the hour ending at `timestamp`.
    pub precipitation_mm: Option<f64>,
    pub wind_ms: Option<f64>,
    pub humidity_pct: Option<f64>,
}

impl HourlyReading {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature_c: None,
            precipitation_mm: None,
            wind_ms: None,
            humidity_pct: None,
        }
    }

    /// Temperature and precipitation are both required before an hour can be
    /// classified; wind and humidity fall back to defaults.
    pub fn is_classifiable(&self) -> bool {
        self.temperature_c.is_some() && self.precipitation_mm.is_some()
    }
}

/// Outcome of classifying a single hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HourClass {
    Snow { amount_cm: f64, slr: f64 },
    Rain,
    /// No measurable precipitation, or not enough inputs to tell.
    Dry,
}

impl HourClass {
    pub fn is_rain(&self) -> bool {
        matches!(self, HourClass::Rain)
    }

    pub fn snow_amount_cm(&self) -> f64 {
        match self {
            HourClass::Snow { amount_cm, .. } => *amount_cm,
            _ => 0.0,
        }
    }
}

/// A reading together with its classification and the ski day it falls in.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedHour {
    pub reading: HourlyReading,
    pub ski_day: NaiveDate,
    /// `None` when the reading lacks temperature or precipitation.
    pub class: Option<HourClass>,
}

/// Daily snowfall: either a real measurement or a day spoiled by rain.
///
/// Rain is only turned into the `-1` sentinel at the table boundary, so
/// amount and SLR can never disagree about whether the day was rain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Snowfall {
    Measured { amount_cm: f64, slr: f64 },
    Rain,
}

impl Snowfall {
    pub fn is_rain(&self) -> bool {
        matches!(self, Snowfall::Rain)
    }

    /// Measured amount, `None` for rain days.
    pub fn amount_cm(&self) -> Option<f64> {
        match self {
            Snowfall::Measured { amount_cm, .. } => Some(*amount_cm),
            Snowfall::Rain => None,
        }
    }
}

/// One ski day of one season.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    /// Local calendar date on which the ski day starts (08:00 local).
    pub date: NaiveDate,
    pub snowfall: Snowfall,
    pub temp_max_c: Option<f64>,
    pub temp_min_c: Option<f64>,
    pub humidity_avg_pct: Option<f64>,
    /// Filled in by the season accumulator.
    pub accumulated_snowfall_cm: Option<f64>,
}

/// The ordered daily rows of one season.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonRecord {
    pub key: SeasonKey,
    pub days: Vec<DailySummary>,
    pub is_current: bool,
}

impl SeasonRecord {
    pub fn new(key: SeasonKey, days: Vec<DailySummary>, is_current: bool) -> Self {
        Self {
            key,
            days,
            is_current,
        }
    }

    /// Last accumulated value of the season, if any row carries one.
    pub fn final_total(&self) -> Option<f64> {
        self.days
            .iter()
            .rev()
            .find_map(|day| day.accumulated_snowfall_cm)
    }

    /// Day-of-season slot of the last populated row, for the in-progress season.
    pub fn today_index(&self) -> Option<usize> {
        if !self.is_current {
            return None;
        }
        self.days
            .iter()
            .rev()
            .find_map(|day| crate::aligner::day_of_season(day.date))
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
