use crate::aggregator::{classify_hours, dedupe, summarize_day};
use crate::clock::LocalDayClock;
use crate::models::{DailySummary, HourClass, HourlyReading};
use chrono::{DateTime, Duration, DurationRound, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Result of estimating the in-progress ski day.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialDay {
    /// No usable reading in the window; distinct from a day with zero snow.
    NoData,
    InProgress {
        ski_day: NaiveDate,
        latest: DateTime<Utc>,
        hours_observed: usize,
        summary: DailySummary,
    },
}

impl PartialDay {
    pub fn summary(&self) -> Option<&DailySummary> {
        match self {
            PartialDay::NoData => None,
            PartialDay::InProgress { summary, .. } => Some(summary),
        }
    }
}

/// Latest timestamp among readings that at least carry a temperature.
pub fn latest_observation(readings: &[HourlyReading]) -> Option<DateTime<Utc>> {
    readings
        .iter()
        .filter(|reading| reading.temperature_c.is_some())
        .map(|reading| reading.timestamp)
        .max()
}

/// The ski day the feed is currently in, derived from its freshest reading.
pub fn current_ski_day(readings: &[HourlyReading], clock: &LocalDayClock) -> Option<NaiveDate> {
    latest_observation(readings).map(|latest| clock.ski_day(latest))
}

/// Summarize every reading of the window that belongs to the current ski day.
///
/// "Now" is the latest reading that carries a temperature, never the wall
/// clock, so a lagging feed does not attribute snow to a day it has not
/// observed yet.
pub fn estimate(readings: &[HourlyReading], clock: &LocalDayClock) -> PartialDay {
    let Some(latest) = latest_observation(readings) else {
        return PartialDay::NoData;
    };
    let ski_day = clock.ski_day(latest);

    let hours = classify_hours(&dedupe(readings), clock);
    let in_day: Vec<_> = hours.iter().filter(|hour| hour.ski_day == ski_day).collect();

    if in_day.is_empty() {
        return PartialDay::NoData;
    }

    PartialDay::InProgress {
        ski_day,
        latest,
        hours_observed: in_day.len(),
        summary: summarize_day(ski_day, &in_day),
    }
}

/// One slot of the recent-hours display series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourSlot {
    pub timestamp: DateTime<Utc>,
    pub local_hour: u32,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: f64,
    pub wind_ms: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub class: HourClass,
}

impl HourSlot {
    fn placeholder(timestamp: DateTime<Utc>, clock: &LocalDayClock) -> Self {
        Self {
            timestamp,
            local_hour: clock.local_hour(timestamp),
            temperature_c: None,
            precipitation_mm: 0.0,
            wind_ms: None,
            humidity_pct: None,
            class: HourClass::Dry,
        }
    }
}

/// Gap-free series of `slots` hours ending at the latest reading, truncated
/// to the hour. Hours without a reading become placeholders.
pub fn hourly_series(readings: &[HourlyReading], clock: &LocalDayClock, slots: usize) -> Vec<HourSlot> {
    let Some(latest) = latest_observation(readings) else {
        return Vec::new();
    };
    let end = latest.duration_trunc(Duration::hours(1)).unwrap_or(latest);

    let by_hour: HashMap<DateTime<Utc>, _> = classify_hours(&dedupe(readings), clock)
        .into_iter()
        .map(|hour| (hour.reading.timestamp, hour))
        .collect();

    (0..slots)
        .rev()
        .map(|back| {
            let timestamp = end - Duration::hours(back as i64);
            match by_hour.get(&timestamp) {
                Some(hour) => HourSlot {
                    timestamp,
                    local_hour: clock.local_hour(timestamp),
                    temperature_c: hour.reading.temperature_c,
                    precipitation_mm: hour.reading.precipitation_mm.unwrap_or(0.0),
                    wind_ms: hour.reading.wind_ms,
                    humidity_pct: hour.reading.humidity_pct,
                    class: hour.class.unwrap_or(HourClass::Dry),
                },
                None => HourSlot::placeholder(timestamp, clock),
            }
        })
        .collect()
}

/// Put the in-progress row into a season's daily rows, replacing any row with
/// the same date and keeping dates ascending.
pub fn splice_partial(days: &mut Vec<DailySummary>, partial: DailySummary) {
    match days.binary_search_by_key(&partial.date, |day| day.date) {
        Ok(index) => days[index] = partial,
        Err(index) => days.insert(index, partial),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Snowfall;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn reading(timestamp: DateTime<Utc>, temp: Option<f64>, precip: f64) -> HourlyReading {
        HourlyReading {
            timestamp,
            temperature_c: temp,
            precipitation_mm: Some(precip),
            wind_ms: None,
            humidity_pct: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_window_is_no_data() {
        let clock = LocalDayClock::central_european();
        assert_eq!(estimate(&[], &clock), PartialDay::NoData);
        // Readings without temperature do not establish "now"
        let no_temp = vec![reading(at(2025, 1, 10, 12), None, 1.0)];
        assert_eq!(estimate(&no_temp, &clock), PartialDay::NoData);
    }

    #[test]
    fn test_current_day_follows_latest_reading() {
        let clock = LocalDayClock::central_european();
        // Latest is 07:00 local Jan 11: still the ski day of Jan 10
        let readings = vec![
            reading(at(2025, 1, 10, 10), Some(-6.0), 1.0),
            reading(at(2025, 1, 11, 6), Some(-5.0), 2.0),
        ];
        assert_eq!(current_ski_day(&readings, &clock), Some(date(2025, 1, 10)));

        match estimate(&readings, &clock) {
            PartialDay::InProgress {
                ski_day,
                hours_observed,
                summary,
                ..
            } => {
                assert_eq!(ski_day, date(2025, 1, 10));
                assert_eq!(hours_observed, 2);
                assert!(summary.snowfall.amount_cm().unwrap() > 0.0);
            }
            PartialDay::NoData => panic!("Expected an in-progress day"),
        }
    }

    #[test]
    fn test_off_hour_latest_reading_uses_clock_boundary() {
        let clock = LocalDayClock::central_european();
        // Latest reading at 08:30 local Jan 15 already belongs to the Jan 15 ski day
        let readings = vec![
            reading(at(2025, 1, 15, 6), Some(-5.0), 1.0),
            reading(
                Utc.with_ymd_and_hms(2025, 1, 15, 7, 30, 0).unwrap(),
                Some(-5.0),
                1.0,
            ),
        ];
        match estimate(&readings, &clock) {
            PartialDay::InProgress {
                ski_day,
                hours_observed,
                ..
            } => {
                assert_eq!(ski_day, date(2025, 1, 15));
                assert_eq!(hours_observed, 1);
            }
            PartialDay::NoData => panic!("Expected an in-progress day"),
        }
    }

    #[test]
    fn test_stale_feed_keeps_its_own_day() {
        let clock = LocalDayClock::central_european();
        // Feed stops at 13:00 local Jan 10 even if the caller's clock is later
        let readings = vec![
            reading(at(2025, 1, 9, 20), Some(-5.0), 1.0),
            reading(at(2025, 1, 10, 12), Some(-5.0), 1.0),
        ];
        assert_eq!(current_ski_day(&readings, &clock), Some(date(2025, 1, 10)));
        let summary = estimate(&readings, &clock).summary().cloned().unwrap();
        assert_eq!(summary.date, date(2025, 1, 10));
        // Only the Jan 10 reading counts
        assert_eq!(summary.snowfall.amount_cm(), Some(1.46));
    }

    #[test]
    fn test_rain_hour_marks_partial_day() {
        let clock = LocalDayClock::central_european();
        let readings = vec![
            reading(at(2025, 3, 2, 9), Some(-3.0), 2.0),
            reading(at(2025, 3, 2, 10), Some(4.0), 1.0),
        ];
        let summary = estimate(&readings, &clock).summary().cloned().unwrap();
        assert_eq!(summary.snowfall, Snowfall::Rain);
    }

    #[test]
    fn test_no_snow_yet_is_zero_not_no_data() {
        let clock = LocalDayClock::central_european();
        let readings = vec![reading(at(2025, 2, 1, 9), Some(-3.0), 0.0)];
        let summary = estimate(&readings, &clock).summary().cloned().unwrap();
        assert_eq!(
            summary.snowfall,
            Snowfall::Measured {
                amount_cm: 0.0,
                slr: 0.0
            }
        );
    }

    #[test]
    fn test_hourly_series_fills_gaps() {
        let clock = LocalDayClock::central_european();
        let readings = vec![
            reading(at(2025, 1, 10, 20), Some(-4.0), 0.5),
            reading(at(2025, 1, 10, 23), Some(-5.0), 0.0),
        ];
        let series = hourly_series(&readings, &clock, 24);
        assert_eq!(series.len(), 24);
        assert_eq!(series[23].timestamp, at(2025, 1, 10, 23));
        assert_eq!(series[0].timestamp, at(2025, 1, 10, 0));
        assert_eq!(series[23].temperature_c, Some(-5.0));
        assert_eq!(series[20].temperature_c, Some(-4.0));
        assert!(matches!(series[20].class, HourClass::Snow { .. }));

        let placeholder = &series[21];
        assert_eq!(placeholder.temperature_c, None);
        assert_eq!(placeholder.precipitation_mm, 0.0);
        assert_eq!(placeholder.class, HourClass::Dry);
        assert_eq!(placeholder.local_hour, 22);
    }

    #[test]
    fn test_hourly_series_truncates_to_hour() {
        let clock = LocalDayClock::central_european();
        let latest = Utc.with_ymd_and_hms(2025, 1, 10, 23, 20, 0).unwrap();
        let readings = vec![reading(latest, Some(-5.0), 0.0)];
        let series = hourly_series(&readings, &clock, 3);
        assert_eq!(series.last().unwrap().timestamp, at(2025, 1, 10, 23));
    }

    #[test]
    fn test_splice_replaces_or_inserts() {
        let clock = LocalDayClock::central_european();
        let mut days = vec![
            estimate(&[reading(at(2025, 1, 8, 12), Some(-2.0), 1.0)], &clock)
                .summary()
                .cloned()
                .unwrap(),
            estimate(&[reading(at(2025, 1, 10, 12), Some(-2.0), 1.0)], &clock)
                .summary()
                .cloned()
                .unwrap(),
        ];

        let partial = estimate(&[reading(at(2025, 1, 9, 12), Some(-9.0), 1.0)], &clock)
            .summary()
            .cloned()
            .unwrap();
        splice_partial(&mut days, partial);
        assert_eq!(
            days.iter().map(|day| day.date).collect::<Vec<_>>(),
            vec![date(2025, 1, 8), date(2025, 1, 9), date(2025, 1, 10)]
        );

        let replacement = estimate(&[reading(at(2025, 1, 10, 13), Some(5.0), 1.0)], &clock)
            .summary()
            .cloned()
            .unwrap();
        splice_partial(&mut days, replacement);
        assert_eq!(days.len(), 3);
        assert_eq!(days[2].snowfall, Snowfall::Rain);
    }
}
