use crate::classifier::classify_reading;
use crate::clock::LocalDayClock;
use crate::models::{
    round_to, ClassifiedHour, DailySummary, HourClass, HourlyReading, Snowfall,
    DEFAULT_HUMIDITY_PCT,
};
use crate::season::SeasonKey;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Daily rows of every season found in a batch, dates ascending.
pub type SeasonTables = BTreeMap<SeasonKey, Vec<DailySummary>>;

/// Drop duplicate timestamps; for each timestamp the reading that comes last
/// in the input wins. Output is sorted by timestamp.
pub fn dedupe(readings: &[HourlyReading]) -> Vec<HourlyReading> {
    let mut by_timestamp: BTreeMap<DateTime<Utc>, &HourlyReading> = BTreeMap::new();
    for reading in readings {
        by_timestamp.insert(reading.timestamp, reading);
    }
    by_timestamp.into_values().cloned().collect()
}

/// Classify every reading and attach its ski day.
pub fn classify_hours(readings: &[HourlyReading], clock: &LocalDayClock) -> Vec<ClassifiedHour> {
    readings
        .iter()
        .map(|reading| ClassifiedHour {
            reading: reading.clone(),
            ski_day: clock.ski_day(reading.timestamp),
            class: classify_reading(reading),
        })
        .collect()
}

/// Reduce the classified hours of one ski day.
///
/// A single rain hour spoils the whole day. Otherwise snow amounts are summed
/// and the SLR is the amount-weighted mean over snow hours (0 with no snow).
pub fn reduce_snowfall<'a, I>(classes: I) -> Snowfall
where
    I: IntoIterator<Item = &'a HourClass>,
{
    let mut total_cm = 0.0;
    let mut weighted_slr = 0.0;

    for class in classes {
        match class {
            HourClass::Rain => return Snowfall::Rain,
            HourClass::Snow { amount_cm, slr } if *amount_cm > 0.0 => {
                total_cm += amount_cm;
                weighted_slr += amount_cm * slr;
            }
            _ => {}
        }
    }

    let slr = if total_cm > 0.0 {
        weighted_slr / total_cm
    } else {
        0.0
    };

    Snowfall::Measured {
        amount_cm: round_to(total_cm, 2),
        slr: round_to(slr, 2),
    }
}

/// Readings collected for one ski day.
#[derive(Debug, Default)]
struct DayGroup {
    temperatures: Vec<f64>,
    humidities: Vec<f64>,
    classes: Vec<HourClass>,
}

impl DayGroup {
    fn push(&mut self, hour: &ClassifiedHour) {
        if let Some(temperature) = hour.reading.temperature_c {
            self.temperatures.push(temperature);
        }
        if let Some(humidity) = hour.reading.humidity_pct {
            self.humidities.push(humidity.clamp(0.0, 100.0));
        }
        if let Some(class) = hour.class {
            self.classes.push(class);
        }
    }

    fn into_summary(self, date: NaiveDate) -> DailySummary {
        let temp_max_c = self.temperatures.iter().copied().reduce(f64::max);
        let temp_min_c = self.temperatures.iter().copied().reduce(f64::min);
        let humidity_avg_pct = if self.humidities.is_empty() {
            DEFAULT_HUMIDITY_PCT
        } else {
            self.humidities.iter().sum::<f64>() / self.humidities.len() as f64
        };

        DailySummary {
            date,
            snowfall: reduce_snowfall(&self.classes),
            temp_max_c,
            temp_min_c,
            humidity_avg_pct: Some(round_to(humidity_avg_pct, 1)),
            accumulated_snowfall_cm: None,
        }
    }
}

/// Summarize one ski day from its classified hours.
pub fn summarize_day(date: NaiveDate, hours: &[&ClassifiedHour]) -> DailySummary {
    let mut group = DayGroup::default();
    for hour in hours {
        group.push(hour);
    }
    group.into_summary(date)
}

/// Group readings by (season, ski day) and reduce each group to a summary.
///
/// Ski days outside Nov 1..Apr 30 are dropped. `range`, when given, keeps only
/// ski days inside the inclusive date range. Ski days with no readings get no
/// row at all.
pub fn aggregate(
    readings: &[HourlyReading],
    clock: &LocalDayClock,
    range: Option<(NaiveDate, NaiveDate)>,
) -> SeasonTables {
    let hours = classify_hours(&dedupe(readings), clock);

    let mut groups: BTreeMap<(SeasonKey, NaiveDate), DayGroup> = BTreeMap::new();
    let mut out_of_season = 0usize;

    for hour in &hours {
        if let Some((from, to)) = range {
            if hour.ski_day < from || hour.ski_day > to {
                continue;
            }
        }
        let Some(season) = SeasonKey::for_date(hour.ski_day) else {
            out_of_season += 1;
            continue;
        };
        groups.entry((season, hour.ski_day)).or_default().push(hour);
    }

    if out_of_season > 0 {
        debug!("Dropped {} readings outside the Nov..Apr window", out_of_season);
    }

    let mut tables = SeasonTables::new();
    for ((season, date), group) in groups {
        tables
            .entry(season)
            .or_default()
            .push(group.into_summary(date));
    }
    tables
}
