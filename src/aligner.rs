use crate::models::{round_to, SeasonRecord};
use crate::season::SeasonKey;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Nov 1 through Apr 30 with a 28-day February.
pub const SEASON_SLOTS: usize = 182;

/// (month, length) in season order.
const SEASON_MONTHS: [(u32, u32); 6] = [(11, 30), (12, 31), (1, 31), (2, 28), (3, 31), (4, 30)];

/// Slot of `date` on the season axis: Nov 1 is 0, Apr 30 is 181.
///
/// Feb 29 shares the Feb 28 slot. Dates in May..October have no slot.
pub fn day_of_season(date: NaiveDate) -> Option<usize> {
    let mut offset = 0u32;
    for (month, length) in SEASON_MONTHS {
        if date.month() == month {
            return Some((offset + date.day().min(length) - 1) as usize);
        }
        offset += length;
    }
    None
}

/// How slots without an observation are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Closed season: carry the last known total through the end of the axis.
    Completed,
    /// Season in progress: carry forward only up to `today`; later slots stay unset.
    InProgress { today: usize },
}

/// Cumulative series of one season on the slot axis.
pub fn cumulative_series(record: &SeasonRecord, mode: FillMode) -> Vec<Option<f64>> {
    let mut observed = vec![None; SEASON_SLOTS];
    for day in &record.days {
        if let (Some(slot), Some(total)) = (day_of_season(day.date), day.accumulated_snowfall_cm) {
            observed[slot] = Some(total);
        }
    }
    forward_fill(&observed, mode)
}

/// Forward-fill `observed` according to `mode`.
pub fn forward_fill(observed: &[Option<f64>], mode: FillMode) -> Vec<Option<f64>> {
    let last_slot = match mode {
        FillMode::Completed => observed.len(),
        FillMode::InProgress { today } => (today + 1).min(observed.len()),
    };

    let mut carried = None;
    observed
        .iter()
        .enumerate()
        .map(|(slot, value)| {
            if slot >= last_slot {
                return None;
            }
            if value.is_some() {
                carried = *value;
            }
            carried
        })
        .collect()
}

/// Aligned series of one season.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonSeries {
    pub key: SeasonKey,
    pub is_current: bool,
    pub values: Vec<Option<f64>>,
}

impl SeasonSeries {
    pub fn from_record(record: &SeasonRecord) -> Self {
        let mode = match record.today_index() {
            Some(today) => FillMode::InProgress { today },
            None if record.is_current => FillMode::InProgress { today: 0 },
            None => FillMode::Completed,
        };
        Self {
            key: record.key,
            is_current: record.is_current,
            values: cumulative_series(record, mode),
        }
    }
}

/// Min/max/mean of one slot across completed seasons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotBand {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub seasons: usize,
}

/// Per-slot statistics over the given series; slots with no values are `None`.
pub fn slot_bands<'a, I>(series: I) -> Vec<Option<SlotBand>>
where
    I: IntoIterator<Item = &'a SeasonSeries>,
{
    let series: Vec<&SeasonSeries> = series.into_iter().collect();
    (0..SEASON_SLOTS)
        .map(|slot| {
            let values: Vec<f64> = series
                .iter()
                .filter_map(|s| s.values.get(slot).copied().flatten())
                .collect();
            if values.is_empty() {
                return None;
            }
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            Some(SlotBand {
                min,
                max,
                mean: round_to(mean, 2),
                seasons: values.len(),
            })
        })
        .collect()
}

/// Mean cumulative series of a multi-year bucket of seasons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSeries {
    pub first_year: i32,
    pub last_year: i32,
    pub seasons: Vec<SeasonKey>,
    pub mean: Vec<Option<f64>>,
}

impl PeriodSeries {
    /// e.g. `9500` for the five seasons 1995..=1999.
    pub fn label(&self) -> String {
        format!(
            "{:02}{:02}",
            self.first_year.rem_euclid(100),
            (self.last_year + 1).rem_euclid(100)
        )
    }
}

/// Group series into `span_years`-wide buckets aligned on multiples of the span.
pub fn period_groups<'a, I>(series: I, span_years: i32) -> Vec<PeriodSeries>
where
    I: IntoIterator<Item = &'a SeasonSeries>,
{
    let span = span_years.max(1);
    let mut buckets: BTreeMap<i32, Vec<&SeasonSeries>> = BTreeMap::new();
    for s in series {
        let first_year = s.key.start_year().div_euclid(span) * span;
        buckets.entry(first_year).or_default().push(s);
    }

    buckets
        .into_iter()
        .map(|(first_year, members)| {
            let mean = slot_bands(members.iter().copied())
                .into_iter()
                .map(|band| band.map(|band| band.mean))
                .collect();
            PeriodSeries {
                first_year,
                last_year: first_year + span - 1,
                seasons: members.iter().map(|s| s.key).collect(),
                mean,
            }
        })
        .collect()
}

/// Per-season comparison figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonStatistics {
    pub key: SeasonKey,
    pub final_total_cm: f64,
    pub snow_days: usize,
    pub rain_days: usize,
    pub biggest_day: Option<NaiveDate>,
    pub biggest_day_cm: f64,
}

impl SeasonStatistics {
    /// True if no other season in `all` ended with more snow.
    pub fn is_snowiest_in(&self, all: &[SeasonStatistics]) -> bool {
        all.iter()
            .all(|other| self.final_total_cm >= other.final_total_cm)
    }

    /// True if no other season in `all` ended with less snow.
    pub fn is_leanest_in(&self, all: &[SeasonStatistics]) -> bool {
        all.iter()
            .all(|other| self.final_total_cm <= other.final_total_cm)
    }
}

impl From<&SeasonRecord> for SeasonStatistics {
    fn from(record: &SeasonRecord) -> Self {
        let mut stats = SeasonStatistics {
            key: record.key,
            final_total_cm: record.final_total().unwrap_or(0.0),
            snow_days: 0,
            rain_days: 0,
            biggest_day: None,
            biggest_day_cm: 0.0,
        };
        for day in &record.days {
            match day.snowfall.amount_cm() {
                None => stats.rain_days += 1,
                Some(amount) if amount > 0.0 => {
                    stats.snow_days += 1;
                    if amount > stats.biggest_day_cm {
                        stats.biggest_day_cm = amount;
                        stats.biggest_day = Some(day.date);
                    }
                }
                Some(_) => {}
            }
        }
        stats
    }
}

/// Everything needed to overlay seasons on one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alignment {
    pub completed: Vec<SeasonSeries>,
    pub current: Option<SeasonSeries>,
    pub bands: Vec<Option<SlotBand>>,
    pub periods: Vec<PeriodSeries>,
    pub statistics: Vec<SeasonStatistics>,
}

/// Aligns seasons while keeping excluded seasons out of every computation.
#[derive(Debug, Clone, Default)]
pub struct SeasonAligner {
    excluded: HashSet<SeasonKey>,
    period_years: i32,
}

impl SeasonAligner {
    pub fn new(excluded: impl IntoIterator<Item = SeasonKey>, period_years: i32) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
            period_years: period_years.max(1),
        }
    }

    pub fn is_excluded(&self, key: SeasonKey) -> bool {
        self.excluded.contains(&key)
    }

    pub fn align(&self, records: &[SeasonRecord]) -> Alignment {
        let mut completed = Vec::new();
        let mut current = None;
        let mut statistics = Vec::new();

        let mut records: Vec<&SeasonRecord> = records
            .iter()
            .filter(|record| !self.is_excluded(record.key))
            .collect();
        records.sort_by_key(|record| record.key);

        for record in records {
            let series = SeasonSeries::from_record(record);
            if record.is_current {
                current = Some(series);
            } else {
                statistics.push(SeasonStatistics::from(record));
                completed.push(series);
            }
        }

        Alignment {
            bands: slot_bands(&completed),
            periods: period_groups(&completed, self.period_years),
            completed,
            current,
            statistics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailySummary, Snowfall};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn day(date: NaiveDate, amount_cm: f64, accumulated: f64) -> DailySummary {
        DailySummary {
            date,
            snowfall: Snowfall::Measured {
                amount_cm,
                slr: 10.0,
            },
            temp_max_c: None,
            temp_min_c: None,
            humidity_avg_pct: Some(90.0),
            accumulated_snowfall_cm: Some(accumulated),
        }
    }

    fn season(start_year: i32, totals: &[(u32, u32, f64)], is_current: bool) -> SeasonRecord {
        let mut running = 0.0;
        let days = totals
            .iter()
            .map(|&(m, d, amount)| {
                let year = if m >= 11 { start_year } else { start_year + 1 };
                running += amount;
                day(date(year, m, d), amount, running)
            })
            .collect();
        SeasonRecord::new(SeasonKey(start_year), days, is_current)
    }

    #[test]
    fn test_day_of_season_bounds() {
        assert_eq!(day_of_season(date(2024, 11, 1)), Some(0));
        assert_eq!(day_of_season(date(2024, 12, 1)), Some(30));
        assert_eq!(day_of_season(date(2025, 1, 1)), Some(61));
        assert_eq!(day_of_season(date(2025, 4, 30)), Some(181));
        assert_eq!(day_of_season(date(2024, 5, 15)), None);
        assert_eq!(day_of_season(date(2024, 10, 31)), None);
    }

    #[test]
    fn test_leap_day_shares_feb_28_slot() {
        assert_eq!(day_of_season(date(2024, 2, 29)), day_of_season(date(2024, 2, 28)));
        assert_eq!(day_of_season(date(2024, 3, 1)), Some(120));
    }

    #[test]
    fn test_completed_season_forward_fills() {
        let record = season(2020, &[(11, 1, 2.0), (11, 3, 1.0)], false);
        let series = SeasonSeries::from_record(&record);
        assert_eq!(series.values[0], Some(2.0));
        // Missing Nov 2 repeats the last known total
        assert_eq!(series.values[1], Some(2.0));
        assert_eq!(series.values[2], Some(3.0));
        assert_eq!(series.values[181], Some(3.0));
    }

    #[test]
    fn test_slots_before_first_observation_stay_unset() {
        let record = season(2020, &[(11, 5, 2.0)], false);
        let series = SeasonSeries::from_record(&record);
        assert_eq!(series.values[3], None);
        assert_eq!(series.values[4], Some(2.0));
    }

    #[test]
    fn test_current_season_stops_at_today() {
        let record = season(2024, &[(11, 1, 2.0), (11, 10, 1.0)], true);
        assert_eq!(record.today_index(), Some(9));
        let series = SeasonSeries::from_record(&record);
        assert_eq!(series.values[5], Some(2.0));
        assert_eq!(series.values[9], Some(3.0));
        assert!(series.values[10..].iter().all(Option::is_none));
    }

    #[test]
    fn test_forward_fill_modes_share_boundary() {
        let observed = vec![Some(1.0), None, None, None];
        assert_eq!(
            forward_fill(&observed, FillMode::Completed),
            vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0)]
        );
        assert_eq!(
            forward_fill(&observed, FillMode::InProgress { today: 1 }),
            vec![Some(1.0), Some(1.0), None, None]
        );
    }

    #[test]
    fn test_bands_exclude_current_and_excluded_seasons() {
        let records = vec![
            season(2020, &[(11, 1, 10.0)], false),
            season(2021, &[(11, 1, 20.0)], false),
            season(2022, &[(11, 1, 900.0)], false),
            season(2024, &[(11, 1, 1.0)], true),
        ];
        let aligner = SeasonAligner::new([SeasonKey(2022)], 5);
        let alignment = aligner.align(&records);

        let band = alignment.bands[0].unwrap();
        assert_eq!(band.min, 10.0);
        assert_eq!(band.max, 20.0);
        assert_eq!(band.mean, 15.0);
        assert_eq!(band.seasons, 2);

        assert_eq!(alignment.completed.len(), 2);
        assert_eq!(alignment.current.as_ref().map(|s| s.key), Some(SeasonKey(2024)));
        assert!(alignment
            .periods
            .iter()
            .all(|p| !p.seasons.contains(&SeasonKey(2022))));
        assert!(alignment
            .statistics
            .iter()
            .all(|s| s.key != SeasonKey(2022)));
    }

    #[test]
    fn test_period_groups_bucket_by_span() {
        let records = vec![
            season(1995, &[(11, 1, 10.0)], false),
            season(1999, &[(11, 1, 30.0)], false),
            season(2000, &[(11, 1, 5.0)], false),
        ];
        let alignment = SeasonAligner::new([], 5).align(&records);
        assert_eq!(alignment.periods.len(), 2);
        assert_eq!(alignment.periods[0].first_year, 1995);
        assert_eq!(alignment.periods[0].label(), "9500");
        assert_eq!(alignment.periods[0].mean[0], Some(20.0));
        assert_eq!(alignment.periods[1].seasons, vec![SeasonKey(2000)]);
    }

    #[test]
    fn test_season_statistics() {
        let mut record = season(2020, &[(11, 1, 2.0), (12, 5, 7.5), (1, 3, 0.0)], false);
        record.days.push(DailySummary {
            snowfall: Snowfall::Rain,
            ..day(date(2021, 1, 4), 0.0, 9.5)
        });
        let stats = SeasonStatistics::from(&record);
        assert_eq!(stats.final_total_cm, 9.5);
        assert_eq!(stats.snow_days, 2);
        assert_eq!(stats.rain_days, 1);
        assert_eq!(stats.biggest_day, Some(date(2020, 12, 5)));

        let leaner = SeasonStatistics::from(&season(2021, &[(11, 1, 1.0)], false));
        let all = vec![stats.clone(), leaner.clone()];
        assert!(stats.is_snowiest_in(&all));
        assert!(leaner.is_leanest_in(&all));
        assert!(!leaner.is_snowiest_in(&all));
    }
}
