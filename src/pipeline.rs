use crate::accumulator::accumulate;
use crate::aggregator::{aggregate, dedupe, SeasonTables};
use crate::aligner::{Alignment, SeasonAligner};
use crate::clock::LocalDayClock;
use crate::config::SeasonConfig;
use crate::error::{AppError, Result};
use crate::models::{DailySummary, HourlyReading, SeasonRecord};
use crate::partial::{estimate, splice_partial, PartialDay};
use crate::season::{SeasonKey, SeasonStart};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Result of merging new hours into a stored raw set.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    /// Stored and new readings, deduplicated with the new ones winning.
    pub readings: Vec<HourlyReading>,
    /// Recomputed tables of every season the new readings touch.
    pub tables: SeasonTables,
}

/// Request-level operations over already-fetched readings.
///
/// Every operation is a pure recompute: the same readings always give the
/// same tables.
#[derive(Debug, Clone)]
pub struct Pipeline {
    clock: LocalDayClock,
    start: SeasonStart,
    cutoff: Option<NaiveDate>,
    excluded: HashSet<SeasonKey>,
    period_years: i32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(SeasonStart::default(), [], 5)
    }
}

impl Pipeline {
    pub fn new(
        start: SeasonStart,
        excluded: impl IntoIterator<Item = SeasonKey>,
        period_years: i32,
    ) -> Self {
        Self {
            clock: LocalDayClock::central_european(),
            start,
            cutoff: None,
            excluded: excluded.into_iter().collect(),
            period_years,
        }
    }

    pub fn from_config(season: &SeasonConfig) -> Result<Self> {
        Ok(Self::new(
            season.start(),
            season.excluded_keys()?,
            season.period_years,
        ))
    }

    /// Drop rows dated before `cutoff` before accumulating.
    pub fn with_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn clock(&self) -> &LocalDayClock {
        &self.clock
    }

    pub fn is_excluded(&self, key: SeasonKey) -> bool {
        self.excluded.contains(&key)
    }

    fn accumulate(&self, days: Vec<DailySummary>) -> Vec<DailySummary> {
        accumulate(days, self.start, self.cutoff)
    }

    /// Aggregate and accumulate every non-excluded season found in `readings`.
    pub fn recompute_all(&self, readings: &[HourlyReading]) -> Result<SeasonTables> {
        let tables: SeasonTables = aggregate(readings, &self.clock, None)
            .into_iter()
            .filter(|(key, _)| !self.is_excluded(*key))
            .map(|(key, days)| (key, self.accumulate(days)))
            .filter(|(_, days)| !days.is_empty())
            .collect();

        if tables.is_empty() {
            return Err(AppError::NoData(format!(
                "No in-season ski days among {} readings",
                readings.len()
            )));
        }

        info!(
            "Recomputed {} seasons from {} readings",
            tables.len(),
            readings.len()
        );
        Ok(tables)
    }

    /// Recompute one season from scratch.
    pub fn recompute_season(&self, readings: &[HourlyReading], key: SeasonKey) -> Result<Vec<DailySummary>> {
        if self.is_excluded(key) {
            return Err(AppError::NoData(format!("Season {} is excluded", key)));
        }

        let range = Some((key.first_day(), key.last_day()));
        let days = aggregate(readings, &self.clock, range)
            .remove(&key)
            .map(|days| self.accumulate(days))
            .unwrap_or_default();

        if days.is_empty() {
            return Err(AppError::NoData(format!("No readings for season {}", key)));
        }
        Ok(days)
    }

    /// Seasons whose ski days contain at least one of `readings`.
    pub fn touched_seasons(&self, readings: &[HourlyReading]) -> BTreeSet<SeasonKey> {
        readings
            .iter()
            .filter_map(|reading| SeasonKey::for_date(self.clock.ski_day(reading.timestamp)))
            .filter(|key| !self.is_excluded(*key))
            .collect()
    }

    /// Split readings by the season of their ski day; out-of-season hours are dropped.
    pub fn partition_by_season(&self, readings: &[HourlyReading]) -> BTreeMap<SeasonKey, Vec<HourlyReading>> {
        let mut partitions: BTreeMap<SeasonKey, Vec<HourlyReading>> = BTreeMap::new();
        for reading in dedupe(readings) {
            if let Some(key) = SeasonKey::for_date(self.clock.ski_day(reading.timestamp)) {
                partitions.entry(key).or_default().push(reading);
            }
        }
        partitions
    }

    /// Merge `new` into `stored` and recompute only the seasons `new` touches.
    pub fn append_hours(&self, stored: &[HourlyReading], new: &[HourlyReading]) -> AppendOutcome {
        let merged: Vec<HourlyReading> = stored.iter().chain(new.iter()).cloned().collect();
        let readings = dedupe(&merged);

        let mut tables = SeasonTables::new();
        for key in self.touched_seasons(new) {
            match self.recompute_season(&readings, key) {
                Ok(days) => {
                    tables.insert(key, days);
                }
                Err(e) => debug!("Season {} not recomputed: {}", key, e),
            }
        }

        AppendOutcome { readings, tables }
    }

    /// Estimate the in-progress ski day from a live window.
    pub fn estimate_today(&self, live: &[HourlyReading]) -> PartialDay {
        estimate(live, &self.clock)
    }

    /// Put the in-progress day into its season's rows and re-accumulate.
    ///
    /// Returns the season the day belongs to, or `None` (rows untouched) for
    /// no data or an out-of-season day.
    pub fn splice_today(&self, days: &mut Vec<DailySummary>, partial: &PartialDay) -> Option<SeasonKey> {
        let PartialDay::InProgress { ski_day, summary, .. } = partial else {
            return None;
        };
        let key = SeasonKey::for_date(*ski_day)?;

        splice_partial(days, summary.clone());
        *days = self.accumulate(std::mem::take(days));
        Some(key)
    }

    /// Align stored seasons, `current` marking the one still in progress.
    pub fn compare(&self, seasons: Vec<(SeasonKey, Vec<DailySummary>)>, current: Option<SeasonKey>) -> Alignment {
        let records: Vec<SeasonRecord> = seasons
            .into_iter()
            .map(|(key, days)| SeasonRecord::new(key, days, Some(key) == current))
            .collect();
        SeasonAligner::new(self.excluded.iter().copied(), self.period_years).align(&records)
    }
}
