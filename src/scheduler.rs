use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::models::HourlyReading;
use crate::partial::{current_ski_day, hourly_series, PartialDay};
use crate::pipeline::Pipeline;
use crate::season::SeasonKey;
use crate::store::SeasonStore;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

/// Hours in the recent-hours table
const HOURLY_SLOTS: usize = 24;

/// What one run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub seasons_written: usize,
    pub current_season: Option<SeasonKey>,
    pub partial_day: bool,
    pub parameter_gaps: usize,
}

pub struct Scheduler {
    config: Config,
    pipeline: Pipeline,
    store: SeasonStore,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(config: Config, shutdown_rx: watch::Receiver<bool>) -> Result<Self> {
        let pipeline = Pipeline::from_config(&config.season)?;
        let store = SeasonStore::new(&config.output.data_dir, config.season.excluded_keys()?);
        Ok(Self {
            config,
            pipeline,
            store,
            shutdown_rx,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let initial_delay = Duration::from_secs(self.config.scheduler.initial_delay_seconds);
        let poll_interval = Duration::from_secs(self.config.scheduler.interval_minutes * 60);

        info!(
            "Scheduler starting with {}s initial delay, {}m interval",
            self.config.scheduler.initial_delay_seconds, self.config.scheduler.interval_minutes
        );

        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {},
            _ = self.shutdown_rx.changed() => {
                info!("Shutdown received during initial delay");
                return Ok(());
            }
        }

        // Run immediately, then on interval
        let first = self.run_once().await;
        if self.config.scheduler.run_once {
            return first.map(|_| ());
        }
        if let Err(e) = first {
            error!("Calendar run error: {}", e);
        }

        let mut ticker = interval(poll_interval);
        ticker.tick().await; // First tick is immediate, skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("Calendar run error: {}", e);
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Fetch archive and live windows, update touched seasons, splice the
    /// partial day and write the outputs.
    pub async fn run_once(&self) -> Result<RunSummary> {
        info!("Starting calendar run");
        let source = &self.config.source;
        let fetcher = Fetcher::new(&source.base_url, &self.config.station.id, source.timeout())?;

        let archive = fetcher
            .fetch_all(&source.parameters, &source.archive_period)
            .await;

        if source.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(source.request_delay_ms)).await;
        }

        let live = fetcher.fetch_all(&source.parameters, &source.live_period).await;
        let parameter_gaps = archive.gaps.len() + live.gaps.len();

        if archive.lacks_required() && live.lacks_required() {
            return Err(AppError::NoData(
                "Temperature or precipitation unavailable for every window".to_string(),
            ));
        }

        let mut summary = self.process(&archive, &live)?;
        summary.parameter_gaps = parameter_gaps;

        info!(
            "Calendar run completed: {} seasons written, current season {}, partial day {}",
            summary.seasons_written,
            summary
                .current_season
                .map(|key| key.label())
                .unwrap_or_else(|| "-".to_string()),
            summary.partial_day
        );
        Ok(summary)
    }

    /// Everything after fetching; no I/O besides the store.
    pub fn process(&self, archive: &FetchOutcome, live: &FetchOutcome) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let new: Vec<HourlyReading> = archive
            .readings
            .iter()
            .chain(live.readings.iter())
            .cloned()
            .collect();

        for (key, fresh) in self.pipeline.partition_by_season(&new) {
            if self.pipeline.is_excluded(key) {
                continue;
            }
            let stored = self.store.load_raw(key)?;
            let outcome = self.pipeline.append_hours(&stored, &fresh);
            self.store.save_raw(key, &outcome.readings)?;

            for (season, days) in outcome.tables {
                self.store.save_season(season, &days)?;
                summary.seasons_written += 1;
            }
        }

        let clock = self.pipeline.clock();
        let partial = self.pipeline.estimate_today(&live.readings);
        summary.current_season = current_ski_day(&live.readings, clock)
            .or_else(|| current_ski_day(&archive.readings, clock))
            .and_then(SeasonKey::for_date)
            .filter(|key| !self.pipeline.is_excluded(*key));

        if let (PartialDay::InProgress { .. }, Some(key)) = (&partial, summary.current_season) {
            let mut days = self.store.load_season(key)?.unwrap_or_default();
            if self.pipeline.splice_today(&mut days, &partial).is_some() {
                self.store.save_season(key, &days)?;
                summary.partial_day = true;
            }
        } else if partial == PartialDay::NoData {
            warn!("No readings for the in-progress ski day yet");
        }

        if !live.readings.is_empty() {
            let slots = hourly_series(&live.readings, clock, HOURLY_SLOTS);
            self.store.write_today(&slots)?;
        }

        let seasons = self.store.load_all()?;
        if seasons.is_empty() {
            return Err(AppError::NoData(format!(
                "No season tables in {}",
                self.store.dir().display()
            )));
        }
        let alignment = self.pipeline.compare(seasons, summary.current_season);
        self.store.write_comparison(&alignment)?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_yaml(
            r#"
station:
  id: "0016A"
source:
  base_url: https://weather.example.com/api
  parameters:
    temperature: "1"
    precipitation: "5"
    wind: "4"
    humidity: "6"
scheduler:
  interval_minutes: 60
  initial_delay_seconds: 3600
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_shutdown_during_initial_delay() {
        let (tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(config(), rx).unwrap();
        tx.send(true).unwrap();

        tokio_test::block_on(async {
            assert!(scheduler.run().await.is_ok());
        });
    }

    #[test]
    fn test_process_without_any_data_is_no_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = config();
        config.output.data_dir = dir.path().to_path_buf();
        let (_tx, rx) = watch::channel(false);
        let scheduler = Scheduler::new(config, rx).unwrap();

        let result = scheduler.process(&FetchOutcome::default(), &FetchOutcome::default());
        assert!(matches!(result, Err(AppError::NoData(_))));
    }
}
