use crate::aligner::Alignment;
use crate::error::{AppError, Result};
use crate::models::{DailySummary, HourlyReading};
use crate::partial::HourSlot;
use crate::season::SeasonKey;
use crate::table;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SEASON_PREFIX: &str = "season_";
const RAW_PREFIX: &str = "raw_";
const TODAY_FILE: &str = "today.csv";
const COMPARISON_FILE: &str = "comparison.json";

/// Per-season text files under one data directory.
///
/// `season_<label>.csv` holds the accumulated daily table, `raw_<label>.csv`
/// the hourly readings it was computed from. Excluded seasons are skipped by
/// every listing even when their files exist.
pub struct SeasonStore {
    dir: PathBuf,
    excluded: HashSet<SeasonKey>,
}

impl SeasonStore {
    pub fn new<P: AsRef<Path>>(dir: P, excluded: impl IntoIterator<Item = SeasonKey>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            excluded: excluded.into_iter().collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn season_path(&self, key: SeasonKey) -> PathBuf {
        self.dir.join(format!("{}{}.csv", SEASON_PREFIX, key.label()))
    }

    pub fn raw_path(&self, key: SeasonKey) -> PathBuf {
        self.dir.join(format!("{}{}.csv", RAW_PREFIX, key.label()))
    }

    pub fn save_season(&self, key: SeasonKey, days: &[DailySummary]) -> Result<PathBuf> {
        let path = self.season_path(key);
        self.write_file(&path, |writer| table::write_daily(writer, days, true))?;
        debug!("Wrote {} days for season {} to {}", days.len(), key, path.display());
        Ok(path)
    }

    /// Daily rows of a season, `None` when no file exists.
    pub fn load_season(&self, key: SeasonKey) -> Result<Option<Vec<DailySummary>>> {
        let path = self.season_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let days = table::read_daily(BufReader::new(File::open(&path)?)).map_err(|e| {
            AppError::InvalidData(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(days))
    }

    pub fn save_raw(&self, key: SeasonKey, readings: &[HourlyReading]) -> Result<PathBuf> {
        let path = self.raw_path(key);
        self.write_file(&path, |writer| table::write_readings(writer, readings))?;
        Ok(path)
    }

    /// Stored raw readings of a season; empty when none were saved yet.
    pub fn load_raw(&self, key: SeasonKey) -> Result<Vec<HourlyReading>> {
        let path = self.raw_path(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        table::read_readings(BufReader::new(File::open(&path)?))
    }

    /// Seasons with a daily table on disk, ascending, excluded ones omitted.
    pub fn list_seasons(&self) -> Result<Vec<SeasonKey>> {
        let pattern = self.dir.join(format!("{}*.csv", SEASON_PREFIX));
        let pattern = pattern.to_string_lossy();

        let entries = glob::glob(&pattern)
            .map_err(|e| AppError::Config(format!("Invalid season file pattern '{}': {}", pattern, e)))?;

        let mut keys = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping unreadable season file: {}", e);
                    continue;
                }
            };
            let Some(label) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.strip_prefix(SEASON_PREFIX))
            else {
                continue;
            };
            match label.parse::<SeasonKey>() {
                Ok(key) if self.excluded.contains(&key) => {
                    debug!("Season {} is excluded, not listing {}", key, path.display());
                }
                Ok(key) => keys.push(key),
                Err(e) => warn!("Ignoring {}: {}", path.display(), e),
            }
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Every listed season with its rows.
    pub fn load_all(&self) -> Result<Vec<(SeasonKey, Vec<DailySummary>)>> {
        let mut seasons = Vec::new();
        for key in self.list_seasons()? {
            if let Some(days) = self.load_season(key)? {
                seasons.push((key, days));
            }
        }
        Ok(seasons)
    }

    pub fn write_today(&self, slots: &[HourSlot]) -> Result<PathBuf> {
        let path = self.dir.join(TODAY_FILE);
        self.write_file(&path, |writer| table::write_hourly(writer, slots))?;
        Ok(path)
    }

    pub fn write_comparison(&self, alignment: &Alignment) -> Result<PathBuf> {
        let path = self.dir.join(COMPARISON_FILE);
        self.write_file(&path, |writer| {
            serde_json::to_writer_pretty(writer, alignment)?;
            Ok(())
        })?;
        Ok(path)
    }

    /// Write to `<name>.tmp` next to `path`, then rename over it.
    ///
    /// On failure the temporary file is removed and `path` is left as it was.
    fn write_file<F>(&self, path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<()>,
    {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("tmp");

        let written = File::create(&tmp).map_err(AppError::from).and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        });

        if let Err(e) = written.and_then(|_| fs::rename(&tmp, path).map_err(AppError::from)) {
            if let Err(remove_err) = fs::remove_file(&tmp) {
                debug!("No temporary file to remove at {}: {}", tmp.display(), remove_err);
            }
            return Err(e);
        }
        Ok(())
    }
}
