use crate::error::{AppError, Result};
use crate::fetcher::Parameter;
use crate::season::{SeasonKey, SeasonStart};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub station: StationConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub season: SeasonConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StationConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub parameters: ParameterIds,
    #[serde(default = "default_archive_period")]
    pub archive_period: String,
    #[serde(default = "default_live_period")]
    pub live_period: String,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_seconds", deserialize_with = "deserialize_u64")]
    pub timeout_seconds: u64,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_archive_period() -> String {
    "latest-months".to_string()
}

fn default_live_period() -> String {
    "latest-day".to_string()
}

fn default_request_delay_ms() -> u64 {
    500 // 500ms delay between fetch windows
}

fn default_timeout_seconds() -> u64 {
    60
}

/// Data-source identifiers of the four hourly parameters.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ParameterIds {
    pub temperature: String,
    pub precipitation: String,
    pub wind: String,
    pub humidity: String,
}

impl ParameterIds {
    pub fn id(&self, parameter: Parameter) -> &str {
        match parameter {
            Parameter::Temperature => &self.temperature,
            Parameter::Precipitation => &self.precipitation,
            Parameter::Wind => &self.wind,
            Parameter::Humidity => &self.humidity,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeasonConfig {
    #[serde(default = "default_start_month")]
    pub start_month: u32,
    #[serde(default = "default_start_day")]
    pub start_day: u32,
    /// Two-digit-pair labels of seasons with known-bad instrumentation.
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default = "default_period_years")]
    pub period_years: i32,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            start_month: default_start_month(),
            start_day: default_start_day(),
            excluded: Vec::new(),
            period_years: default_period_years(),
        }
    }
}

fn default_start_month() -> u32 {
    11
}

fn default_start_day() -> u32 {
    1
}

fn default_period_years() -> i32 {
    5
}

impl SeasonConfig {
    pub fn start(&self) -> SeasonStart {
        SeasonStart {
            month: self.start_month,
            day: self.start_day,
        }
    }

    pub fn excluded_keys(&self) -> Result<Vec<SeasonKey>> {
        self.excluded
            .iter()
            .map(|label| {
                label.parse::<SeasonKey>().map_err(|e| {
                    AppError::Config(format!("Invalid excluded season '{}': {}", label, e))
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(deserialize_with = "deserialize_u64")]
    pub interval_minutes: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_seconds: u64,
    /// Run a single pass and exit instead of looping.
    #[serde(default)]
    pub run_once: bool,
}

fn default_initial_delay() -> u64 {
    10
}

/// Custom deserializer that handles an integer given as number or string
///
/// Accepts:
/// - `interval_minutes: 60` (number)
/// - `interval_minutes: "60"` (string that parses to number)
/// - `interval_minutes: ${INTERVAL}` (env var substituted to either)
fn deserialize_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntValue {
        Number(u64),
        String(String),
    }

    match IntValue::deserialize(deserializer)? {
        IntValue::Number(n) => Ok(n),
        IntValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid integer: '{}'", s))),
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Expand environment variables, parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Non-empty station and parameter identifiers
    /// - HTTPS base URL
    /// - A season start inside Nov..Apr
    /// - Parseable excluded season labels
    /// - Positive time intervals and period span
    fn validate(&self) -> Result<()> {
        if self.station.id.trim().is_empty() {
            return Err(AppError::Config("Station id cannot be empty".to_string()));
        }

        for parameter in Parameter::ALL {
            if self.source.parameters.id(parameter).trim().is_empty() {
                return Err(AppError::Config(format!(
                    "Parameter id for {} cannot be empty",
                    parameter
                )));
            }
        }

        let parsed = url::Url::parse(&self.source.base_url).map_err(|e| {
            AppError::Config(format!(
                "Invalid source base_url '{}': {}",
                self.source.base_url, e
            ))
        })?;

        if parsed.scheme() != "https" {
            return Err(AppError::Config(format!(
                "Source base_url must use HTTPS, got: {}",
                parsed.scheme()
            )));
        }

        if self.source.timeout_seconds == 0 {
            return Err(AppError::Config(
                "Source timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !self.season.start().is_valid() {
            return Err(AppError::Config(format!(
                "Season start {:02}-{:02} must be a calendar day between November and April",
                self.season.start_month, self.season.start_day
            )));
        }

        self.season.excluded_keys()?;

        if self.season.period_years < 1 {
            return Err(AppError::Config(format!(
                "Season period_years must be at least 1, got {}",
                self.season.period_years
            )));
        }

        if self.scheduler.interval_minutes == 0 {
            return Err(AppError::Config(
                "Scheduler interval_minutes must be greater than 0".to_string(),
            ));
        }

        // Warn if interval is too short
        if self.scheduler.interval_minutes < 5 {
            tracing::warn!(
                "Scheduler interval of {} minutes is very short, consider using at least 5 minutes",
                self.scheduler.interval_minutes
            );
        }

        Ok(())
    }
}

/// Names of the `${VAR}` placeholders in `content`, first occurrence order
fn env_placeholders(content: &str) -> Vec<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut names: Vec<String> = Vec::new();
    for cap in re.captures_iter(content) {
        if !names.iter().any(|name| name == &cap[1]) {
            names.push(cap[1].to_string());
        }
    }
    names
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let mut missing_vars = Vec::new();

    for var_name in env_placeholders(content) {
        match std::env::var(&var_name) {
            Ok(value) => {
                result = result.replace(&format!("${{{}}}", var_name), &value);
            }
            Err(_) => missing_vars.push(var_name),
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
