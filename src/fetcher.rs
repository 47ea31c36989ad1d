use crate::config::ParameterIds;
use crate::error::{AppError, Result};
use crate::models::HourlyReading;
use crate::parser::{ParameterValue, Parser};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The four hourly parameters the pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    Temperature,
    Precipitation,
    Wind,
    Humidity,
}

impl Parameter {
    pub const ALL: [Parameter; 4] = [
        Parameter::Temperature,
        Parameter::Precipitation,
        Parameter::Wind,
        Parameter::Humidity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Temperature => "temperature",
            Parameter::Precipitation => "precipitation",
            Parameter::Wind => "wind",
            Parameter::Humidity => "humidity",
        }
    }

    fn apply(&self, reading: &mut HourlyReading, value: f64) {
        let field = match self {
            Parameter::Temperature => &mut reading.temperature_c,
            Parameter::Precipitation => &mut reading.precipitation_mm,
            Parameter::Wind => &mut reading.wind_ms,
            Parameter::Humidity => &mut reading.humidity_pct,
        };
        *field = Some(value);
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Merged readings of one fetch window plus the parameters that could not be fetched.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub readings: Vec<HourlyReading>,
    /// One `AppError::SourceUnavailable` per parameter that failed.
    pub gaps: Vec<AppError>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    /// True when temperature or precipitation is missing, so no hour can be classified.
    pub fn lacks_required(&self) -> bool {
        self.gaps.iter().any(|gap| {
            matches!(gap, AppError::SourceUnavailable { parameter, .. }
                if parameter == Parameter::Temperature.name()
                    || parameter == Parameter::Precipitation.name())
        })
    }
}

pub struct Fetcher {
    client: Client,
    base_url: String,
    station_id: String,
}

impl Fetcher {
    pub fn new(base_url: &str, station_id: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("snow-calendar/0.1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            station_id: station_id.to_string(),
        })
    }

    pub fn series_url(&self, parameter_id: &str, period: &str) -> String {
        format!(
            "{}/parameter/{}/station/{}/period/{}/data.json",
            self.base_url, parameter_id, self.station_id, period
        )
    }

    /// Fetch and parse one parameter series over `period`
    pub async fn fetch_parameter(&self, parameter_id: &str, period: &str) -> Result<Vec<ParameterValue>> {
        let url = self.series_url(parameter_id, period);
        debug!("Fetching series from {}", url);

        let body = retry_with_backoff(3, || async {
            let response = self.client.get(&url).send().await?.error_for_status()?;
            let content = response.text().await?;
            Ok(content)
        })
        .await?;

        let (values, stats) = Parser::parse_series(&body)?;
        debug!(
            "Parsed parameter {}: {} values, {} empty, {} failures",
            parameter_id, stats.parsed_successfully, stats.empty_points, stats.parse_failures
        );
        Ok(values)
    }

    /// Fetch all four parameters concurrently and merge them by timestamp.
    ///
    /// A parameter that fails is recorded in `gaps`; the others still merge.
    pub async fn fetch_all(&self, ids: &ParameterIds, period: &str) -> FetchOutcome {
        let (temperature, precipitation, wind, humidity) = tokio::join!(
            self.fetch_parameter(ids.id(Parameter::Temperature), period),
            self.fetch_parameter(ids.id(Parameter::Precipitation), period),
            self.fetch_parameter(ids.id(Parameter::Wind), period),
            self.fetch_parameter(ids.id(Parameter::Humidity), period),
        );

        let mut series = Vec::with_capacity(Parameter::ALL.len());
        let mut gaps = Vec::new();

        for (parameter, result) in Parameter::ALL
            .into_iter()
            .zip([temperature, precipitation, wind, humidity])
        {
            match result {
                Ok(values) => series.push((parameter, values)),
                Err(e) => {
                    warn!("Parameter {} unavailable for period {}: {}", parameter, period, e);
                    gaps.push(AppError::SourceUnavailable {
                        parameter: parameter.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let readings = merge_parameters(&series);
        info!(
            "Fetched period {}: {} merged hours, {} parameter gaps",
            period,
            readings.len(),
            gaps.len()
        );

        FetchOutcome { readings, gaps }
    }
}

/// Join parameter series into readings by exact timestamp.
///
/// Within one series a later value for the same timestamp replaces an earlier
/// one. Each parameter only writes its own field, so the result does not
/// depend on the order of `series`.
pub fn merge_parameters(series: &[(Parameter, Vec<ParameterValue>)]) -> Vec<HourlyReading> {
    let mut by_timestamp: BTreeMap<DateTime<Utc>, HourlyReading> = BTreeMap::new();

    for (parameter, values) in series {
        for value in values {
            let reading = by_timestamp
                .entry(value.timestamp)
                .or_insert_with(|| HourlyReading::new(value.timestamp));
            parameter.apply(reading, value.value);
        }
    }

    by_timestamp.into_values().collect()
}

/// Retry a future with exponential backoff
async fn retry_with_backoff<F, Fut, T>(max_retries: u32, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                retries += 1;

                if retries > max_retries {
                    return Err(e);
                }

                let should_retry = match &e {
                    AppError::Http(reqwest_err) => {
                        // Retry on connection errors, timeouts, server errors (5xx)
                        reqwest_err.is_timeout()
                            || reqwest_err.is_connect()
                            || reqwest_err
                                .status()
                                .map(|s| s.is_server_error())
                                .unwrap_or(false)
                    }
                    AppError::Io(_) => true,
                    _ => false, // 4xx, parse errors and the like are final
                };

                if !should_retry {
                    return Err(e);
                }

                let delay = Duration::from_secs(2u64.pow(retries.saturating_sub(1)));
                warn!(
                    "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                    retries, max_retries, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
