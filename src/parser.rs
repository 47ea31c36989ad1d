use crate::error::{AppError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Failure rate above which a series is reported as degraded
const DEFAULT_WARN_THRESHOLD: f64 = 0.10;

/// Epoch values above this are milliseconds, below are seconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Time of day given to date-only timestamps
const DATE_ONLY_HOUR: u32 = 12;

/// One timestamped scalar of a single parameter series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
struct SeriesPayload {
    #[serde(default)]
    value: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    #[serde(default)]
    date: Value,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone)]
pub struct ParseStats {
    pub total_points: usize,
    pub parsed_successfully: usize,
    pub parse_failures: usize,
    pub empty_points: usize,
    pub failure_rate: f64,
}

impl ParseStats {
    pub fn new() -> Self {
        Self {
            total_points: 0,
            parsed_successfully: 0,
            parse_failures: 0,
            empty_points: 0,
            failure_rate: 0.0,
        }
    }

    pub fn non_empty(&self) -> usize {
        self.total_points - self.empty_points
    }

    pub fn finalize(&mut self) {
        let non_empty = self.non_empty();
        self.failure_rate = if non_empty > 0 {
            self.parse_failures as f64 / non_empty as f64
        } else {
            0.0
        };
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failure_rate > threshold
    }
}

impl Default for ParseStats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Parser;

impl Parser {
    /// Parse a parameter series payload and return values with parse statistics
    pub fn parse_series(body: &str) -> Result<(Vec<ParameterValue>, ParseStats)> {
        Self::parse_series_with_threshold(body, DEFAULT_WARN_THRESHOLD)
    }

    /// Parse a parameter series payload, warning when the failure rate is above
    /// `warn_threshold`
    ///
    /// Points with a null value are counted as empty. Points whose timestamp
    /// or value cannot be read are logged and skipped; the good points are
    /// always returned. Only a payload that is not a series at all is an error.
    pub fn parse_series_with_threshold(
        body: &str,
        warn_threshold: f64,
    ) -> Result<(Vec<ParameterValue>, ParseStats)> {
        let payload: SeriesPayload = serde_json::from_str(body)
            .map_err(|e| AppError::Parse(format!("Malformed series payload: {}", e)))?;

        let mut values = Vec::with_capacity(payload.value.len());
        let mut stats = ParseStats::new();

        for (index, point) in payload.value.iter().enumerate() {
            stats.total_points += 1;

            if point.value.is_null() {
                stats.empty_points += 1;
                continue;
            }

            match Self::parse_point(point) {
                Ok(value) => {
                    values.push(value);
                    stats.parsed_successfully += 1;
                }
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!(
                        "Failed to parse point {} (failure {}/{}): {} - date={} value={}",
                        index + 1,
                        stats.parse_failures,
                        stats.non_empty(),
                        e,
                        point.date,
                        point.value
                    );
                }
            }
        }

        stats.finalize();

        if stats.exceeds_threshold(warn_threshold) {
            warn!(
                "Parse failure rate {:.1}% exceeds {:.1}%: {} failures out of {} non-empty points, keeping {} values",
                stats.failure_rate * 100.0,
                warn_threshold * 100.0,
                stats.parse_failures,
                stats.non_empty(),
                values.len()
            );
        }

        Ok((values, stats))
    }

    fn parse_point(point: &RawPoint) -> Result<ParameterValue> {
        Ok(ParameterValue {
            timestamp: parse_timestamp(&point.date)?,
            value: parse_value(&point.value)?,
        })
    }
}

/// Normalize any timestamp shape the data source emits to a UTC instant.
///
/// Accepts epoch seconds or milliseconds (number or numeric string), compact
/// `YYYYMMDDHHmm`, RFC 3339 or offset-less ISO date-times (read as UTC) and
/// date-only `YYYY-MM-DD` / `YYYYMMDD`, which are placed at 12:00 UTC.
pub fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>> {
    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(whole) => parse_digits(&whole.to_string()),
            None => n
                .as_f64()
                .filter(|f| f.is_finite())
                .ok_or_else(|| AppError::Parse(format!("Invalid numeric timestamp {}", n)))
                .and_then(|f| from_epoch(f.trunc() as i64)),
        },
        Value::String(s) => parse_timestamp_str(s),
        other => Err(AppError::Parse(format!(
            "Unsupported timestamp type: {}",
            other
        ))),
    }
}

pub fn parse_timestamp_str(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AppError::Parse("Empty timestamp".to_string()));
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        return parse_digits(s);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(at_default_time(date));
    }

    Err(AppError::Parse(format!("Unrecognized timestamp '{}'", s)))
}

/// Digit-only timestamps: compact date-times and dates are tried first,
/// anything that is not a valid calendar value is read as an epoch.
fn parse_digits(s: &str) -> Result<DateTime<Utc>> {
    let compact = match s.len() {
        12 => s[0..8]
            .parse::<i32>()
            .ok()
            .zip(s[8..12].parse::<i32>().ok())
            .and_then(|(date, time)| parse_datetime(date, time).ok()),
        8 => s
            .parse::<i32>()
            .ok()
            .and_then(|date| parse_datetime(date, DATE_ONLY_HOUR as i32 * 100).ok()),
        _ => None,
    };
    if let Some(instant) = compact {
        return Ok(instant);
    }

    let epoch = s
        .parse::<i64>()
        .map_err(|e| AppError::Parse(format!("Failed to parse timestamp '{}': {}", s, e)))?;
    from_epoch(epoch)
}

fn from_epoch(epoch: i64) -> Result<DateTime<Utc>> {
    let instant = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    };
    instant.ok_or_else(|| AppError::Parse(format!("Epoch {} out of range", epoch)))
}

fn at_default_time(date: NaiveDate) -> DateTime<Utc> {
    let noon = NaiveTime::from_hms_opt(DATE_ONLY_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(noon))
}

/// Numeric value as a number or numeric string; non-finite values are rejected.
pub fn parse_value(raw: &Value) -> Result<f64> {
    let value = match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AppError::Parse(format!("Invalid number {}", n)))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| AppError::Parse(format!("Failed to parse value '{}': {}", s, e)))?,
        other => {
            return Err(AppError::Parse(format!("Unsupported value type: {}", other)));
        }
    };

    if !value.is_finite() {
        return Err(AppError::Parse(format!("Non-finite value {}", value)));
    }
    Ok(value)
}

fn parse_datetime(date: i32, time: i32) -> Result<DateTime<Utc>> {
    // Date format: YYYYMMDD
    // Time format: HHMM

    let year = date / 10000;
    let month = (date % 10000) / 100;
    let day = date % 100;

    let hour = time / 100;
    let minute = time % 100;

    if !(1900..=2100).contains(&year) {
        return Err(AppError::Parse(format!(
            "Year {} out of valid range (1900-2100) from date {}",
            year, date
        )));
    }

    if !(1..=12).contains(&month) {
        return Err(AppError::Parse(format!(
            "Month {} out of valid range (1-12) from date {}",
            month, date
        )));
    }

    if !(1..=31).contains(&day) {
        return Err(AppError::Parse(format!(
            "Day {} out of valid range (1-31) from date {}",
            day, date
        )));
    }

    if hour > 23 {
        return Err(AppError::Parse(format!(
            "Hour {} out of valid range (0-23) from time {}",
            hour, time
        )));
    }

    if minute > 59 {
        return Err(AppError::Parse(format!(
            "Minute {} out of valid range (0-59) from time {}",
            minute, time
        )));
    }

    let naive_date = NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or_else(|| {
        AppError::Parse(format!(
            "Invalid date combination: year={}, month={}, day={} from {}",
            year, month, day, date
        ))
    })?;

    let naive_time = NaiveTime::from_hms_opt(hour as u32, minute as u32, 0).ok_or_else(|| {
        AppError::Parse(format!(
            "Invalid time combination: hour={}, minute={} from {}",
            hour, minute, time
        ))
    })?;

    Ok(Utc.from_utc_datetime(&NaiveDateTime::new(naive_date, naive_time)))
}
