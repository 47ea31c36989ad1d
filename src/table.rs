use crate::error::{AppError, Result};
use crate::models::{DailySummary, HourClass, HourlyReading, Snowfall};
use crate::partial::HourSlot;
use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord, Writer};
use std::io::{Read, Write};

/// Rain becomes this literal in both `snowfall_cm` and `slr`, only at the
/// table boundary. Blank cells mean "no data".
pub const RAIN_SENTINEL: f64 = -1.0;

/// Date format of the `date` column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const DAILY_COLUMNS: [&str; 6] = [
    "date",
    "snowfall_cm",
    "slr",
    "temp_max",
    "temp_min",
    "humidity_avg",
];

pub const ACCUMULATED_COLUMN: &str = "accumulated_snowfall_cm";

pub const HOURLY_COLUMNS: [&str; 8] = [
    "timestamp",
    "local_hour",
    "temperature",
    "precipitation_mm",
    "wind_ms",
    "humidity",
    "snowfall_cm",
    "slr",
];

fn format_number(value: f64) -> String {
    value.to_string()
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

fn snowfall_cells(snowfall: Snowfall) -> [String; 2] {
    match snowfall {
        Snowfall::Rain => [format_number(RAIN_SENTINEL), format_number(RAIN_SENTINEL)],
        Snowfall::Measured { amount_cm, slr } => [format_number(amount_cm), format_number(slr)],
    }
}

/// Write daily rows, optionally with the accumulated column.
pub fn write_daily<W: Write>(writer: W, days: &[DailySummary], with_accumulated: bool) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);

    let mut header: Vec<&str> = DAILY_COLUMNS.to_vec();
    if with_accumulated {
        header.push(ACCUMULATED_COLUMN);
    }
    wtr.write_record(&header)?;

    for day in days {
        let [snowfall, slr] = snowfall_cells(day.snowfall);
        let mut record = vec![
            day.date.format(DATE_FORMAT).to_string(),
            snowfall,
            slr,
            format_optional(day.temp_max_c),
            format_optional(day.temp_min_c),
            format_optional(day.humidity_avg_pct),
        ];
        if with_accumulated {
            record.push(format_optional(day.accumulated_snowfall_cm));
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn daily_to_string(days: &[DailySummary], with_accumulated: bool) -> Result<String> {
    let mut buffer = Vec::new();
    write_daily(&mut buffer, days, with_accumulated)?;
    String::from_utf8(buffer)
        .map_err(|e| AppError::InvalidData(format!("Daily table is not UTF-8: {}", e)))
}

/// Read a daily table written by [`write_daily`].
///
/// A `-1` in only one of `snowfall_cm`/`slr`, or any other negative amount,
/// is reported as `AppError::InvalidData`.
pub fn read_daily<R: Read>(reader: R) -> Result<Vec<DailySummary>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let has_accumulated = check_daily_header(&headers)?;

    let mut days = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = index + 2;
        days.push(parse_daily_record(&record, has_accumulated, line)?);
    }
    Ok(days)
}

fn check_daily_header(headers: &StringRecord) -> Result<bool> {
    let names: Vec<&str> = headers.iter().collect();
    if names.len() < DAILY_COLUMNS.len() || names[..DAILY_COLUMNS.len()] != DAILY_COLUMNS {
        return Err(AppError::InvalidData(format!(
            "Unexpected daily table header: {}",
            names.join(",")
        )));
    }
    match names.get(DAILY_COLUMNS.len()) {
        None => Ok(false),
        Some(&ACCUMULATED_COLUMN) => Ok(true),
        Some(other) => Err(AppError::InvalidData(format!(
            "Unexpected daily table column '{}'",
            other
        ))),
    }
}

fn parse_daily_record(record: &StringRecord, has_accumulated: bool, line: usize) -> Result<DailySummary> {
    let field = |index: usize| record.get(index).unwrap_or("");

    let date = NaiveDate::parse_from_str(field(0), DATE_FORMAT).map_err(|e| {
        AppError::InvalidData(format!("Line {}: invalid date '{}': {}", line, field(0), e))
    })?;

    let snowfall_cm = parse_cell(field(1), line, "snowfall_cm")?;
    let slr = parse_cell(field(2), line, "slr")?;
    let snowfall = decode_snowfall(snowfall_cm, slr)
        .map_err(|reason| AppError::InvalidData(format!("Line {} ({}): {}", line, date, reason)))?;

    Ok(DailySummary {
        date,
        snowfall,
        temp_max_c: parse_cell(field(3), line, "temp_max")?,
        temp_min_c: parse_cell(field(4), line, "temp_min")?,
        humidity_avg_pct: parse_cell(field(5), line, "humidity_avg")?,
        accumulated_snowfall_cm: if has_accumulated {
            parse_cell(field(6), line, ACCUMULATED_COLUMN)?
        } else {
            None
        },
    })
}

fn parse_cell(cell: &str, line: usize, column: &str) -> Result<Option<f64>> {
    if cell.is_empty() {
        return Ok(None);
    }
    let value = cell.parse::<f64>().map_err(|e| {
        AppError::InvalidData(format!("Line {}: invalid {} '{}': {}", line, column, cell, e))
    })?;
    if !value.is_finite() {
        return Err(AppError::InvalidData(format!(
            "Line {}: non-finite {} '{}'",
            line, column, cell
        )));
    }
    Ok(Some(value))
}

fn decode_snowfall(snowfall_cm: Option<f64>, slr: Option<f64>) -> std::result::Result<Snowfall, String> {
    let is_sentinel = |value: f64| value == RAIN_SENTINEL;
    match (snowfall_cm, slr) {
        (Some(amount), Some(slr)) if is_sentinel(amount) && is_sentinel(slr) => Ok(Snowfall::Rain),
        (Some(amount), Some(slr)) if is_sentinel(amount) || is_sentinel(slr) => Err(format!(
            "rain sentinel paired with a measured value (snowfall_cm={}, slr={})",
            amount, slr
        )),
        (Some(amount), Some(slr)) if amount < 0.0 || slr < 0.0 => Err(format!(
            "negative snowfall_cm={} or slr={}",
            amount, slr
        )),
        (Some(amount_cm), Some(slr)) => Ok(Snowfall::Measured { amount_cm, slr }),
        _ => Err("snowfall_cm and slr must both be present".to_string()),
    }
}

/// Write the recent-hours series; rain hours carry the sentinel, dry hours 0.
pub fn write_hourly<W: Write>(writer: W, slots: &[HourSlot]) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(HOURLY_COLUMNS)?;

    for slot in slots {
        let (snowfall, slr) = match slot.class {
            HourClass::Rain => (RAIN_SENTINEL, RAIN_SENTINEL),
            HourClass::Snow { amount_cm, slr } => (amount_cm, slr),
            HourClass::Dry => (0.0, 0.0),
        };
        wtr.write_record([
            slot.timestamp.to_rfc3339(),
            slot.local_hour.to_string(),
            format_optional(slot.temperature_c),
            format_number(slot.precipitation_mm),
            format_optional(slot.wind_ms),
            format_optional(slot.humidity_pct),
            format_number(snowfall),
            format_number(slr),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub const READING_COLUMNS: [&str; 5] = [
    "timestamp",
    "temperature",
    "precipitation_mm",
    "wind_ms",
    "humidity",
];

/// Write raw hourly readings, one row per timestamp.
pub fn write_readings<W: Write>(writer: W, readings: &[HourlyReading]) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(READING_COLUMNS)?;

    for reading in readings {
        wtr.write_record([
            reading.timestamp.to_rfc3339(),
            format_optional(reading.temperature_c),
            format_optional(reading.precipitation_mm),
            format_optional(reading.wind_ms),
            format_optional(reading.humidity_pct),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn read_readings<R: Read>(reader: R) -> Result<Vec<HourlyReading>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.iter().ne(READING_COLUMNS) {
        return Err(AppError::InvalidData(format!(
            "Unexpected readings header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut readings = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        let line = index + 2;
        let field = |i: usize| record.get(i).unwrap_or("");

        let timestamp = DateTime::parse_from_rfc3339(field(0))
            .map_err(|e| {
                AppError::InvalidData(format!("Line {}: invalid timestamp '{}': {}", line, field(0), e))
            })?
            .with_timezone(&Utc);

        readings.push(HourlyReading {
            timestamp,
            temperature_c: parse_cell(field(1), line, "temperature")?,
            precipitation_mm: parse_cell(field(2), line, "precipitation_mm")?,
            wind_ms: parse_cell(field(3), line, "wind_ms")?,
            humidity_pct: parse_cell(field(4), line, "humidity")?,
        });
    }
    Ok(readings)
}
