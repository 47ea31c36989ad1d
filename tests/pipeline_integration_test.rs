use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use snow_calendar::aligner::{day_of_season, SEASON_SLOTS};
use snow_calendar::error::AppError;
use snow_calendar::models::{HourlyReading, Snowfall};
use snow_calendar::partial::PartialDay;
use snow_calendar::pipeline::Pipeline;
use snow_calendar::season::{SeasonKey, SeasonStart};

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn reading(timestamp: DateTime<Utc>, temp: f64, precip: f64) -> HourlyReading {
    HourlyReading {
        timestamp,
        temperature_c: Some(temp),
        precipitation_mm: Some(precip),
        wind_ms: Some(1.0),
        humidity_pct: Some(90.0),
    }
}

/// A day of hourly readings for the ski day starting on `day` (09:00 local on).
fn ski_day_hours(day: NaiveDate, temp: f64, precip: f64) -> Vec<HourlyReading> {
    let start = Utc.from_utc_datetime(&day.and_hms_opt(8, 0, 0).unwrap());
    (0..24)
        .map(|h| reading(start + Duration::hours(h), temp, precip))
        .collect()
}

/// Test no data, then 3.0 cm of snow, then rain accumulates to [3.0, 3.0]
#[test]
fn test_first_days_of_season_scenario() {
    let mut readings = vec![reading(at(2024, 11, 2, 12), -1.0, 3.0)];
    readings.push(reading(at(2024, 11, 3, 12), 6.0, 1.0));

    let days = Pipeline::default()
        .recompute_season(&readings, SeasonKey(2024))
        .unwrap();

    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, date(2024, 11, 2));
    // wet bulb -2: slr 10, 3 mm => 3.0 cm
    assert_eq!(days[0].snowfall.amount_cm(), Some(3.0));
    assert_eq!(days[0].accumulated_snowfall_cm, Some(3.0));
    assert_eq!(days[1].snowfall, Snowfall::Rain);
    assert_eq!(days[1].accumulated_snowfall_cm, Some(3.0));
}

/// Test recomputing twice over shuffled, duplicated input is identical
#[test]
fn test_recompute_is_idempotent() {
    let mut readings = Vec::new();
    for d in 1..=20 {
        let temp = if d % 6 == 0 { 4.0 } else { -6.0 + (d % 3) as f64 };
        readings.extend(ski_day_hours(date(2024, 12, d), temp, 0.3));
    }
    let pipeline = Pipeline::default();
    let first = pipeline.recompute_all(&readings).unwrap();

    let mut shuffled = readings.clone();
    shuffled.reverse();
    shuffled.extend(readings.iter().take(30).cloned());
    let second = pipeline.recompute_all(&shuffled).unwrap();

    assert_eq!(first, second);
    assert_eq!(first[&SeasonKey(2024)].len(), 20);
}

/// Test accumulation resets on the season start and nowhere else across seasons
#[test]
fn test_accumulation_does_not_leak_between_seasons() {
    let mut readings = ski_day_hours(date(2024, 4, 29), -5.0, 0.5);
    readings.extend(ski_day_hours(date(2024, 11, 1), -5.0, 0.5));

    let tables = Pipeline::default().recompute_all(&readings).unwrap();
    let previous = &tables[&SeasonKey(2023)];
    let current = &tables[&SeasonKey(2024)];
    assert_eq!(
        current[0].accumulated_snowfall_cm,
        Some(current[0].snowfall.amount_cm().unwrap())
    );
    assert!(previous.last().unwrap().accumulated_snowfall_cm.unwrap() > 0.0);
}

/// Test a custom season start resets mid-table
#[test]
fn test_custom_season_start_resets() {
    let pipeline = Pipeline::new(SeasonStart { month: 12, day: 1 }, [], 5);
    let mut readings = ski_day_hours(date(2024, 11, 30), -5.0, 0.5);
    readings.extend(ski_day_hours(date(2024, 12, 1), -5.0, 0.5));

    let days = pipeline.recompute_season(&readings, SeasonKey(2024)).unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(
        days[1].accumulated_snowfall_cm,
        days[1].snowfall.amount_cm()
    );
}

/// Test a cutoff drops earlier rows before they reach the running total
#[test]
fn test_cutoff_rows_never_reach_total() {
    let pipeline = Pipeline::default().with_cutoff(date(2024, 12, 2));
    let mut readings = ski_day_hours(date(2024, 12, 1), -5.0, 0.5);
    readings.extend(ski_day_hours(date(2024, 12, 2), -5.0, 0.5));

    let days = pipeline.recompute_season(&readings, SeasonKey(2024)).unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].date, date(2024, 12, 2));
    assert_eq!(days[0].accumulated_snowfall_cm, days[0].snowfall.amount_cm());
}

/// Test the ski-day boundary holds on both sides of the March DST switch
#[test]
fn test_ski_days_across_spring_forward() {
    let readings = vec![
        // 01:00 CET on Mar 30, before the switch: still the Mar 29 ski day
        reading(at(2025, 3, 30, 0), -5.0, 1.0),
        // 09:00 CEST on Mar 31 opens the Mar 31 ski day
        reading(at(2025, 3, 31, 7), -5.0, 1.0),
        // 08:00 CEST on Mar 31 closes the Mar 30 ski day
        reading(at(2025, 3, 31, 6), -5.0, 1.0),
    ];
    let tables = Pipeline::default().recompute_all(&readings).unwrap();
    let dates: Vec<NaiveDate> = tables[&SeasonKey(2024)].iter().map(|d| d.date).collect();
    assert_eq!(
        dates,
        vec![date(2025, 3, 29), date(2025, 3, 30), date(2025, 3, 31)]
    );
}

/// Test a stale live feed still reports its own latest ski day
#[test]
fn test_stale_feed_reports_data_day() {
    let pipeline = Pipeline::default();
    // Feed stopped at 10:00 local Jan 5
    let live = vec![
        reading(at(2025, 1, 5, 8), -4.0, 0.5),
        reading(at(2025, 1, 5, 9), -4.0, 0.5),
    ];
    match pipeline.estimate_today(&live) {
        PartialDay::InProgress {
            ski_day,
            hours_observed,
            ..
        } => {
            assert_eq!(ski_day, date(2025, 1, 5));
            assert_eq!(hours_observed, 2);
        }
        PartialDay::NoData => panic!("Expected in-progress day"),
    }
}

/// Test the current season never carries values past today
#[test]
fn test_current_season_alignment_stops_at_today() {
    let pipeline = Pipeline::default();
    let mut old = Vec::new();
    for d in [1, 15] {
        old.extend(ski_day_hours(date(2023, 12, d), -5.0, 0.2));
    }
    let mut current = Vec::new();
    for d in [1, 10] {
        current.extend(ski_day_hours(date(2024, 12, d), -5.0, 0.2));
    }

    let old = pipeline.recompute_season(&old, SeasonKey(2023)).unwrap();
    let current = pipeline.recompute_season(&current, SeasonKey(2024)).unwrap();
    let alignment = pipeline.compare(
        vec![(SeasonKey(2023), old), (SeasonKey(2024), current)],
        Some(SeasonKey(2024)),
    );

    let today = day_of_season(date(2024, 12, 10)).unwrap();
    let series = alignment.current.expect("Current season missing");
    assert_eq!(series.values.len(), SEASON_SLOTS);
    assert!(series.values[today].is_some());
    assert!(series.values[today + 1..].iter().all(Option::is_none));

    let completed = &alignment.completed[0];
    let first = day_of_season(date(2023, 12, 1)).unwrap();
    let last = day_of_season(date(2023, 12, 15)).unwrap();
    assert_eq!(completed.values[today], completed.values[first]);
    assert_eq!(completed.values[SEASON_SLOTS - 1], completed.values[last]);
    // Bands only come from the completed season
    assert_eq!(alignment.bands[today].unwrap().seasons, 1);
}

/// Test an excluded season is reported as no data
#[test]
fn test_excluded_season_recompute_is_no_data() {
    let pipeline = Pipeline::new(SeasonStart::default(), [SeasonKey(2024)], 5);
    let readings = ski_day_hours(date(2024, 12, 1), -5.0, 0.5);
    assert!(matches!(
        pipeline.recompute_season(&readings, SeasonKey(2024)),
        Err(AppError::NoData(_))
    ));
}
