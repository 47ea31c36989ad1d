use crate::models::{round_to, DailySummary, Snowfall};
use crate::season::SeasonStart;
use chrono::NaiveDate;

/// Annotate a season's date-ordered rows with the running snowfall total.
///
/// Rows before `cutoff` are removed and never touch the total. The total
/// resets to zero on every row dated on the season start, holds steady on
/// rain days and grows by each positive measured amount.
pub fn accumulate(
    days: Vec<DailySummary>,
    start: SeasonStart,
    cutoff: Option<NaiveDate>,
) -> Vec<DailySummary> {
    days.into_iter()
        .filter(|day| cutoff.map_or(true, |cutoff| day.date >= cutoff))
        .scan(0.0_f64, |running, mut day| {
            *running = next_total(*running, &day, start);
            day.accumulated_snowfall_cm = Some(round_to(*running, 2));
            Some(day)
        })
        .collect()
}

fn next_total(running: f64, day: &DailySummary, start: SeasonStart) -> f64 {
    let base = if start.matches(day.date) { 0.0 } else { running };
    match day.snowfall {
        Snowfall::Rain => base,
        Snowfall::Measured { amount_cm, .. } if amount_cm > 0.0 => base + amount_cm,
        Snowfall::Measured { .. } => base,
    }
}
