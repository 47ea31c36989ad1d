use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::{OffsetComponents, Tz};

/// Local hour at which a ski day starts.
pub const SKI_DAY_START_HOUR: u32 = 8;

/// Station-local wall clock and the 08:00 to 08:00 ski-day rule.
///
/// This is the single definition of the station's timezone. Every component
/// that needs a local date or hour goes through it; the daylight-saving window
/// comes from the IANA database (CET/CEST, switching on the last Sunday of
/// March and October at 01:00 UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDayClock {
    tz: Tz,
}

impl Default for LocalDayClock {
    fn default() -> Self {
        Self::central_european()
    }
}

impl LocalDayClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Central European Time with the EU daylight-saving rule.
    pub fn central_european() -> Self {
        Self::new(chrono_tz::Europe::Berlin)
    }

    /// True when `instant` falls inside the daylight-saving window.
    pub fn is_summer_time(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.tz);
        local.offset().dst_offset() != Duration::zero()
    }

    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.tz).naive_local()
    }

    pub fn local_hour(&self, instant: DateTime<Utc>) -> u32 {
        self.to_local(instant).hour()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.to_local(instant).date()
    }

    /// Local calendar date formatted as `YYYY-MM-DD`.
    pub fn local_date_key(&self, instant: DateTime<Utc>) -> String {
        self.local_date(instant).format("%Y-%m-%d").to_string()
    }

    /// Start date of the ski day containing `instant`.
    ///
    /// Ski day N covers local 08:00 on N (exclusive) through local 08:00 on
    /// N+1 (inclusive). Readings report the hour that just ended, so the 08:00
    /// reading closes the previous ski day.
    pub fn ski_day(&self, instant: DateTime<Utc>) -> NaiveDate {
        let local = self.to_local(instant);
        if local.time() <= ski_day_start() {
            previous_day(local.date())
        } else {
            local.date()
        }
    }
}

fn ski_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(SKI_DAY_START_HOUR, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}
