use crate::error::{AppError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Two-digit years at or above this pivot are read as 19xx, below as 20xx.
const CENTURY_PIVOT: i32 = 70;

/// A winter season (Nov 1 through Apr 30) identified by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SeasonKey(pub i32);

impl SeasonKey {
    /// The season a calendar date belongs to, or `None` for May..October.
    pub fn for_date(date: NaiveDate) -> Option<SeasonKey> {
        match date.month() {
            11 | 12 => Some(SeasonKey(date.year())),
            1..=4 => Some(SeasonKey(date.year() - 1)),
            _ => None,
        }
    }

    pub fn start_year(&self) -> i32 {
        self.0
    }

    /// November 1 of the start year.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, 11, 1).unwrap()
    }

    /// April 30 of the following year.
    pub fn last_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0 + 1, 4, 30).unwrap()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        SeasonKey::for_date(date) == Some(*self)
    }

    /// Two-digit-year pair, e.g. `9596` for the season starting 1995.
    pub fn label(&self) -> String {
        format!("{:02}{:02}", self.0.rem_euclid(100), (self.0 + 1).rem_euclid(100))
    }
}

impl fmt::Display for SeasonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for SeasonKey {
    type Err = AppError;

    fn from_str(label: &str) -> Result<Self> {
        let label = label.trim();
        if label.len() != 4 || !label.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Parse(format!(
                "Season label '{}' must be four digits, e.g. '9596'",
                label
            )));
        }

        let first: i32 = label[0..2]
            .parse()
            .map_err(|e| AppError::Parse(format!("Invalid season label '{}': {}", label, e)))?;
        let second: i32 = label[2..4]
            .parse()
            .map_err(|e| AppError::Parse(format!("Invalid season label '{}': {}", label, e)))?;

        if (first + 1) % 100 != second {
            return Err(AppError::Parse(format!(
                "Season label '{}' must name consecutive years",
                label
            )));
        }

        let start_year = if first >= CENTURY_PIVOT {
            1900 + first
        } else {
            2000 + first
        };
        Ok(SeasonKey(start_year))
    }
}

impl From<SeasonKey> for String {
    fn from(key: SeasonKey) -> Self {
        key.label()
    }
}

impl TryFrom<String> for SeasonKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Month/day on which accumulation resets to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonStart {
    pub month: u32,
    pub day: u32,
}

impl Default for SeasonStart {
    fn default() -> Self {
        Self { month: 11, day: 1 }
    }
}

impl SeasonStart {
    pub fn matches(&self, date: NaiveDate) -> bool {
        date.month() == self.month && date.day() == self.day
    }

    /// Whether the month/day names a real date inside the Nov..Apr window.
    pub fn is_valid(&self) -> bool {
        let in_window = matches!(self.month, 11 | 12 | 1..=4);
        // 2001 is not a leap year, so Feb 29 is rejected
        in_window && NaiveDate::from_ymd_opt(2001, self.month, self.day).is_some()
    }
}
