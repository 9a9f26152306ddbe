use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named relative time range for `/stats`, resolved to an inclusive lower
/// boundary date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterWindow {
    Today,
    ThisWeek,
    ThisMonth,
    #[serde(rename = "LAST_30_DAYS")]
    Last30Days,
    #[serde(rename = "LAST_6_MONTHS")]
    Last6Months,
}

impl FilterWindow {
    pub const ALL: [FilterWindow; 5] = [
        FilterWindow::Today,
        FilterWindow::ThisWeek,
        FilterWindow::ThisMonth,
        FilterWindow::Last30Days,
        FilterWindow::Last6Months,
    ];

    /// Canonical name, as accepted on the query string and used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterWindow::Today => "TODAY",
            FilterWindow::ThisWeek => "THIS_WEEK",
            FilterWindow::ThisMonth => "THIS_MONTH",
            FilterWindow::Last30Days => "LAST_30_DAYS",
            FilterWindow::Last6Months => "LAST_6_MONTHS",
        }
    }

    /// Resolve the window against a fixed `today`.
    ///
    /// - `TODAY`: today
    /// - `THIS_WEEK`: the ISO Monday of the current week
    /// - `THIS_MONTH`: the first of the current month
    /// - `LAST_30_DAYS`: 30 days before today
    /// - `LAST_6_MONTHS`: six calendar months before today, clamped to the
    ///   end of a shorter month
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            FilterWindow::Today => today,
            FilterWindow::ThisWeek => {
                today - Duration::days(today.weekday().num_days_from_monday() as i64)
            }
            FilterWindow::ThisMonth => today.with_day(1).unwrap_or(today),
            FilterWindow::Last30Days => today - Duration::days(30),
            FilterWindow::Last6Months => today
                .checked_sub_months(Months::new(6))
                .unwrap_or(NaiveDate::MIN),
        }
    }

    /// Resolve the window against the current UTC date.
    pub fn boundary(&self) -> NaiveDate {
        self.resolve(Utc::now().date_naive())
    }
}

impl FromStr for FilterWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        FilterWindow::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::InvalidFilter(format!("unrecognized filter: {s}")))
    }
}

impl std::fmt::Display for FilterWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
