//! Calendar day keys in a learner's timezone
//!
//! Streaks count local calendar days, so the key is the date as seen on the
//! learner's wall clock ("YYYY-MM-DD"), never a UTC-truncated timestamp.

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::EngineError;

const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Today's and yesterday's keys for one instant in one timezone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayKeys {
    pub today: String,
    pub yesterday: String,
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz, EngineError> {
    name.parse::<Tz>()
        .map_err(|_| EngineError::Validation(format!("Unknown timezone: {name}")))
}

/// Local calendar date of `now` in `tz`
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Format a date as a day key
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

/// Parse a day key back to a date
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DAY_KEY_FORMAT).ok()
}

/// Compute today's and yesterday's keys for `now` in `tz`
pub fn day_keys(now: DateTime<Utc>, tz: Tz) -> DayKeys {
    let today = local_date(now, tz);
    // pred_opt only fails at NaiveDate::MIN
    let yesterday = today.pred_opt().unwrap_or(today);
    DayKeys {
        today: day_key(today),
        yesterday: day_key(yesterday),
    }
}

/// Key of the day `days_back` days before `key`
pub fn days_before(key: &str, days_back: u32) -> Option<String> {
    parse_day_key(key)
        .and_then(|d| d.checked_sub_days(Days::new(u64::from(days_back))))
        .map(day_key)
}
