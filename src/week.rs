//! Week-grid date math.
//!
//! The schedule week is always 7 consecutive days anchored to Sunday.
//! All week-scoped reads and writes operate on this fixed window.

use chrono::{Datelike, Days, NaiveDate};

/// English day names, Sunday first, matching the week-grid order.
pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// The Sunday of the week containing `date`.
pub fn sunday_of_week(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_sunday() as u64;
    date - Days::new(back)
}

/// The 7 dates of the week starting at `sunday`.
pub fn week_dates(sunday: NaiveDate) -> [NaiveDate; 7] {
    std::array::from_fn(|i| sunday + Days::new(i as u64))
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
