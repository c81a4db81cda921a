//! Key of the day: a deterministic musical key per calendar date.

use chrono::{Datelike, NaiveDate, Utc};

const KEYS: [&str; 12] = [
    "A", "Bb", "B", "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab",
];

pub fn key_for_date(date: NaiveDate) -> &'static str {
    KEYS[date.num_days_from_ce().rem_euclid(KEYS.len() as i32) as usize]
}

pub fn key_of_day() -> &'static str {
    key_for_date(Utc::now().date_naive())
}
