//! Calendar days and the date/month/year key sequences of a corpus.
//!
//! Days are UTC calendar days. Until the final packing pass a message carries
//! its day in the binary form of [`Day::to_binary`]; the database stores the
//! day as an index into the sequence produced by [`TimeKeys::between`].

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::parse::Timestamp;

/// A `[year, month, day]` triple, month and day starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Day {
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

impl Day {
    pub fn new(year: u32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Splits a timestamp into its UTC day and second of that day.
    ///
    /// Returns `None` for timestamps chrono cannot represent or before year 0.
    pub fn from_timestamp(ts: Timestamp) -> Option<(Day, u32)> {
        let dt = DateTime::from_timestamp_millis(ts)?;
        let year = u32::try_from(dt.year()).ok()?;
        let day = Day::new(year, dt.month(), dt.day());
        Some((day, dt.num_seconds_from_midnight()))
    }

    /// Packs the day as `year << 9 | month << 5 | day`.
    pub fn to_binary(self) -> u32 {
        (self.year << 9) | (self.month << 5) | self.day
    }

    pub fn from_binary(binary: u32) -> Self {
        Self {
            year: binary >> 9,
            month: (binary >> 5) & 0b1111,
            day: binary & 0b11111,
        }
    }

    /// `YYYY-M-D`
    pub fn date_key(&self) -> String {
        format!("{}-{}-{}", self.year, self.month, self.day)
    }

    /// `YYYY-M`
    pub fn month_key(&self) -> String {
        format!("{}-{}", self.year, self.month)
    }

    /// `YYYY`
    pub fn year_key(&self) -> String {
        self.year.to_string()
    }

    /// Parses a key made by [`date_key`](Self::date_key),
    /// [`month_key`](Self::month_key) or [`year_key`](Self::year_key).
    pub fn from_key(key: &str) -> Option<Day> {
        let parts: Vec<u32> = key.split('-').map(str::parse).collect::<Result<_, _>>().ok()?;
        match parts.as_slice() {
            [y] => Some(Day::new(*y, 1, 1)),
            [y, m] => Some(Day::new(*y, *m, 1)),
            [y, m, d] => Some(Day::new(*y, *m, *d)),
            _ => None,
        }
    }

    /// Calendar days from `self` to `other`, negative if `other` is earlier.
    pub fn days_until(self, other: Day) -> Option<i64> {
        Some((other.to_naive()? - self.to_naive()?).num_days())
    }

    fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(i32::try_from(self.year).ok()?, self.month, self.day)
    }

    fn from_naive(date: NaiveDate) -> Option<Day> {
        Some(Day::new(u32::try_from(date.year()).ok()?, date.month(), date.day()))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.year, self.month, self.day)
    }
}

/// Every key between two days, both included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeKeys {
    pub date_keys: Vec<String>,
    pub month_keys: Vec<String>,
    pub year_keys: Vec<String>,
    /// Month of every entry of `date_keys`, as an index into `month_keys`.
    pub date_to_month: Vec<usize>,
    /// Year of every entry of `date_keys`, as an index into `year_keys`.
    pub date_to_year: Vec<usize>,
}

impl TimeKeys {
    /// Generates the keys from `start` to `end`.
    ///
    /// Returns empty keys if `start > end` or either day is not a valid date.
    pub fn between(start: Day, end: Day) -> Self {
        let mut keys = TimeKeys::default();
        let (Some(first), Some(last)) = (start.to_naive(), end.to_naive()) else {
            return keys;
        };

        for date in first.iter_days().take_while(|d| *d <= last) {
            let Some(day) = Day::from_naive(date) else {
                break;
            };
            let month_key = day.month_key();
            if keys.month_keys.last() != Some(&month_key) {
                keys.month_keys.push(month_key);
            }
            let year_key = day.year_key();
            if keys.year_keys.last() != Some(&year_key) {
                keys.year_keys.push(year_key);
            }
            keys.date_keys.push(day.date_key());
            keys.date_to_month.push(keys.month_keys.len() - 1);
            keys.date_to_year.push(keys.year_keys.len() - 1);
        }
        keys
    }

    pub fn num_days(&self) -> usize {
        self.date_keys.len()
    }

    /// Index of `day` in `date_keys`.
    pub fn day_index(&self, day: Day) -> Option<usize> {
        let key = day.date_key();
        self.date_keys.iter().position(|k| *k == key)
    }
}
