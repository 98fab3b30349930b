//! World clock abstraction used by `TIMESPAN`-family event conditions.
//!
//! A trait rather than a bare `Utc::now()` call so tests can pin the clock
//! to exercise the day/minute wraparound edge cases.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::sync::Arc;

pub trait ClockSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct WorldClock {
    source: Arc<dyn ClockSource>,
}

impl WorldClock {
    pub fn system() -> Self {
        Self {
            source: Arc::new(SystemClock),
        }
    }

    pub fn fixed(source: Arc<dyn ClockSource>) -> Self {
        Self { source }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.source.now()
    }

    pub fn minute_of_day(&self) -> u32 {
        let now = self.now();
        now.hour() * 60 + now.minute()
    }

    pub fn day_of_week(&self) -> u32 {
        self.now().weekday().num_days_from_monday()
    }

    pub fn day_of_year(&self) -> u32 {
        self.now().ordinal()
    }

    /// Whether `minute_of_day()` falls within `[start, end)`, wrapping past
    /// midnight when `end < start` (e.g. 22:00-04:00).
    pub fn in_minute_range(&self, start: u32, end: u32) -> bool {
        let now = self.minute_of_day();
        if start <= end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }

    /// Whether the current day-of-year falls within `[start, end)` by
    /// ordinal day, wrapping past Dec 31 -> Jan 1 the same way.
    pub fn in_day_range(&self, start: u32, end: u32) -> bool {
        let now = self.day_of_year();
        if start <= end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }
}
