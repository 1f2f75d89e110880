//! Source of "now" for both engines.
//!
//! Dates are civil dates in the user's local calendar. Nothing here goes through a UTC
//! day boundary: `today()` is the date part of the local timestamp.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone};

pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock pinned to one instant. Used by tests and by `--today`.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<FixedOffset>,
}

impl FixedClock {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self { at }
    }

    /// Noon on `date` in the local offset, so the civil date survives any offset.
    pub fn on(date: NaiveDate) -> Self {
        let noon = date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default());
        let offset = *Local::now().offset();
        let at = offset
            .from_local_datetime(&noon)
            .single()
            .unwrap_or_else(|| offset.from_utc_datetime(&noon));
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_keeps_civil_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let clock = FixedClock::on(date);
        assert_eq!(clock.today(), date);
    }

    #[test]
    fn fixed_clock_west_of_utc_does_not_shift_date() {
        // 23:30 at UTC-8 is already the next day in UTC.
        let offset = FixedOffset::west_opt(8 * 3600).unwrap();
        let at = offset.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }
}
