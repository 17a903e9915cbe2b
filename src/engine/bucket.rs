//! Calendar bucketing.
//!
//! Five-minute and hourly buckets are cut in UTC. Daily and longer buckets
//! follow the local civil calendar of the configured timezone, so their
//! boundaries move with daylight-saving changes.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::engine::types::IntervalKind;

/// Maps instants onto the buckets of a fixed civil timezone.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    tz: Tz,
}

impl Calendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Start of the bucket containing `instant`. Idempotent.
    pub fn bucket_start(&self, instant: DateTime<Utc>, kind: IntervalKind) -> DateTime<Utc> {
        match kind {
            IntervalKind::FiveMinutes => truncate_utc(instant, 300),
            IntervalKind::Hourly => truncate_utc(instant, 3600),
            IntervalKind::Daily => self.local_midnight(self.local_date(instant)),
            IntervalKind::Weekly => {
                let date = self.local_date(instant);
                let monday =
                    date - TimeDelta::days(date.weekday().num_days_from_monday() as i64);
                self.local_midnight(monday)
            }
            IntervalKind::Monthly => {
                let date = self.local_date(instant);
                self.local_midnight(date - TimeDelta::days(date.day0() as i64))
            }
            IntervalKind::Yearly => {
                let date = self.local_date(instant);
                self.local_midnight(date - TimeDelta::days(date.ordinal0() as i64))
            }
        }
    }

    /// End of the bucket that starts at `start`.
    ///
    /// Fixed-length kinds add their duration; months and years step to the
    /// first local midnight of the next civil month or year.
    pub fn bucket_end(&self, start: DateTime<Utc>, kind: IntervalKind) -> DateTime<Utc> {
        match kind {
            IntervalKind::FiveMinutes => start + TimeDelta::minutes(5),
            IntervalKind::Hourly => start + TimeDelta::hours(1),
            IntervalKind::Daily => start + TimeDelta::days(1),
            IntervalKind::Weekly => start + TimeDelta::weeks(1),
            IntervalKind::Monthly => self.local_midnight(add_months(self.local_date(start), 1)),
            IntervalKind::Yearly => self.local_midnight(add_months(self.local_date(start), 12)),
        }
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// First instant of `date` in local time. Ambiguous midnights resolve to
    /// the earlier instant; a midnight that falls into a DST gap resolves to
    /// the first local time that exists after it.
    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        if let Some(t) = self.tz.from_local_datetime(&midnight).earliest() {
            return t.with_timezone(&Utc);
        }
        (1..=180)
            .find_map(|minutes| {
                self.tz
                    .from_local_datetime(&(midnight + TimeDelta::minutes(minutes)))
                    .earliest()
            })
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc())
    }
}

fn truncate_utc(instant: DateTime<Utc>, window_secs: i64) -> DateTime<Utc> {
    let into_window = (instant.minute() as i64 * 60 + instant.second() as i64) % window_secs;
    instant
        - TimeDelta::seconds(into_window)
        - TimeDelta::nanoseconds(instant.nanosecond() as i64)
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}
