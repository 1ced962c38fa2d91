//! Calendar arithmetic used by the interpolation axis.
//!
//! All helpers look at the UTC calendar date of an instant and ignore the
//! time-of-day part.

use time::{Date, OffsetDateTime, UtcOffset};

fn utc_date(ts: OffsetDateTime) -> Date {
    ts.to_offset(UtcOffset::UTC).date()
}

/// Day of month of the last day in `ts`'s month.
pub fn last_day_of_month(ts: OffsetDateTime) -> u8 {
    let date = utc_date(ts);
    date.month().length(date.year())
}

pub fn is_last_day_of_month(ts: OffsetDateTime) -> bool {
    utc_date(ts).day() == last_day_of_month(ts)
}

/// Whole days from `ts` to the last day of its month (0 on the last day).
pub fn days_until_month_end(ts: OffsetDateTime) -> i32 {
    i32::from(last_day_of_month(ts)) - i32::from(utc_date(ts).day())
}

/// 1-based ordinal of `ts` within its year.
pub fn day_of_year(ts: OffsetDateTime) -> i32 {
    i32::from(utc_date(ts).ordinal())
}

pub fn years_differ(a: OffsetDateTime, b: OffsetDateTime) -> bool {
    utc_date(a).year() != utc_date(b).year()
}

pub fn same_month(a: OffsetDateTime, b: OffsetDateTime) -> bool {
    let (a, b) = (utc_date(a), utc_date(b));
    a.year() == b.year() && a.month() == b.month()
}

/// Midnight UTC of the day `ts` falls on.
pub fn truncate_to_midnight(ts: OffsetDateTime) -> OffsetDateTime {
    utc_date(ts).midnight().assume_utc()
}
