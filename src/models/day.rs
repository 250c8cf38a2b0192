use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Local calendar day a UTC instant falls on, under a fixed UTC offset.
pub fn local_day(ts: DateTime<Utc>, offset_secs: i32) -> NaiveDate {
    (ts.naive_utc() + Duration::seconds(offset_secs as i64)).date()
}

/// UTC instant of a day's local midnight.
pub fn day_start(day: NaiveDate, offset_secs: i32) -> DateTime<Utc> {
    let local_midnight = day.and_time(NaiveTime::MIN) - Duration::seconds(offset_secs as i64);
    Utc.from_utc_datetime(&local_midnight)
}

/// UTC instant of the following day's local midnight (exclusive day end).
pub fn next_day_start(day: NaiveDate, offset_secs: i32) -> DateTime<Utc> {
    day_start(day, offset_secs) + Duration::days(1)
}
