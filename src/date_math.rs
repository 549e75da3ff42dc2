use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};

/// Anything that falls on a calendar day.
///
/// Time-of-day is dropped on conversion, so two values on the same day
/// always compare equal once normalized.
pub trait CalendarDay {
    fn calendar_day(&self) -> NaiveDate;
}

impl CalendarDay for NaiveDate {
    fn calendar_day(&self) -> NaiveDate {
        *self
    }
}

impl CalendarDay for NaiveDateTime {
    fn calendar_day(&self) -> NaiveDate {
        self.date()
    }
}

impl<Tz: TimeZone> CalendarDay for DateTime<Tz> {
    fn calendar_day(&self) -> NaiveDate {
        self.date_naive()
    }
}

impl<T: CalendarDay + ?Sized> CalendarDay for &T {
    fn calendar_day(&self) -> NaiveDate {
        (**self).calendar_day()
    }
}

/// Whole days from `b` to `a`. Negative when `a` is earlier.
pub fn day_diff(a: impl CalendarDay, b: impl CalendarDay) -> i64 {
    (a.calendar_day() - b.calendar_day()).num_days()
}

/// `date` shifted by `n` whole days.
pub fn add_days(date: impl CalendarDay, n: i64) -> NaiveDate {
    date.calendar_day() + chrono::Duration::days(n)
}

/// Grouping key in `YYYY-MM` form.
pub fn month_bucket(date: impl CalendarDay) -> String {
    date.calendar_day().format("%Y-%m").to_string()
}
