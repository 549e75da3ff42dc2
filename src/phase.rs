use chrono::NaiveDate;

use crate::date_math::{day_diff, CalendarDay};
use crate::models::{period_length, Phase};

/// Days after the period ends that still count as follicular.
pub const FOLLICULAR_DAYS: i64 = 9;
/// Last day after the period ends that counts as ovulation.
pub const OVULATION_LAST_DAY: i64 = 16;

/// Phase of the cycle `[start, end]` as seen from `today`.
///
/// A cycle that has not started yet reads as menstrual.
pub fn classify(start: NaiveDate, end: NaiveDate, today: impl CalendarDay) -> Phase {
    classify_with_period(start, end, period_length(start, end), today)
}

/// Same as [`classify`] with an explicit period length.
///
/// Anything not menstrual, follicular or ovulation is luteal, including a
/// day inside `[start, end]` that lies past a short explicit `period_length`.
pub fn classify_with_period(
    start: NaiveDate,
    end: NaiveDate,
    period_length: u32,
    today: impl CalendarDay,
) -> Phase {
    let today = today.calendar_day();
    if today < start {
        return Phase::Menstrual;
    }

    let days_since_start = day_diff(today, start);
    let days_since_end = day_diff(today, end);

    if days_since_start < i64::from(period_length) {
        return Phase::Menstrual;
    }

    match days_since_end {
        d if (0..FOLLICULAR_DAYS).contains(&d) => Phase::Follicular,
        d if (FOLLICULAR_DAYS..=OVULATION_LAST_DAY).contains(&d) => Phase::Ovulation,
        _ => Phase::Luteal,
    }
}
