use chrono::NaiveDate;

use crate::models::OwnerId;

/// Failures the inference engine reports to its caller.
///
/// An implausible cycle length is deliberately absent: it degrades to an
/// unknown length instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("a cycle starting on {day} already exists for owner {owner}")]
    DuplicateCycle { owner: OwnerId, day: NaiveDate },
    #[error("no cycle history to predict from")]
    NoHistory,
}
