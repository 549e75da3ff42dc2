use crate::date_math::CalendarDay;
use crate::error::CycleError;
use crate::models::{CycleRecord, OwnerId};

/// Reject a new cycle for `owner` if one of `existing` already starts on the
/// same calendar day.
///
/// `existing` may hold records of other owners; only `owner`'s are compared.
pub fn ensure_unique_start<'a>(
    owner: OwnerId,
    new_start: impl CalendarDay,
    existing: impl IntoIterator<Item = &'a CycleRecord>,
) -> Result<(), CycleError> {
    let day = new_start.calendar_day();
    let clash = existing
        .into_iter()
        .any(|r| r.owner_id == owner && r.start_date == day);
    if clash {
        return Err(CycleError::DuplicateCycle { owner, day });
    }
    Ok(())
}
