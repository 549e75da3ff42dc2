use chrono::NaiveDate;

use crate::date_math::day_diff;
use crate::models::{CycleRecord, RecordId};

/// Shortest gap between period starts accepted for storage.
pub const MIN_CYCLE_LENGTH: i64 = 15;
/// Longest gap between period starts accepted for storage.
pub const MAX_CYCLE_LENGTH: i64 = 60;

/// Validated gap between two period starts, or `None` when it falls
/// outside `[MIN_CYCLE_LENGTH, MAX_CYCLE_LENGTH]`.
pub fn plausible_length(later_start: NaiveDate, earlier_start: NaiveDate) -> Option<u32> {
    let candidate = day_diff(later_start, earlier_start);
    (MIN_CYCLE_LENGTH..=MAX_CYCLE_LENGTH)
        .contains(&candidate)
        .then_some(candidate as u32)
}

/// Cycle length for a record about to be created after `previous`.
///
/// The first cycle of an owner has no length.
pub fn estimate_for_new(new_start: NaiveDate, previous: Option<&CycleRecord>) -> Option<u32> {
    previous.and_then(|prev| plausible_length(new_start, prev.start_date))
}

/// Fill `previous.cycle_length` from the start of the record that follows it.
///
/// Only touches a record whose length is still unknown. Returns the value
/// written, if any.
pub fn backfill_previous(previous: &mut CycleRecord, new_start: NaiveDate) -> Option<u32> {
    if previous.cycle_length.is_some() {
        return None;
    }
    let length = plausible_length(new_start, previous.start_date)?;
    previous.cycle_length = Some(length);
    Some(length)
}

/// Lengths that [`bulk_backfill`] would write, without writing them.
pub fn plan_backfill(records: &[CycleRecord]) -> Vec<(RecordId, u32)> {
    let mut ordered: Vec<&CycleRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.start_date);

    ordered
        .windows(2)
        .filter(|w| w[1].cycle_length.is_none())
        .filter_map(|w| plausible_length(w[1].start_date, w[0].start_date).map(|len| (w[1].id, len)))
        .collect()
}

/// Walk one owner's history oldest-first and fill every missing length that
/// can be derived from the record before it. Returns how many were filled.
///
/// Values already set are never changed, so a second run returns 0.
pub fn bulk_backfill(records: &mut [CycleRecord]) -> usize {
    let plan = plan_backfill(records);
    for (id, length) in &plan {
        if let Some(record) = records.iter_mut().find(|r| r.id == *id) {
            record.cycle_length = Some(*length);
        }
    }
    plan.len()
}
