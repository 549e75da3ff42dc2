use crate::date_math::add_days;
use crate::error::CycleError;
use crate::models::{CycleRecord, CycleStats, FertileWindow, Prediction};

/// How many of the most recent cycles feed the average.
pub const RECENT_WINDOW: usize = 6;
/// Used when no recent cycle has a usable length.
pub const DEFAULT_CYCLE_LENGTH: u32 = 28;
const DEFAULT_PERIOD_LENGTH: f64 = 5.0;
/// Ovulation is placed this many days before the next period.
pub const LUTEAL_DAYS: i64 = 14;
const FERTILE_DAYS_BEFORE: i64 = 5;
const FERTILE_DAYS_AFTER: i64 = 1;

/// Predict the next period and fertile window from one owner's history.
///
/// Only lengths strictly between 20 and 40 days count toward the average,
/// which is narrower than what storage accepts.
pub fn predict(history: &[CycleRecord]) -> Result<Prediction, CycleError> {
    let mut newest_first: Vec<&CycleRecord> = history.iter().collect();
    newest_first.sort_by(|a, b| b.start_date.cmp(&a.start_date));

    let last = newest_first.first().ok_or(CycleError::NoHistory)?;
    let recent = &newest_first[..newest_first.len().min(RECENT_WINDOW)];

    let lengths: Vec<f64> = recent
        .iter()
        .filter_map(|c| c.cycle_length)
        .filter(|len| *len > 20 && *len < 40)
        .map(f64::from)
        .collect();

    let average_cycle_length = if lengths.is_empty() {
        DEFAULT_CYCLE_LENGTH
    } else {
        mean(&lengths).round() as u32
    };

    let period_lengths: Vec<f64> = recent.iter().map(|c| f64::from(c.period_length)).collect();
    let avg_period = if period_lengths.is_empty() {
        DEFAULT_PERIOD_LENGTH
    } else {
        mean(&period_lengths)
    };

    let next_period_date = add_days(last.start_date, i64::from(average_cycle_length));
    let expected_period_end =
        add_days(next_period_date, (avg_period.round() - 1.0).max(0.0) as i64);
    let ovulation_date = add_days(next_period_date, -LUTEAL_DAYS);

    Ok(Prediction {
        next_period_date,
        expected_period_end,
        ovulation_date,
        fertile_window: FertileWindow {
            start: add_days(ovulation_date, -FERTILE_DAYS_BEFORE),
            end: add_days(ovulation_date, FERTILE_DAYS_AFTER),
        },
        average_cycle_length,
    })
}

/// Compute cycle statistics over the stored history.
pub fn cycle_stats(history: &[CycleRecord]) -> CycleStats {
    let Some(last) = history.iter().max_by_key(|c| c.start_date) else {
        return CycleStats {
            total_cycles: 0,
            avg_cycle_length: None,
            avg_period_length: None,
            shortest_cycle: None,
            longest_cycle: None,
            last_period_start: None,
            last_period_end: None,
        };
    };

    let cycle_lengths: Vec<u32> = history.iter().filter_map(|c| c.cycle_length).collect();
    let period_lengths: Vec<f64> = history.iter().map(|c| f64::from(c.period_length)).collect();

    CycleStats {
        total_cycles: history.len(),
        avg_cycle_length: if cycle_lengths.is_empty() {
            None
        } else {
            Some(cycle_lengths.iter().sum::<u32>() as f32 / cycle_lengths.len() as f32)
        },
        avg_period_length: Some(mean(&period_lengths) as f32),
        shortest_cycle: cycle_lengths.iter().copied().min(),
        longest_cycle: cycle_lengths.iter().copied().max(),
        last_period_start: Some(last.start_date),
        last_period_end: Some(last.end_date),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
