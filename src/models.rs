use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::date_math::{self, CalendarDay};
use crate::error::CycleError;

/// Owner of a cycle history, as handed over by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Menstrual,
    Follicular,
    Ovulation,
    Luteal,
}

impl Phase {
    /// Lowercase label handed to downstream consumers.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Menstrual => "menstrual",
            Phase::Follicular => "follicular",
            Phase::Ovulation => "ovulation",
            Phase::Luteal => "luteal",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "menstrual" => Ok(Phase::Menstrual),
            "follicular" => Ok(Phase::Follicular),
            "ovulation" => Ok(Phase::Ovulation),
            "luteal" => Ok(Phase::Luteal),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}

/// A period as submitted, before any derived fields exist.
///
/// Only constructible through [`NewCycle::new`], so `start_date <= end_date`
/// always holds. Deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNewCycle")]
pub struct NewCycle {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Deserialize)]
struct RawNewCycle {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl TryFrom<RawNewCycle> for NewCycle {
    type Error = CycleError;

    fn try_from(raw: RawNewCycle) -> Result<Self, Self::Error> {
        Self::new(raw.start_date, raw.end_date)
    }
}

impl NewCycle {
    /// Normalizes both ends to calendar days and rejects `start > end`.
    pub fn new(start: impl CalendarDay, end: impl CalendarDay) -> Result<Self, CycleError> {
        let start_date = start.calendar_day();
        let end_date = end.calendar_day();
        if start_date > end_date {
            return Err(CycleError::InvalidDateRange {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Inclusive of both endpoints.
    pub fn period_length(&self) -> u32 {
        period_length(self.start_date, self.end_date)
    }
}

/// Inclusive day count of `[start, end]`. Callers guarantee `start <= end`.
pub(crate) fn period_length(start: NaiveDate, end: NaiveDate) -> u32 {
    debug_assert!(start <= end, "reversed period {start}..{end}");
    (date_math::day_diff(end, start) + 1) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: RecordId,
    pub owner_id: OwnerId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_length: u32,
    pub cycle_length: Option<u32>,
    pub phase: Phase,
    pub moon_phase: Option<String>,
    pub month_bucket: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CycleRecord {
    /// Fresh record for `owner_id` from a validated submission.
    pub fn new(
        owner_id: OwnerId,
        cycle: NewCycle,
        cycle_length: Option<u32>,
        phase: Phase,
        moon_phase: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            owner_id,
            start_date: cycle.start_date,
            end_date: cycle.end_date,
            period_length: cycle.period_length(),
            cycle_length,
            phase,
            moon_phase,
            month_bucket: date_math::month_bucket(cycle.start_date),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FertileWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub next_period_date: NaiveDate,
    pub expected_period_end: NaiveDate,
    pub ovulation_date: NaiveDate,
    pub fertile_window: FertileWindow,
    pub average_cycle_length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    pub total_cycles: usize,
    pub avg_cycle_length: Option<f32>,
    pub avg_period_length: Option<f32>,
    pub shortest_cycle: Option<u32>,
    pub longest_cycle: Option<u32>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
}
