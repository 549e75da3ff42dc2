//! Optional services the engine can consult but never depends on.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::Phase;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{0} is not available")]
    Unavailable(&'static str),
    #[error("{service} failed: {reason}")]
    Failed {
        service: &'static str,
        reason: String,
    },
}

/// Describes the moon on a given day. Best effort: callers store `None` on
/// any error.
#[async_trait]
pub trait MoonPhaseSource: Send + Sync {
    async fn phase_on(&self, day: NaiveDate) -> Result<String, CollaboratorError>;
}

/// Free-text advice for a zodiac sign in a cycle phase.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(&self, zodiac_sign: &str, phase: Phase) -> Result<String, CollaboratorError>;
}

/// Moon source for deployments without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMoonPhase;

#[async_trait]
impl MoonPhaseSource for NoMoonPhase {
    async fn phase_on(&self, _day: NaiveDate) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Unavailable("moon phase"))
    }
}

/// Offline approximation from the mean synodic month.
///
/// Good to about a day, which is all a descriptive label needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynodicMoonPhase;

const SYNODIC_MONTH: f64 = 29.530_588_853;
/// New moon of 2000-01-06 18:14 UTC, as a day offset from that date's midnight.
const EPOCH_OFFSET: f64 = 0.76;

const PHASE_NAMES: [&str; 8] = [
    "New Moon",
    "Waxing Crescent",
    "First Quarter",
    "Waxing Gibbous",
    "Full Moon",
    "Waning Gibbous",
    "Last Quarter",
    "Waning Crescent",
];

impl SynodicMoonPhase {
    /// Moon age in days at noon of `day`.
    pub fn age(day: NaiveDate) -> f64 {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 6).unwrap_or_default();
        let elapsed = crate::date_math::day_diff(day, epoch) as f64 + 0.5 - EPOCH_OFFSET;
        elapsed.rem_euclid(SYNODIC_MONTH)
    }

    pub fn name(day: NaiveDate) -> &'static str {
        let octant = (Self::age(day) / SYNODIC_MONTH * 8.0 + 0.5).floor() as usize % 8;
        PHASE_NAMES[octant]
    }
}

#[async_trait]
impl MoonPhaseSource for SynodicMoonPhase {
    async fn phase_on(&self, day: NaiveDate) -> Result<String, CollaboratorError> {
        Ok(Self::name(day).to_string())
    }
}
