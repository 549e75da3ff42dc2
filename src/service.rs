//! Request-level orchestration around the inference engine.
//!
//! [`CycleService`] is the layer that talks to storage and the optional
//! collaborators, serializes writes per owner, and logs. The engine modules
//! it calls stay pure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::collaborators::{CollaboratorError, MoonPhaseSource, NoMoonPhase, SuggestionSource};
use crate::date_math::CalendarDay;
use crate::error::CycleError;
use crate::models::{CycleRecord, CycleStats, NewCycle, OwnerId, Phase, Prediction};
use crate::store::{CycleStore, StoreError};
use crate::{cycle_length, duplicate, phase, prediction};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// One async mutex per owner, so check-then-insert never interleaves for
/// the same history. Entries are dropped once nobody holds or awaits them.
#[derive(Debug, Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<OwnerId, Arc<AsyncMutex<()>>>>,
}

impl OwnerLocks {
    pub async fn acquire(&self, owner: OwnerId) -> OwnerGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(owner).or_default())
        };
        OwnerGuard {
            guard: Some(lock.lock_owned().await),
            owner,
            locks: self,
        }
    }

    /// Owners with a live entry.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, owner: OwnerId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // the map's own clone is the only one left
        if locks.get(&owner).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&owner);
        }
    }
}

/// Held while one owner's history is being written.
pub struct OwnerGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    owner: OwnerId,
    locks: &'a OwnerLocks,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(self.owner);
    }
}

/// Result of logging a new period.
#[derive(Debug, Clone, PartialEq)]
pub struct AddedCycle {
    pub record: CycleRecord,
    /// Length written onto the record before it, if it was unknown.
    pub backfilled_previous: Option<u32>,
}

pub struct CycleService<S> {
    store: S,
    moon: Box<dyn MoonPhaseSource>,
    suggestions: Option<Box<dyn SuggestionSource>>,
    locks: OwnerLocks,
}

impl<S: CycleStore> CycleService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            moon: Box::new(NoMoonPhase),
            suggestions: None,
            locks: OwnerLocks::default(),
        }
    }

    pub fn with_moon_phase(mut self, source: impl MoonPhaseSource + 'static) -> Self {
        self.moon = Box::new(source);
        self
    }

    pub fn with_suggestions(mut self, source: impl SuggestionSource + 'static) -> Self {
        self.suggestions = Some(Box::new(source));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Log a period for `owner`.
    ///
    /// Rejects a second cycle starting on the same day, derives the cycle
    /// length from the latest existing cycle, snapshots the phase against
    /// `today`, and backfills the latest cycle's length if it was unknown.
    pub async fn add_cycle(
        &self,
        owner: OwnerId,
        cycle: NewCycle,
        today: impl CalendarDay,
    ) -> Result<AddedCycle, ServiceError> {
        let today = today.calendar_day();
        let start = cycle.start_date();

        let moon_phase = match self.moon.phase_on(start).await {
            Ok(name) => Some(name),
            Err(e) => {
                debug!(%owner, day = %start, error = %e, "moon phase unavailable");
                None
            }
        };

        let _guard = self.locks.acquire(owner).await;

        let same_day = self.store.find_by_calendar_day(owner, start).await?;
        duplicate::ensure_unique_start(owner, start, &same_day)?;

        let previous = self.store.find_latest(owner).await?;
        let length = cycle_length::estimate_for_new(start, previous.as_ref());
        let phase = phase::classify(cycle.start_date(), cycle.end_date(), today);
        let record = CycleRecord::new(owner, cycle, length, phase, moon_phase);

        match self.store.insert(record.clone()).await {
            Ok(()) => {}
            Err(StoreError::Conflict { owner, day }) => {
                return Err(CycleError::DuplicateCycle { owner, day }.into())
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            %owner,
            record = %record.id,
            start = %start,
            cycle_length = ?length,
            %phase,
            "cycle added"
        );

        let mut backfilled_previous = None;
        if let Some(mut prev) = previous {
            if let Some(value) = cycle_length::backfill_previous(&mut prev, start) {
                // the new record is already stored; a failed backfill is
                // healed by the next `backfill` run
                match self.store.update_cycle_length(owner, prev.id, value).await {
                    Ok(true) => {
                        debug!(%owner, record = %prev.id, value, "backfilled previous cycle");
                        backfilled_previous = Some(value);
                    }
                    Ok(false) => {}
                    Err(e) => warn!(%owner, record = %prev.id, error = %e, "backfill failed"),
                }
            }
        }

        Ok(AddedCycle {
            record,
            backfilled_previous,
        })
    }

    /// All of `owner`'s cycles, oldest first.
    pub async fn history(&self, owner: OwnerId) -> Result<Vec<CycleRecord>, ServiceError> {
        Ok(self.store.find_all(owner).await?)
    }

    /// Cycles starting in `year`-`month`.
    pub async fn month(
        &self,
        owner: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<Vec<CycleRecord>, ServiceError> {
        let bucket = format!("{year:04}-{month:02}");
        Ok(self.store.find_by_month(owner, &bucket).await?)
    }

    pub async fn predict(&self, owner: OwnerId) -> Result<Prediction, ServiceError> {
        let history = self.store.find_all(owner).await?;
        let prediction = prediction::predict(&history)?;
        debug!(
            %owner,
            next = %prediction.next_period_date,
            average = prediction.average_cycle_length,
            "prediction computed"
        );
        Ok(prediction)
    }

    pub async fn stats(&self, owner: OwnerId) -> Result<CycleStats, ServiceError> {
        let history = self.store.find_all(owner).await?;
        Ok(prediction::cycle_stats(&history))
    }

    /// Fill every derivable missing cycle length in `owner`'s history.
    /// Returns how many records changed.
    pub async fn backfill(&self, owner: OwnerId) -> Result<usize, ServiceError> {
        let history = self.store.find_all(owner).await?;
        let mut updated = 0;
        for (id, value) in cycle_length::plan_backfill(&history) {
            if self.store.update_cycle_length(owner, id, value).await? {
                updated += 1;
            }
        }
        info!(%owner, updated, "backfill finished");
        Ok(updated)
    }

    /// Phase of the latest cycle as of `today`.
    pub async fn current_phase(
        &self,
        owner: OwnerId,
        today: impl CalendarDay,
    ) -> Result<Phase, ServiceError> {
        let latest = self
            .store
            .find_latest(owner)
            .await?
            .ok_or(CycleError::NoHistory)?;
        Ok(phase::classify(latest.start_date, latest.end_date, today))
    }

    /// Ask the suggestion collaborator about `owner`'s current phase.
    pub async fn suggest(
        &self,
        owner: OwnerId,
        zodiac_sign: &str,
        today: impl CalendarDay,
    ) -> Result<String, ServiceError> {
        let source = self
            .suggestions
            .as_ref()
            .ok_or(CollaboratorError::Unavailable("suggestions"))?;
        let phase = self.current_phase(owner, today).await?;
        Ok(source.suggest(zodiac_sign, phase).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SynodicMoonPhase;
    use crate::date_math::add_days;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn period(start: &str) -> NewCycle {
        let start = day(start);
        NewCycle::new(start, add_days(start, 4)).unwrap()
    }

    struct EchoSuggestions;

    #[async_trait]
    impl SuggestionSource for EchoSuggestions {
        async fn suggest(&self, zodiac_sign: &str, phase: Phase) -> Result<String, CollaboratorError> {
            Ok(format!("{zodiac_sign}/{phase}"))
        }
    }

    #[tokio::test]
    async fn first_cycle_has_unknown_length() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();
        let added = service
            .add_cycle(owner, period("2024-01-01"), day("2024-01-02"))
            .await
            .unwrap();
        assert_eq!(added.record.cycle_length, None);
        assert_eq!(added.record.phase, Phase::Menstrual);
        assert_eq!(added.record.month_bucket, "2024-01");
        assert_eq!(added.backfilled_previous, None);
    }

    #[tokio::test]
    async fn second_cycle_gets_length_and_backfills_first() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();
        service
            .add_cycle(owner, period("2024-01-01"), day("2024-01-01"))
            .await
            .unwrap();
        let added = service
            .add_cycle(owner, period("2024-01-29"), day("2024-02-12"))
            .await
            .unwrap();
        assert_eq!(added.record.cycle_length, Some(28));
        // end is Feb 2, today is 10 days later
        assert_eq!(added.record.phase, Phase::Ovulation);
        assert_eq!(added.backfilled_previous, Some(28));

        let history = service.history(owner).await.unwrap();
        assert_eq!(history[0].cycle_length, Some(28));

        let third = service
            .add_cycle(owner, period("2024-02-26"), day("2024-02-26"))
            .await
            .unwrap();
        assert_eq!(third.record.cycle_length, Some(28));
        assert_eq!(third.backfilled_previous, None);
    }

    #[tokio::test]
    async fn implausible_gap_is_stored_as_unknown() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();
        service
            .add_cycle(owner, period("2024-01-01"), day("2024-01-01"))
            .await
            .unwrap();
        let added = service
            .add_cycle(owner, period("2024-05-01"), day("2024-05-01"))
            .await
            .unwrap();
        assert_eq!(added.record.cycle_length, None);
        assert_eq!(added.backfilled_previous, None);
    }

    #[tokio::test]
    async fn same_day_resubmission_is_rejected() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();
        let start = day("2024-03-05");
        let morning = NewCycle::new(start.and_hms_opt(7, 0, 0).unwrap(), add_days(start, 5)).unwrap();
        let night = NewCycle::new(start.and_hms_opt(23, 0, 0).unwrap(), add_days(start, 3)).unwrap();

        service.add_cycle(owner, morning, start).await.unwrap();
        let err = service.add_cycle(owner, night, start).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Cycle(CycleError::DuplicateCycle { .. })
        ));
        assert_eq!(service.history(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_same_day_adds_store_one_record() {
        let service = Arc::new(CycleService::new(MemoryStore::new()));
        let owner = OwnerId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .add_cycle(owner, period("2024-03-05"), day("2024-03-05"))
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(service.store().len().await, 1);
    }

    #[tokio::test]
    async fn owner_locks_are_pruned_after_release() {
        let locks = Arc::new(OwnerLocks::default());
        let owner = OwnerId::new();

        let held = locks.acquire(owner).await;
        let other = locks.acquire(OwnerId::new()).await;
        assert_eq!(locks.tracked(), 2);
        drop(other);
        assert_eq!(locks.tracked(), 1);

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(owner).await;
            })
        };
        tokio::task::yield_now().await;
        drop(held);
        // the waiter still shares the entry, so it survives the first release
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn adds_leave_no_lock_entries_behind() {
        let service = CycleService::new(MemoryStore::new());
        for _ in 0..3 {
            service
                .add_cycle(OwnerId::new(), period("2024-03-05"), day("2024-03-05"))
                .await
                .unwrap();
        }
        assert_eq!(service.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn reversed_submission_never_reaches_the_store() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();

        let submitted =
            serde_json::from_str::<NewCycle>(r#"{"start_date":"2024-05-10","end_date":"2024-05-01"}"#);
        assert!(submitted.is_err());
        let direct = NewCycle::new(day("2024-05-10"), day("2024-05-01"));
        assert!(matches!(direct, Err(CycleError::InvalidDateRange { .. })));

        let accepted: NewCycle =
            serde_json::from_str(r#"{"start_date":"2024-05-01","end_date":"2024-05-10"}"#).unwrap();
        let added = service
            .add_cycle(owner, accepted, day("2024-05-01"))
            .await
            .unwrap();
        assert_eq!(added.record.period_length, 10);
        assert!(added.record.start_date <= added.record.end_date);
        assert_eq!(service.history(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prediction_without_history_fails() {
        let service = CycleService::new(MemoryStore::new());
        let err = service.predict(OwnerId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Cycle(CycleError::NoHistory)));
    }

    #[tokio::test]
    async fn prediction_uses_stored_history() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();
        for start in ["2024-01-01", "2024-01-29", "2024-02-28", "2024-03-26"] {
            service.add_cycle(owner, period(start), day(start)).await.unwrap();
        }
        // lengths: 28 (backfilled), 28, 30, 27 -> 28.25
        let prediction = service.predict(owner).await.unwrap();
        assert_eq!(prediction.average_cycle_length, 28);
        assert_eq!(prediction.next_period_date, day("2024-04-23"));
        assert_eq!(prediction.fertile_window.end, add_days(prediction.ovulation_date, 1));
    }

    #[tokio::test]
    async fn bulk_backfill_heals_seeded_history() {
        let owner = OwnerId::new();
        let seeded = ["2024-01-01", "2024-01-29", "2024-02-26"]
            .into_iter()
            .map(|s| CycleRecord::new(owner, period(s), None, Phase::Menstrual, None))
            .collect();
        let service = CycleService::new(MemoryStore::with_records(seeded));

        assert_eq!(service.backfill(owner).await.unwrap(), 2);
        assert_eq!(service.backfill(owner).await.unwrap(), 0);
        let lengths: Vec<Option<u32>> = service
            .history(owner)
            .await
            .unwrap()
            .iter()
            .map(|r| r.cycle_length)
            .collect();
        assert_eq!(lengths, vec![None, Some(28), Some(28)]);
    }

    #[tokio::test]
    async fn moon_phase_is_best_effort() {
        let owner = OwnerId::new();
        let without = CycleService::new(MemoryStore::new());
        let added = without
            .add_cycle(owner, period("2024-01-25"), day("2024-01-25"))
            .await
            .unwrap();
        assert_eq!(added.record.moon_phase, None);

        let with = CycleService::new(MemoryStore::new()).with_moon_phase(SynodicMoonPhase);
        let added = with
            .add_cycle(owner, period("2024-01-25"), day("2024-01-25"))
            .await
            .unwrap();
        assert_eq!(added.record.moon_phase.as_deref(), Some("Full Moon"));
    }

    #[tokio::test]
    async fn month_query_uses_bucket() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();
        for start in ["2024-01-01", "2024-01-29", "2024-02-26"] {
            service.add_cycle(owner, period(start), day(start)).await.unwrap();
        }
        assert_eq!(service.month(owner, 2024, 1).await.unwrap().len(), 2);
        assert_eq!(service.month(owner, 2024, 2).await.unwrap().len(), 1);
        assert!(service.month(owner, 2024, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suggestion_gets_current_phase() {
        let owner = OwnerId::new();
        let service = CycleService::new(MemoryStore::new()).with_suggestions(EchoSuggestions);
        service
            .add_cycle(owner, period("2024-01-01"), day("2024-01-01"))
            .await
            .unwrap();

        // period ends Jan 5; Jan 30 is 25 days later
        let text = service.suggest(owner, "leo", day("2024-01-30")).await.unwrap();
        assert_eq!(text, "leo/luteal");
    }

    #[tokio::test]
    async fn suggestion_without_source_is_unavailable() {
        let service = CycleService::new(MemoryStore::new());
        let err = service
            .suggest(OwnerId::new(), "leo", day("2024-01-30"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Collaborator(_)));
    }

    #[tokio::test]
    async fn stats_reflect_history() {
        let service = CycleService::new(MemoryStore::new());
        let owner = OwnerId::new();
        for start in ["2024-01-01", "2024-01-29"] {
            service.add_cycle(owner, period(start), day(start)).await.unwrap();
        }
        let stats = service.stats(owner).await.unwrap();
        assert_eq!(stats.total_cycles, 2);
        assert_eq!(stats.avg_cycle_length, Some(28.0));
        assert_eq!(stats.avg_period_length, Some(5.0));
    }
}
