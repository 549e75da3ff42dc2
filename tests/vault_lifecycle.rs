use chrono::NaiveDate;

use luna_cycles::collaborators::SynodicMoonPhase;
use luna_cycles::crypto::KdfParams;
use luna_cycles::date_math::add_days;
use luna_cycles::store::VaultStore;
use luna_cycles::{CycleError, CycleService, NewCycle, OwnerId, Phase, ServiceError};

const FAST: KdfParams = KdfParams {
    memory_kib: 1024,
    iterations: 1,
};

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn period(start: &str, days: i64) -> NewCycle {
    let start = day(start);
    NewCycle::new(start, add_days(start, days - 1)).unwrap()
}

#[tokio::test]
async fn history_survives_reopen_and_predicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = VaultStore::path_in(dir.path()).unwrap();
    let owner = OwnerId::new();
    let other = OwnerId::new();

    {
        let store = VaultStore::create(&path, "correct horse", FAST).await.unwrap();
        let service = CycleService::new(store).with_moon_phase(SynodicMoonPhase);

        // gaps: 65 (too long to keep), 30, 27, 28
        for (start, len) in [
            ("2024-01-01", 5),
            ("2024-03-06", 4),
            ("2024-04-05", 5),
            ("2024-05-02", 6),
            ("2024-05-30", 5),
        ] {
            service
                .add_cycle(owner, period(start, len), day(start))
                .await
                .unwrap();
        }
        service
            .add_cycle(other, period("2024-05-30", 5), day("2024-05-30"))
            .await
            .unwrap();
    }

    let store = VaultStore::open(&path, "correct horse", FAST).await.unwrap();
    let service = CycleService::new(store);

    let history = service.history(owner).await.unwrap();
    let lengths: Vec<Option<u32>> = history.iter().map(|r| r.cycle_length).collect();
    // the first record never gets a length: the gap after it was implausible
    assert_eq!(lengths, vec![None, Some(30), Some(30), Some(27), Some(28)]);
    assert!(history.iter().all(|r| r.moon_phase.is_some()));
    assert!(history.iter().all(|r| r.phase == Phase::Menstrual));

    let prediction = service.predict(owner).await.unwrap();
    // round((30 + 30 + 27 + 28) / 4)
    assert_eq!(prediction.average_cycle_length, 29);
    assert_eq!(prediction.next_period_date, day("2024-06-28"));
    assert_eq!(prediction.expected_period_end, day("2024-07-02"));
    assert_eq!(prediction.ovulation_date, day("2024-06-14"));
    assert_eq!(prediction.fertile_window.start, day("2024-06-09"));
    assert_eq!(prediction.fertile_window.end, day("2024-06-15"));

    // nothing left to heal
    assert_eq!(service.backfill(owner).await.unwrap(), 0);

    let other_history = service.history(other).await.unwrap();
    assert_eq!(other_history.len(), 1);
    assert_eq!(other_history[0].cycle_length, None);
}

#[tokio::test]
async fn duplicate_start_is_rejected_through_the_vault() {
    let dir = tempfile::tempdir().unwrap();
    let path = VaultStore::path_in(dir.path()).unwrap();
    let owner = OwnerId::new();
    let service = CycleService::new(VaultStore::create(&path, "pw", FAST).await.unwrap());

    service
        .add_cycle(owner, period("2024-02-10", 5), day("2024-02-10"))
        .await
        .unwrap();
    let err = service
        .add_cycle(owner, period("2024-02-10", 3), day("2024-02-11"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Cycle(CycleError::DuplicateCycle { .. })
    ));
}

#[tokio::test]
async fn reversed_dates_never_reach_the_store() {
    let err = NewCycle::new(day("2024-02-10"), day("2024-02-01")).unwrap_err();
    assert_eq!(
        err,
        CycleError::InvalidDateRange {
            start: day("2024-02-10"),
            end: day("2024-02-01"),
        }
    );
}
