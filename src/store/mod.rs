//! Storage boundary for cycle records.
//!
//! Everything the engine persists goes through [`CycleStore`]. Two backends
//! ship with the crate: an in-process [`MemoryStore`] and the encrypted
//! single-file [`VaultStore`].

mod memory;
mod vault;

pub use memory::MemoryStore;
pub use vault::{VaultData, VaultStore};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::crypto::CryptoError;
use crate::models::{CycleRecord, OwnerId, RecordId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("owner {owner} already has a cycle starting on {day}")]
    Conflict { owner: OwnerId, day: NaiveDate },
    #[error("record {0} not found")]
    NotFound(RecordId),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Per-owner persistence operations. Implementations never mix owners.
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// All records of `owner`, oldest start first.
    async fn find_all(&self, owner: OwnerId) -> Result<Vec<CycleRecord>, StoreError>;

    /// The record with the latest start date.
    async fn find_latest(&self, owner: OwnerId) -> Result<Option<CycleRecord>, StoreError>;

    async fn find_by_calendar_day(
        &self,
        owner: OwnerId,
        day: NaiveDate,
    ) -> Result<Vec<CycleRecord>, StoreError>;

    /// Records whose `month_bucket` equals `bucket` (`YYYY-MM`).
    async fn find_by_month(
        &self,
        owner: OwnerId,
        bucket: &str,
    ) -> Result<Vec<CycleRecord>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the owner already has a
    /// record starting on the same day.
    async fn insert(&self, record: CycleRecord) -> Result<(), StoreError>;

    /// Set a record's cycle length if it is still unknown. Returns whether
    /// anything changed.
    async fn update_cycle_length(
        &self,
        owner: OwnerId,
        id: RecordId,
        value: u32,
    ) -> Result<bool, StoreError>;
}

/// Records belonging to `owner`.
pub(crate) fn owned<'a>(
    records: &'a [CycleRecord],
    owner: OwnerId,
) -> impl Iterator<Item = &'a CycleRecord> + 'a {
    records.iter().filter(move |r| r.owner_id == owner)
}

pub(crate) fn sorted_by_start(mut records: Vec<CycleRecord>) -> Vec<CycleRecord> {
    records.sort_by_key(|r| r.start_date);
    records
}

pub(crate) fn check_insert(records: &[CycleRecord], record: &CycleRecord) -> Result<(), StoreError> {
    let clash = owned(records, record.owner_id).any(|r| r.start_date == record.start_date);
    if clash {
        return Err(StoreError::Conflict {
            owner: record.owner_id,
            day: record.start_date,
        });
    }
    Ok(())
}

pub(crate) fn apply_cycle_length(
    records: &mut [CycleRecord],
    owner: OwnerId,
    id: RecordId,
    value: u32,
) -> Result<bool, StoreError> {
    let record = records
        .iter_mut()
        .find(|r| r.owner_id == owner && r.id == id)
        .ok_or(StoreError::NotFound(id))?;
    if record.cycle_length.is_some() {
        return Ok(false);
    }
    record.cycle_length = Some(value);
    record.updated_at = Utc::now();
    Ok(true)
}
