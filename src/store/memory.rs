use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::{apply_cycle_length, check_insert, owned, sorted_by_start, CycleStore, StoreError};
use crate::models::{CycleRecord, OwnerId, RecordId};

/// Process-local store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<CycleRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records, bypassing the uniqueness check.
    pub fn with_records(records: Vec<CycleRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CycleStore for MemoryStore {
    async fn find_all(&self, owner: OwnerId) -> Result<Vec<CycleRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(sorted_by_start(owned(&records, owner).cloned().collect()))
    }

    async fn find_latest(&self, owner: OwnerId) -> Result<Option<CycleRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(owned(&records, owner).max_by_key(|r| r.start_date).cloned())
    }

    async fn find_by_calendar_day(
        &self,
        owner: OwnerId,
        day: NaiveDate,
    ) -> Result<Vec<CycleRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(owned(&records, owner)
            .filter(|r| r.start_date == day)
            .cloned()
            .collect())
    }

    async fn find_by_month(
        &self,
        owner: OwnerId,
        bucket: &str,
    ) -> Result<Vec<CycleRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(sorted_by_start(
            owned(&records, owner)
                .filter(|r| r.month_bucket == bucket)
                .cloned()
                .collect(),
        ))
    }

    async fn insert(&self, record: CycleRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        check_insert(&records, &record)?;
        records.push(record);
        Ok(())
    }

    async fn update_cycle_length(
        &self,
        owner: OwnerId,
        id: RecordId,
        value: u32,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        apply_cycle_length(&mut records, owner, id, value)
    }
}
