use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::{apply_cycle_length, check_insert, owned, sorted_by_start, CycleStore, StoreError};
use crate::crypto::{self, KdfParams};
use crate::models::{CycleRecord, OwnerId, RecordId};

/// File name of the vault inside the data directory.
pub const VAULT_FILE: &str = "cycles.luna";

/// Plaintext layout of a vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultData {
    pub records: Vec<CycleRecord>,
}

/// Passphrase-encrypted single-file store.
///
/// The whole vault is decrypted into memory on open and re-sealed after
/// every write.
pub struct VaultStore {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    kdf: KdfParams,
    data: Mutex<VaultData>,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("path", &self.path)
            .field("kdf", &self.kdf)
            .finish_non_exhaustive()
    }
}

impl VaultStore {
    /// Vault path inside `data_dir`, creating the directory if needed.
    pub fn path_in(data_dir: &Path) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join(VAULT_FILE))
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Write an empty vault at `path`, replacing any existing file.
    pub async fn create(
        path: impl Into<PathBuf>,
        passphrase: &str,
        kdf: KdfParams,
    ) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            passphrase: Zeroizing::new(passphrase.to_string()),
            kdf,
            data: Mutex::new(VaultData::default()),
        };
        store.persist(&VaultData::default()).await?;
        tracing::info!(path = %store.path.display(), "created vault");
        Ok(store)
    }

    /// Decrypt an existing vault. `kdf` only applies to later writes.
    pub async fn open(
        path: impl Into<PathBuf>,
        passphrase: &str,
        kdf: KdfParams,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let sealed = tokio::fs::read(&path).await?;
        let passphrase = Zeroizing::new(passphrase.to_string());
        let key_material = passphrase.clone();
        let plaintext = Zeroizing::new(
            tokio::task::spawn_blocking(move || crypto::open(&key_material, &sealed)).await??,
        );
        let data: VaultData = serde_json::from_slice(&plaintext)?;
        tracing::debug!(path = %path.display(), records = data.records.len(), "opened vault");
        Ok(Self {
            path,
            passphrase,
            kdf,
            data: Mutex::new(data),
        })
    }

    /// Delete the vault file permanently.
    pub async fn wipe(path: &Path) -> Result<(), StoreError> {
        if path.exists() {
            tokio::fs::remove_file(path).await?;
            tracing::warn!(path = %path.display(), "vault wiped");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decrypted vault contents as pretty JSON.
    pub async fn export(&self) -> Result<String, StoreError> {
        let data = self.data.lock().await;
        Ok(serde_json::to_string_pretty(&*data)?)
    }

    async fn persist(&self, data: &VaultData) -> Result<(), StoreError> {
        let json = Zeroizing::new(serde_json::to_vec(data)?);
        let passphrase = self.passphrase.clone();
        let kdf = self.kdf;
        let sealed =
            tokio::task::spawn_blocking(move || crypto::seal(&passphrase, kdf, &json)).await??;

        // write then rename; the vault file is never half-written
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, sealed).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CycleStore for VaultStore {
    async fn find_all(&self, owner: OwnerId) -> Result<Vec<CycleRecord>, StoreError> {
        let data = self.data.lock().await;
        Ok(sorted_by_start(owned(&data.records, owner).cloned().collect()))
    }

    async fn find_latest(&self, owner: OwnerId) -> Result<Option<CycleRecord>, StoreError> {
        let data = self.data.lock().await;
        Ok(owned(&data.records, owner)
            .max_by_key(|r| r.start_date)
            .cloned())
    }

    async fn find_by_calendar_day(
        &self,
        owner: OwnerId,
        day: NaiveDate,
    ) -> Result<Vec<CycleRecord>, StoreError> {
        let data = self.data.lock().await;
        Ok(owned(&data.records, owner)
            .filter(|r| r.start_date == day)
            .cloned()
            .collect())
    }

    async fn find_by_month(
        &self,
        owner: OwnerId,
        bucket: &str,
    ) -> Result<Vec<CycleRecord>, StoreError> {
        let data = self.data.lock().await;
        Ok(sorted_by_start(
            owned(&data.records, owner)
                .filter(|r| r.month_bucket == bucket)
                .cloned()
                .collect(),
        ))
    }

    async fn insert(&self, record: CycleRecord) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        check_insert(&data.records, &record)?;
        data.records.push(record);
        if let Err(e) = self.persist(&data).await {
            data.records.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn update_cycle_length(
        &self,
        owner: OwnerId,
        id: RecordId,
        value: u32,
    ) -> Result<bool, StoreError> {
        let mut data = self.data.lock().await;
        let before = data
            .records
            .iter()
            .position(|r| r.owner_id == owner && r.id == id)
            .map(|i| (i, data.records[i].clone()));
        let changed = apply_cycle_length(&mut data.records, owner, id, value)?;
        if changed {
            if let Err(e) = self.persist(&data).await {
                if let Some((i, previous)) = before {
                    data.records[i] = previous;
                }
                return Err(e);
            }
        }
        Ok(changed)
    }
}
