//! JSON file-based storage implementation.

use super::{ChangeSet, Record, RecordKey, Result, Storage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// JSON file storage format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StorageFormat {
    version: u32,
    records: Vec<Record>,
}

/// Storage backend that persists all records to a single JSON file.
///
/// The whole file is rewritten on every change through a temporary file
/// and a rename.
pub struct JsonFileStorage {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<RecordKey, Record>>>,
}

impl JsonFileStorage {
    /// Create a new JSON file storage.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<BTreeMap<RecordKey, Record>> {
        debug!("Loading records from {:?}", self.path);

        if !self.path.exists() {
            info!("Storage file does not exist, starting empty");
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path).await?;
        if contents.trim().is_empty() {
            info!("Storage file is empty, starting empty");
            return Ok(BTreeMap::new());
        }

        let storage: StorageFormat = serde_json::from_str(&contents)?;
        let records: BTreeMap<RecordKey, Record> = storage
            .records
            .into_iter()
            .map(|record| (record.key(), record))
            .collect();

        info!("Loaded {} records from storage", records.len());
        Ok(records)
    }

    async fn write_file(&self, records: &BTreeMap<RecordKey, Record>) -> Result<()> {
        debug!("Writing {} records to {:?}", records.len(), self.path);

        let storage = StorageFormat {
            version: 1,
            records: records.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&storage)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Write to temporary file first, then rename (atomic operation)
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load_all(&self) -> Result<Vec<Record>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache
            .as_ref()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // Hold the lock across the write so concurrent changes serialize
        let mut cache = self.cache.lock().await;
        let mut records = match cache.take() {
            Some(records) => records,
            None => self.read_file().await?,
        };

        for record in &changes.upserts {
            records.insert(record.key(), record.clone());
        }
        for key in &changes.deletes {
            records.remove(key);
        }

        // On failure the cache stays empty and the next call re-reads the file
        self.write_file(&records).await?;
        *cache = Some(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordKind;
    use tardet_types::{AlertType, Company, VendorKind};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn company(name: &str) -> Company {
        Company {
            id: Uuid::new_v4(),
            name: name.to_string(),
            vendor: VendorKind::Dahua,
            stream_scheme: None,
            stream_path: None,
        }
    }

    #[tokio::test]
    async fn test_empty_storage() {
        let dir = tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("store.json"));

        let records = storage.load_all().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let storage = JsonFileStorage::new(&path);

        let company = company("Dahua");
        let alert_type = AlertType {
            id: Uuid::new_v4(),
            name: "intrusion".to_string(),
            idx: 1,
        };
        storage
            .apply(
                &ChangeSet::default()
                    .upsert(Record::Company(company.clone()))
                    .upsert(Record::AlertType(alert_type.clone())),
            )
            .await
            .unwrap();

        // A fresh instance reads the file back
        let reopened = JsonFileStorage::new(&path);
        let records = reopened.load_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.contains(&Record::Company(company)));
        assert!(records.contains(&Record::AlertType(alert_type)));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_delete_record() {
        let dir = tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("store.json"));

        let keep = company("Keep");
        let remove = company("Remove");
        storage
            .apply(
                &ChangeSet::default()
                    .upsert(Record::Company(keep.clone()))
                    .upsert(Record::Company(remove.clone())),
            )
            .await
            .unwrap();

        storage
            .apply(&ChangeSet::default().delete(RecordKind::Company, remove.id))
            .await
            .unwrap();

        let records = storage.load_all().await.unwrap();
        assert_eq!(records, vec![Record::Company(keep)]);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let dir = tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested").join("store.json"));

        let mut c = company("Before");
        storage
            .apply(&ChangeSet::default().upsert(Record::Company(c.clone())))
            .await
            .unwrap();
        c.name = "After".to_string();
        c.stream_path = Some("/live".to_string());
        storage
            .apply(&ChangeSet::default().upsert(Record::Company(c.clone())))
            .await
            .unwrap();

        let records = storage.load_all().await.unwrap();
        assert_eq!(records, vec![Record::Company(c)]);
    }
}
