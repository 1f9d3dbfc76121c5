//! File records kept in a JSON document next to the command line tool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use qof_core::{FileId, FileRecord, FileRecordRepositoryTrait, QofError, Result};
use tokio::fs;
use tracing::debug;

pub struct JsonCatalog {
    path: PathBuf,
    records: RwLock<BTreeMap<FileId, FileRecord>>,
}

impl JsonCatalog {
    /// Opens the catalog, starting empty when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let records = match fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<FileRecord> = serde_json::from_slice(&bytes)
                    .map_err(|e| QofError::Other(anyhow::anyhow!("Corrupt catalog {}: {}", path.display(), e)))?;
                list.into_iter().map(|record| (record.file_id, record)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(QofError::Other(e.into())),
        };

        debug!(path = %path.display(), records = records.len(), "Catalog opened");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let snapshot: Vec<FileRecord> = self.records.read().values().cloned().collect();
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| QofError::Other(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| QofError::Other(e.into()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|e| QofError::Other(e.into()))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| QofError::Other(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl FileRecordRepositoryTrait for JsonCatalog {
    async fn save(&self, record: &FileRecord) -> Result<()> {
        self.records.write().insert(record.file_id, record.clone());
        self.persist().await
    }

    async fn get_by_file_id(&self, file_id: FileId) -> Result<Option<FileRecord>> {
        Ok(self.records.read().get(&file_id).cloned())
    }

    async fn delete_by_file_id(&self, file_id: FileId) -> Result<bool> {
        let removed = self.records.write().remove(&file_id).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<FileRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qof_core::{FileOperationRequest, ObjectKey};
    use tempfile::TempDir;

    fn record(file_id: FileId) -> FileRecord {
        let request = FileOperationRequest::new("a.png", "image/png", 8).with_label("scan");
        FileRecord::from_request(&request, file_id, &ObjectKey::compute("/2025", file_id, "a.png"))
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog/qof-catalog.json");

        let catalog = JsonCatalog::open(&path).await.unwrap();
        catalog.save(&record(3)).await.unwrap();
        catalog.save(&record(1)).await.unwrap();
        assert!(path.exists());

        let reopened = JsonCatalog::open(&path).await.unwrap();
        let ids: Vec<FileId> = reopened.list().await.unwrap().iter().map(|r| r.file_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(
            reopened.get_by_file_id(3).await.unwrap().unwrap().file_label.as_deref(),
            Some("scan")
        );

        assert!(reopened.delete_by_file_id(3).await.unwrap());
        assert!(!reopened.delete_by_file_id(3).await.unwrap());
        let again = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(again.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_catalog_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(JsonCatalog::open(&path).await.is_err());
    }
}
