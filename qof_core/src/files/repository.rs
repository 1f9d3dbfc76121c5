use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::models::{FileId, FileRecord};
use crate::error::Result;

/// Persistence of file metadata. Only the extension hooks talk to it.
#[async_trait]
pub trait FileRecordRepositoryTrait: Send + Sync {
    /// Inserts or replaces the record with the same file id.
    async fn save(&self, record: &FileRecord) -> Result<()>;
    async fn get_by_file_id(&self, file_id: FileId) -> Result<Option<FileRecord>>;
    /// Returns whether a record was removed.
    async fn delete_by_file_id(&self, file_id: FileId) -> Result<bool>;
    /// All records ordered by file id.
    async fn list(&self) -> Result<Vec<FileRecord>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFileRecordRepository {
    records: Arc<RwLock<HashMap<FileId, FileRecord>>>,
}

impl MemoryFileRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl FileRecordRepositoryTrait for MemoryFileRecordRepository {
    async fn save(&self, record: &FileRecord) -> Result<()> {
        self.records.write().insert(record.file_id, record.clone());
        Ok(())
    }

    async fn get_by_file_id(&self, file_id: FileId) -> Result<Option<FileRecord>> {
        Ok(self.records.read().get(&file_id).cloned())
    }

    async fn delete_by_file_id(&self, file_id: FileId) -> Result<bool> {
        Ok(self.records.write().remove(&file_id).is_some())
    }

    async fn list(&self) -> Result<Vec<FileRecord>> {
        let mut records: Vec<FileRecord> = self.records.read().values().cloned().collect();
        records.sort_by_key(|record| record.file_id);
        Ok(records)
    }
}
