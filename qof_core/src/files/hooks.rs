//! Extension points around every file operation.
//!
//! The orchestrator never touches metadata storage itself. It asks a
//! [`FileExtension`] for records and tells it what happened.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::models::{FileId, FileOperationRequest, FileRecord, ObjectKey};
use super::repository::FileRecordRepositoryTrait;
use crate::error::{QofError, Result};

#[async_trait]
pub trait FileExtension: Send + Sync {
    async fn get_record(&self, file_id: FileId) -> Result<Option<FileRecord>>;

    /// Runs after validation and before any byte is stored. May reject the
    /// upload or adjust the request metadata.
    async fn before_upload(&self, _request: &mut FileOperationRequest, _key: &ObjectKey) -> Result<()> {
        Ok(())
    }

    /// Runs only after the backend confirmed the upload.
    async fn after_upload(&self, request: &FileOperationRequest, key: &ObjectKey) -> Result<FileRecord>;

    async fn before_download(&self, _record: &FileRecord) -> Result<()> {
        Ok(())
    }

    async fn after_download(&self, _record: &FileRecord) -> Result<()> {
        Ok(())
    }

    /// `false` vetoes the delete.
    async fn before_delete(&self, _record: &FileRecord) -> Result<bool> {
        Ok(true)
    }

    /// Called with the outcome of the backend delete.
    async fn after_delete(&self, _record: &FileRecord, deleted: bool) -> Result<bool> {
        Ok(deleted)
    }
}

/// Keeps records in a [`FileRecordRepositoryTrait`]: saved after upload,
/// removed before the backend delete.
#[derive(Clone)]
pub struct DefaultFileExtension {
    repository: Arc<dyn FileRecordRepositoryTrait>,
}

impl DefaultFileExtension {
    pub fn new(repository: Arc<dyn FileRecordRepositoryTrait>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn FileRecordRepositoryTrait> {
        &self.repository
    }
}

#[async_trait]
impl FileExtension for DefaultFileExtension {
    async fn get_record(&self, file_id: FileId) -> Result<Option<FileRecord>> {
        self.repository.get_by_file_id(file_id).await
    }

    async fn after_upload(&self, request: &FileOperationRequest, key: &ObjectKey) -> Result<FileRecord> {
        let file_id = request
            .file_id
            .ok_or_else(|| QofError::Other(anyhow::anyhow!("Upload finished without a file id")))?;

        let record = FileRecord::from_request(request, file_id, key);
        self.repository.save(&record).await?;
        info!(file_id, key = %key, "File record saved");
        Ok(record)
    }

    async fn before_delete(&self, record: &FileRecord) -> Result<bool> {
        if !self.repository.delete_by_file_id(record.file_id).await? {
            debug!(file_id = record.file_id, "File record already removed");
        }
        Ok(true)
    }

    async fn after_delete(&self, record: &FileRecord, deleted: bool) -> Result<bool> {
        if !deleted {
            warn!(
                file_id = record.file_id,
                key = %record.object_key,
                "Stored object could not be removed after its record was deleted"
            );
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::repository::MemoryFileRecordRepository;

    #[tokio::test]
    async fn test_default_extension_round_trip() {
        let repo = Arc::new(MemoryFileRecordRepository::new());
        let extension = DefaultFileExtension::new(repo.clone());

        let request = FileOperationRequest::new("a.png", "image/png", 8).with_file_id(11);
        let key = ObjectKey::compute("/img", 11, "a.png");
        let record = extension.after_upload(&request, &key).await.unwrap();
        assert_eq!(record.file_id, 11);
        assert_eq!(repo.len(), 1);

        let found = extension.get_record(11).await.unwrap().unwrap();
        assert_eq!(found.object_key, key);

        assert!(extension.before_delete(&found).await.unwrap());
        assert!(repo.is_empty());
        assert!(!extension.after_delete(&found, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_after_upload_requires_file_id() {
        let extension = DefaultFileExtension::new(Arc::new(MemoryFileRecordRepository::new()));
        let request = FileOperationRequest::new("a.png", "image/png", 8);
        let key = ObjectKey::compute("/img", 0, "a.png");
        assert!(extension.after_upload(&request, &key).await.is_err());
    }
}
