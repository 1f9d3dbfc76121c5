//! The upload, download, preview and delete lifecycle shared by every backend.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::hooks::FileExtension;
use super::id::IdGenerator;
use super::models::{FileDownload, FileId, FileOperationRequest, FileRecord, ObjectKey, OwnerId};
use super::validation::{normalize_content_type, ContentValidator, ValidationError};
use crate::error::{FileOperation, QofError, Result};
use crate::station::{resolve_station, StationConfig, StationRegistry};
use crate::storage::{PutOptions, StorageAdapter, StorageError, StorageMode, UploadBody};

/// A file client bound to one storage mode. Cheap to clone.
#[derive(Clone)]
pub struct FileClient {
    adapter: Arc<dyn StorageAdapter>,
    stations: Arc<StationRegistry>,
    validator: Arc<ContentValidator>,
    extension: Arc<dyn FileExtension>,
    ids: Arc<IdGenerator>,
    preview_types: Arc<Vec<String>>,
}

impl FileClient {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        stations: Arc<StationRegistry>,
        validator: Arc<ContentValidator>,
        extension: Arc<dyn FileExtension>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            adapter,
            stations,
            validator,
            extension,
            ids,
            preview_types: Arc::new(Vec::new()),
        }
    }

    /// Types allowed through [`FileClient::preview`]. Compared lowercased.
    pub fn with_preview_types(mut self, types: Vec<String>) -> Self {
        self.preview_types = Arc::new(types.into_iter().map(|t| t.trim().to_lowercase()).collect());
        self
    }

    pub fn mode(&self) -> StorageMode {
        self.adapter.mode()
    }

    pub fn stations(&self) -> &StationRegistry {
        &self.stations
    }

    /// Stores `body` and returns the file id.
    ///
    /// Nothing reaches the backend unless validation and `before_upload`
    /// pass, and `after_upload` runs only once the backend confirmed the put.
    pub async fn upload(&self, mut body: UploadBody, mut request: FileOperationRequest) -> Result<FileId> {
        let file_id = *request.file_id.get_or_insert_with(|| self.ids.next_id());

        if !request.is_public && request.owner_id.is_none() {
            return Err(ValidationError::MissingOwner.into());
        }

        let key = ObjectKey::compute(&request.directory_address, file_id, &request.file_name);

        let corrected = self.validator.validate_before_upload(&mut body, &request).await?;
        request.file_type = match corrected {
            Some(detected) => detected.to_string(),
            None => normalize_content_type(&request.file_type),
        };

        self.extension.before_upload(&mut request, &key).await?;

        let station = resolve_station(&request, &self.stations);
        let options = PutOptions {
            size_hint: request.file_size,
            content_type: &request.file_type,
            rate_limit: station.rate_limit,
            max_size: self.validator.max_file_size(),
        };

        let stored = self
            .adapter
            .put(station, &key, body, options)
            .await
            .map_err(|err| self.backend_failure(FileOperation::Upload, file_id, &key, station, err))?;

        if stored != request.file_size {
            warn!(file_id, declared = request.file_size, stored, "Stored size differs from declared size");
            request.file_size = stored;
        }

        let record = self.extension.after_upload(&request, &key).await?;
        info!(
            file_id,
            key = %key,
            station = %station.name,
            mode = %self.mode(),
            file_type = %record.file_type,
            "File uploaded"
        );

        Ok(file_id)
    }

    /// Opens a stored file. The caller owns the returned stream.
    pub async fn download(&self, file_id: FileId) -> Result<FileDownload> {
        let record = self.record(file_id).await?;
        self.fetch(FileOperation::Download, record).await
    }

    /// Like [`FileClient::download`], restricted to the configured preview types.
    pub async fn preview(&self, file_id: FileId) -> Result<FileDownload> {
        let record = self.record(file_id).await?;

        let file_type = record.file_type.trim().to_lowercase();
        if file_type.is_empty() || !self.preview_types.iter().any(|t| *t == file_type) {
            debug!(file_id, file_type = %record.file_type, "Preview rejected");
            return Err(QofError::UnsupportedType(record.file_type));
        }

        self.fetch(FileOperation::Preview, record).await
    }

    /// Removes a file. A file that is already gone, either unknown to the
    /// records or missing from the backend, counts as deleted; a veto from
    /// `before_delete` yields `false`.
    pub async fn delete(&self, file_id: FileId) -> Result<bool> {
        let record = match self.extension.get_record(file_id).await? {
            Some(record) => record,
            None => {
                debug!(file_id, "Delete of unknown file treated as done");
                return Ok(true);
            }
        };

        if !self.extension.before_delete(&record).await? {
            info!(file_id, "Delete vetoed");
            return Ok(false);
        }

        let station = resolve_station(&record, &self.stations);
        let key = &record.object_key;

        match self.adapter.delete(station, key).await {
            Ok(()) => {
                let deleted = self.extension.after_delete(&record, true).await?;
                info!(file_id, key = %key, station = %station.name, mode = %self.mode(), "File deleted");
                Ok(deleted)
            }
            Err(StorageError::NotFound) => {
                debug!(file_id, key = %key, station = %station.name, "Object already absent");
                self.extension.after_delete(&record, true).await
            }
            Err(err) => {
                if let Err(hook_err) = self.extension.after_delete(&record, false).await {
                    warn!(file_id, error = %hook_err, "after_delete hook failed");
                }
                Err(self.backend_failure(FileOperation::Delete, file_id, key, station, err))
            }
        }
    }

    /// Public files are open to everyone, private ones only to their owner.
    pub async fn authorize(&self, file_id: FileId, requester: Option<OwnerId>) -> Result<FileRecord> {
        let record = self.record(file_id).await?;

        if record.is_public || (record.owner_id.is_some() && record.owner_id == requester) {
            return Ok(record);
        }

        warn!(file_id, requester = ?requester, "Access to private file denied");
        Err(QofError::AccessDenied(format!("No permission to access file {}", file_id)))
    }

    async fn record(&self, file_id: FileId) -> Result<FileRecord> {
        self.extension
            .get_record(file_id)
            .await?
            .ok_or_else(|| QofError::not_found(format!("File {} does not exist", file_id)))
    }

    async fn fetch(&self, operation: FileOperation, record: FileRecord) -> Result<FileDownload> {
        self.extension.before_download(&record).await?;

        let station = resolve_station(&record, &self.stations);
        let stream = self
            .adapter
            .get(station, &record.object_key)
            .await
            .map_err(|err| self.backend_failure(operation, record.file_id, &record.object_key, station, err))?;

        self.extension.after_download(&record).await?;
        debug!(
            file_id = record.file_id,
            key = %record.object_key,
            station = %station.name,
            mode = %self.mode(),
            "File opened for {}",
            operation
        );

        Ok(FileDownload { record, stream })
    }

    fn backend_failure(
        &self,
        operation: FileOperation,
        file_id: FileId,
        key: &ObjectKey,
        station: &StationConfig,
        err: StorageError,
    ) -> QofError {
        error!(
            file_id,
            key = %key,
            station = %station.name,
            mode = %self.mode(),
            error = %err,
            "File {} failed",
            operation
        );
        QofError::storage(operation, err)
    }
}

impl std::fmt::Debug for FileClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileClient")
            .field("mode", &self.mode())
            .field("default_station", &self.stations.default_station())
            .field("preview_types", &self.preview_types)
            .finish_non_exhaustive()
    }
}
