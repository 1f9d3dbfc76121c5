use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::station::StationTarget;
use crate::storage::ByteStream;

pub type FileId = i64;
pub type OwnerId = i64;

/// One upload as described by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperationRequest {
    /// Generated during upload when absent.
    pub file_id: Option<FileId>,
    pub file_name: String,
    /// Logical sub-directory, e.g. `/2025/06`.
    pub directory_address: String,
    /// Declared MIME type.
    pub file_type: String,
    pub file_size: u64,
    pub storage_station: Option<String>,
    pub is_public: bool,
    /// Required before a private upload completes.
    pub owner_id: Option<OwnerId>,
    pub file_label: Option<String>,
}

impl FileOperationRequest {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_id: None,
            file_name: file_name.into(),
            directory_address: String::new(),
            file_type: file_type.into(),
            file_size,
            storage_station: None,
            is_public: true,
            owner_id: None,
            file_label: None,
        }
    }

    pub fn with_directory(mut self, directory_address: impl Into<String>) -> Self {
        self.directory_address = directory_address.into();
        self
    }

    pub fn with_station(mut self, station: impl Into<String>) -> Self {
        self.storage_station = Some(station.into());
        self
    }

    pub fn with_file_id(mut self, file_id: FileId) -> Self {
        self.file_id = Some(file_id);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.file_label = Some(label.into());
        self
    }

    pub fn with_owner(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }
}

impl StationTarget for FileOperationRequest {
    fn storage_station(&self) -> Option<&str> {
        self.storage_station.as_deref()
    }
}

/// Backend-relative location of an object: `directory/fileId.ext`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn compute(directory_address: &str, file_id: FileId, file_name: &str) -> Self {
        Self(format!("{}/{}{}", directory_address, file_id, extension_of(file_name)))
    }

    /// Wraps a key that was computed earlier, e.g. one read back from a record.
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key without leading separators, suitable for joining under a root.
    pub fn relative(&self) -> &str {
        self.0.trim_start_matches(&['/', '\\'][..])
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercased `.ext` of the last dot-suffix, or empty.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => file_name[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Metadata snapshot handed to the persistence collaborator after a
/// successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub object_key: ObjectKey,
    pub storage_station: Option<String>,
    pub is_public: bool,
    pub owner_id: Option<OwnerId>,
    pub file_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn from_request(request: &FileOperationRequest, file_id: FileId, key: &ObjectKey) -> Self {
        Self {
            file_id,
            file_name: request.file_name.clone(),
            file_type: request.file_type.clone(),
            file_size: request.file_size,
            object_key: key.clone(),
            storage_station: request.storage_station.clone(),
            is_public: request.is_public,
            owner_id: request.owner_id,
            file_label: request.file_label.clone(),
            created_at: Utc::now(),
        }
    }
}

impl StationTarget for FileRecord {
    fn storage_station(&self) -> Option<&str> {
        self.storage_station.as_deref()
    }
}

/// A downloaded file. The caller owns `stream` and closes it by dropping it.
pub struct FileDownload {
    pub record: FileRecord,
    pub stream: ByteStream,
}

impl fmt::Debug for FileDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDownload")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
