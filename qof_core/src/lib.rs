//! Core library for storage-agnostic file operations: validation, station
//! resolution, backend adapters and the shared operation lifecycle.

pub mod config;
pub mod error;
pub mod factory;
pub mod files;
pub mod station;
pub mod storage;

pub use config::QofConfig;
pub use error::{FileOperation, QofError, Result};
pub use factory::ClientFactory;
pub use files::{
    ContentValidator, DefaultFileExtension, FileClient, FileDownload, FileExtension, FileId,
    FileOperationRequest, FileRecord, FileRecordRepositoryTrait, IdGenerator, MemoryFileRecordRepository, ObjectKey,
    OwnerId, ValidationError,
};
pub use station::{resolve_station, resolve_value, StationConfig, StationRegistry, StationTarget};
pub use storage::{StorageAdapter, StorageError, StorageMode, UploadBody};
