pub mod client;
pub mod hooks;
pub mod id;
pub mod models;
pub mod repository;
pub mod sniff;
pub mod validation;

pub use client::FileClient;
pub use hooks::{DefaultFileExtension, FileExtension};
pub use id::IdGenerator;
pub use models::{FileDownload, FileId, FileOperationRequest, FileRecord, ObjectKey, OwnerId};
pub use repository::{FileRecordRepositoryTrait, MemoryFileRecordRepository};
pub use validation::{ContentValidator, ValidationError};
