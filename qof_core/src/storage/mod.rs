//! Backend adapters: the byte-moving primitives behind every file operation.
//!
//! An adapter only knows how to `put`, `get` and `delete` bytes under an
//! [`ObjectKey`] inside an already resolved [`StationConfig`]. Validation,
//! key computation and hooks live in the orchestrator.

pub mod cloud;
pub mod local;
pub mod throttle;

use std::error::Error as StdError;
use std::fmt;
use std::io::Cursor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::files::models::ObjectKey;
use crate::station::StationConfig;

pub use cloud::{CloudAdapter, CloudVendor};
pub use local::LocalAdapter;
pub use throttle::Throttled;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Download side stream. Ownership passes to the caller, who closes it by
/// dropping it; nothing in this crate holds on to it after it is returned.
pub type ByteStream = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found")]
    NotFound,

    #[error("Illegal storage path")]
    PathTraversal,

    #[error("Storage service rejected the request ({code})")]
    Service {
        code: String,
        #[source]
        source: BoxError,
    },

    #[error("Storage transport failure")]
    Client {
        #[source]
        source: BoxError,
    },

    #[error("Local storage I/O failure")]
    Io(#[from] std::io::Error),

    #[error("Storage misconfigured: {0}")]
    Configuration(String),

    #[error("Object exceeds the size limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },
}

impl StorageError {
    pub fn service(code: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::Service {
            code: code.into(),
            source: source.into(),
        }
    }

    pub fn client(source: impl Into<BoxError>) -> Self {
        StorageError::Client {
            source: source.into(),
        }
    }
}

/// Storage technologies a client can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Local,
    Cos,
    Oss,
}

impl StorageMode {
    pub const ALL: [StorageMode; 3] = [StorageMode::Local, StorageMode::Cos, StorageMode::Oss];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::Cos => "cos",
            StorageMode::Oss => "oss",
        }
    }

    /// Case-insensitive lookup, surrounding whitespace ignored.
    pub fn parse(mode: &str) -> Option<Self> {
        let mode = mode.trim().to_lowercase();
        StorageMode::ALL.into_iter().find(|m| m.as_str() == mode)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait SeekableRead: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send> SeekableRead for T {}

/// Upload side stream.
///
/// Magic-number sniffing has to peek at the header and rewind, so only a
/// `Seekable` body can go through content-type verification. A `Sequential`
/// body is rejected whenever verification is required.
pub enum UploadBody {
    Seekable(Box<dyn SeekableRead>),
    Sequential(Box<dyn AsyncRead + Unpin + Send>),
}

impl UploadBody {
    pub fn seekable(reader: impl SeekableRead + 'static) -> Self {
        UploadBody::Seekable(Box::new(reader))
    }

    pub fn sequential(reader: impl AsyncRead + Unpin + Send + 'static) -> Self {
        UploadBody::Sequential(Box::new(reader))
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        UploadBody::seekable(Cursor::new(data.into()))
    }

    pub fn is_resettable(&self) -> bool {
        matches!(self, UploadBody::Seekable(_))
    }

    pub fn into_reader(self) -> ByteStream {
        match self {
            UploadBody::Seekable(reader) => Box::new(reader),
            UploadBody::Sequential(reader) => reader,
        }
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadBody::Seekable(_) => f.write_str("UploadBody::Seekable"),
            UploadBody::Sequential(_) => f.write_str("UploadBody::Sequential"),
        }
    }
}

/// Everything an adapter needs to store one object.
#[derive(Debug, Clone, Copy)]
pub struct PutOptions<'a> {
    pub size_hint: u64,
    pub content_type: &'a str,
    pub rate_limit: Option<u64>,
    /// Hard cap on the bytes actually read from the body, whatever was declared.
    pub max_size: Option<u64>,
}

impl PutOptions<'_> {
    /// Fails as soon as more than `max_size` bytes have gone through.
    pub fn check_size(&self, transferred: u64) -> Result<(), StorageError> {
        match self.max_size {
            Some(max) if transferred > max => Err(StorageError::TooLarge { size: transferred, max }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn mode(&self) -> StorageMode;

    /// Stores the whole body under `key`, overwriting any existing object,
    /// and returns the number of bytes stored. The body is consumed and
    /// dropped on every exit path; nothing is left behind when the body runs
    /// past `options.max_size`.
    async fn put(
        &self,
        station: &StationConfig,
        key: &ObjectKey,
        body: UploadBody,
        options: PutOptions<'_>,
    ) -> Result<u64, StorageError>;

    /// Opens the object for reading. The caller owns the returned stream.
    async fn get(&self, station: &StationConfig, key: &ObjectKey) -> Result<ByteStream, StorageError>;

    /// Removes the object. An object that is already gone counts as removed.
    async fn delete(&self, station: &StationConfig, key: &ObjectKey) -> Result<(), StorageError>;
}
