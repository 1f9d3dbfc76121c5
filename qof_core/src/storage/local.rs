use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::{ByteStream, PutOptions, StorageAdapter, StorageError, StorageMode, Throttled, UploadBody};
use crate::files::models::ObjectKey;
use crate::station::StationConfig;

/// Stores objects as plain files under the station's root directory.
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    buffer_size: usize,
}

impl LocalAdapter {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Absolute location of `key` under the station root.
    ///
    /// Both sides are normalized lexically so that `..` segments cannot climb
    /// out of the root. The offending path is only ever logged.
    pub fn resolve_path(&self, station: &StationConfig, key: &ObjectKey) -> Result<PathBuf, StorageError> {
        let root = normalize(&std::path::absolute(&station.bucket_or_root)?);
        let resolved = normalize(&root.join(key.relative()));

        if resolved == root || !resolved.starts_with(&root) {
            warn!(
                station = %station.name,
                key = %key,
                path = %resolved.display(),
                "Rejected object path outside the station root"
            );
            return Err(StorageError::PathTraversal);
        }

        Ok(resolved)
    }

    async fn write_part(&self, part: &Path, body: UploadBody, options: PutOptions<'_>) -> Result<u64, StorageError> {
        let mut file = fs::File::create(part).await?;
        let mut reader = Throttled::new(body.into_reader(), options.rate_limit);
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            options.check_size(reader.transferred())?;
            file.write_all(&buf[..read]).await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(reader.transferred())
    }
}

impl Default for LocalAdapter {
    fn default() -> Self {
        Self::new(8192)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn part_path(path: &Path) -> Result<PathBuf, StorageError> {
    let mut name: OsString = path.file_name().ok_or(StorageError::PathTraversal)?.to_os_string();
    name.push(".part");
    Ok(path.with_file_name(name))
}

#[async_trait]
impl StorageAdapter for LocalAdapter {
    fn mode(&self) -> StorageMode {
        StorageMode::Local
    }

    async fn put(
        &self,
        station: &StationConfig,
        key: &ObjectKey,
        body: UploadBody,
        options: PutOptions<'_>,
    ) -> Result<u64, StorageError> {
        let path = self.resolve_path(station, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part = part_path(&path)?;
        let written = match self.write_part(&part, body, options).await {
            Ok(written) => written,
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&part).await {
                    debug!(error = %cleanup, "No partial file to clean up");
                }
                return Err(err);
            }
        };

        fs::rename(&part, &path).await?;

        debug!(station = %station.name, key = %key, bytes = written, "Stored local object");
        Ok(written)
    }

    async fn get(&self, station: &StationConfig, key: &ObjectKey) -> Result<ByteStream, StorageError> {
        let path = self.resolve_path(station, key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, station: &StationConfig, key: &ObjectKey) -> Result<(), StorageError> {
        let path = self.resolve_path(station, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(station = %station.name, key = %key, "Removed local object");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
