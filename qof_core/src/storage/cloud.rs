//! Object-store adapters (Tencent COS, Aliyun OSS) on top of Apache OpenDAL.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use opendal::{services, ErrorKind, Operator, Writer};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use super::{ByteStream, PutOptions, StorageAdapter, StorageError, StorageMode, Throttled, UploadBody};
use crate::files::models::ObjectKey;
use crate::station::{Credentials, StationConfig, StationRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudVendor {
    Cos,
    Oss,
}

impl CloudVendor {
    pub fn mode(&self) -> StorageMode {
        match self {
            CloudVendor::Cos => StorageMode::Cos,
            CloudVendor::Oss => StorageMode::Oss,
        }
    }

    /// Public endpoint of a region, used when a station sets no endpoint.
    pub fn regional_endpoint(&self, region: &str) -> String {
        match self {
            CloudVendor::Cos => format!("https://cos.{}.myqcloud.com", region),
            CloudVendor::Oss => format!("https://oss-{}.aliyuncs.com", region),
        }
    }

    fn build_operator(&self, station: &StationConfig) -> Result<Operator, StorageError> {
        let (access_key_id, access_key_secret) = match &station.credentials {
            Credentials::KeyPair {
                access_key_id,
                access_key_secret,
            } => (access_key_id.as_str(), access_key_secret.as_str()),
            Credentials::None => {
                return Err(StorageError::Configuration(format!(
                    "Station [{}] has no credentials",
                    station.name
                )))
            }
        };

        let endpoint = station
            .endpoint
            .clone()
            .or_else(|| station.region.as_deref().map(|region| self.regional_endpoint(region)))
            .ok_or_else(|| {
                StorageError::Configuration(format!("Station [{}] has neither endpoint nor region", station.name))
            })?;

        let operator = match self {
            CloudVendor::Cos => {
                let builder = services::Cos::default()
                    .endpoint(&endpoint)
                    .secret_id(access_key_id)
                    .secret_key(access_key_secret)
                    .bucket(&station.bucket_or_root);
                Operator::new(builder).map(|b| b.finish())
            }
            CloudVendor::Oss => {
                let builder = services::Oss::default()
                    .endpoint(&endpoint)
                    .access_key_id(access_key_id)
                    .access_key_secret(access_key_secret)
                    .bucket(&station.bucket_or_root);
                Operator::new(builder).map(|b| b.finish())
            }
        };

        operator.map_err(|e| {
            warn!(vendor = %self, station = %station.name, error = %e, "Failed to build storage client");
            StorageError::Configuration(format!("Station [{}] has an invalid {} configuration", station.name, self))
        })
    }
}

impl fmt::Display for CloudVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode().as_str())
    }
}

/// One OpenDAL operator per configured station of a single vendor.
#[derive(Clone)]
pub struct CloudAdapter {
    vendor: CloudVendor,
    buffer_size: usize,
    operators: HashMap<String, Operator>,
}

impl CloudAdapter {
    pub fn from_registry(
        vendor: CloudVendor,
        registry: &StationRegistry,
        buffer_size: usize,
    ) -> Result<Self, StorageError> {
        let mut operators = HashMap::new();
        for name in registry.station_names() {
            if let Some(station) = registry.get(name) {
                operators.insert(name.to_string(), vendor.build_operator(station)?);
            }
        }

        Ok(Self::with_operators(vendor, operators, buffer_size))
    }

    /// Uses prepared operators keyed by station name.
    pub fn with_operators(vendor: CloudVendor, operators: HashMap<String, Operator>, buffer_size: usize) -> Self {
        Self {
            vendor,
            buffer_size: buffer_size.max(1),
            operators,
        }
    }

    pub fn vendor(&self) -> CloudVendor {
        self.vendor
    }

    fn operator(&self, station: &StationConfig) -> Result<&Operator, StorageError> {
        self.operators.get(&station.name).ok_or_else(|| {
            StorageError::Configuration(format!(
                "No {} client for storage station [{}]",
                self.vendor, station.name
            ))
        })
    }

    async fn write_body(
        &self,
        writer: &mut Writer,
        body: UploadBody,
        options: PutOptions<'_>,
    ) -> Result<u64, StorageError> {
        let mut reader = Throttled::new(body.into_reader(), options.rate_limit);
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            options.check_size(reader.transferred())?;
            writer
                .write(Bytes::copy_from_slice(&buf[..read]))
                .await
                .map_err(classify)?;
        }

        Ok(reader.transferred())
    }
}

impl fmt::Debug for CloudAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stations: Vec<&String> = self.operators.keys().collect();
        stations.sort();
        f.debug_struct("CloudAdapter")
            .field("vendor", &self.vendor)
            .field("buffer_size", &self.buffer_size)
            .field("stations", &stations)
            .finish()
    }
}

/// Object path inside the bucket: the station prefix followed by the key.
pub fn object_path(station: &StationConfig, key: &ObjectKey) -> String {
    let prefix = station.path_prefix.trim_matches('/');
    if prefix.is_empty() {
        key.relative().to_string()
    } else {
        format!("{}/{}", prefix, key.relative())
    }
}

fn classify(err: opendal::Error) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound,
        kind @ (ErrorKind::ConfigInvalid | ErrorKind::Unsupported) => {
            warn!(error = %err, "Storage backend rejected its configuration");
            StorageError::Configuration(format!("Storage backend rejected the request ({})", kind.into_static()))
        }
        ErrorKind::Unexpected => StorageError::client(err),
        kind => StorageError::service(kind.into_static(), err),
    }
}

#[async_trait]
impl StorageAdapter for CloudAdapter {
    fn mode(&self) -> StorageMode {
        self.vendor.mode()
    }

    async fn put(
        &self,
        station: &StationConfig,
        key: &ObjectKey,
        body: UploadBody,
        options: PutOptions<'_>,
    ) -> Result<u64, StorageError> {
        let operator = self.operator(station)?;
        let path = object_path(station, key);

        let mut write = operator.writer_with(&path);
        if !options.content_type.is_empty() && operator.info().full_capability().write_with_content_type {
            write = write.content_type(options.content_type);
        }
        let mut writer = write.await.map_err(classify)?;

        let written = match self.write_body(&mut writer, body, options).await {
            Ok(written) => written,
            Err(err) => {
                if let Err(abort) = writer.abort().await {
                    debug!(error = %abort, "Failed to abort partial upload");
                }
                return Err(err);
            }
        };
        writer.close().await.map_err(classify)?;

        debug!(vendor = %self.vendor, station = %station.name, path = %path, bytes = written, "Stored object");
        Ok(written)
    }

    async fn get(&self, station: &StationConfig, key: &ObjectKey) -> Result<ByteStream, StorageError> {
        let operator = self.operator(station)?;
        let path = object_path(station, key);

        operator.stat(&path).await.map_err(classify)?;
        let stream = operator
            .reader(&path)
            .await
            .map_err(classify)?
            .into_bytes_stream(..)
            .await
            .map_err(classify)?;

        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn delete(&self, station: &StationConfig, key: &ObjectKey) -> Result<(), StorageError> {
        let operator = self.operator(station)?;
        let path = object_path(station, key);
        operator.delete(&path).await.map_err(classify)?;
        debug!(vendor = %self.vendor, station = %station.name, path = %path, "Removed object");
        Ok(())
    }
}
