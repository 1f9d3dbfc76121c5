//! Selects the file client for a storage mode named at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::QofConfig;
use crate::error::{QofError, Result};
use crate::files::{ContentValidator, FileClient, FileExtension, IdGenerator};
use crate::station::StationRegistry;
use crate::storage::{CloudAdapter, CloudVendor, LocalAdapter, StorageAdapter, StorageMode};

#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    clients: HashMap<StorageMode, FileClient>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a client for every enabled mode. Any incomplete station
    /// configuration fails here rather than on the first request.
    pub fn from_config(config: &QofConfig, extension: Arc<dyn FileExtension>) -> Result<Self> {
        config.validate()?;

        let validator = Arc::new(ContentValidator::from_config(config));
        let ids = Arc::new(IdGenerator::new(config.worker_id));
        let mut factory = Self::new();

        for mode in config.enabled_modes() {
            let registry = StationRegistry::from_settings(mode, config.backend(mode))?;

            let adapter: Arc<dyn StorageAdapter> = match mode {
                StorageMode::Local => Arc::new(LocalAdapter::new(config.buffer_size)),
                StorageMode::Cos => Arc::new(cloud_adapter(CloudVendor::Cos, &registry, config.buffer_size)?),
                StorageMode::Oss => Arc::new(cloud_adapter(CloudVendor::Oss, &registry, config.buffer_size)?),
            };

            info!(
                mode = %mode,
                default_station = registry.default_station(),
                stations = registry.station_names().len(),
                "Storage mode enabled"
            );

            let client = FileClient::new(
                adapter,
                Arc::new(registry),
                validator.clone(),
                extension.clone(),
                ids.clone(),
            )
            .with_preview_types(config.preview_types());
            factory.register(client);
        }

        Ok(factory)
    }

    /// Replaces any client already registered for the same mode.
    pub fn register(&mut self, client: FileClient) {
        self.clients.insert(client.mode(), client);
    }

    pub fn registered_modes(&self) -> Vec<StorageMode> {
        StorageMode::ALL
            .into_iter()
            .filter(|mode| self.clients.contains_key(mode))
            .collect()
    }

    /// Looks a client up by mode name, case-insensitively.
    ///
    /// A name that is not a storage mode at all and a known mode that was not
    /// enabled fail with different errors.
    pub fn build_client(&self, mode: &str) -> Result<FileClient> {
        let parsed = StorageMode::parse(mode).ok_or_else(|| QofError::UnsupportedMode {
            mode: mode.to_string(),
            supported: join_modes(&StorageMode::ALL),
        })?;

        self.clients
            .get(&parsed)
            .cloned()
            .ok_or_else(|| QofError::ModeNotEnabled {
                mode: parsed.to_string(),
                registered: join_modes(&self.registered_modes()),
            })
    }
}

fn cloud_adapter(vendor: CloudVendor, registry: &StationRegistry, buffer_size: usize) -> Result<CloudAdapter> {
    CloudAdapter::from_registry(vendor, registry, buffer_size)
        .map_err(|err| QofError::configuration(format!("Failed to build {} client: {}", vendor, err)))
}

fn join_modes(modes: &[StorageMode]) -> String {
    if modes.is_empty() {
        return "none".to_string();
    }
    modes.iter().map(StorageMode::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationSettings;
    use crate::files::{DefaultFileExtension, MemoryFileRecordRepository};

    fn extension() -> Arc<dyn FileExtension> {
        Arc::new(DefaultFileExtension::new(Arc::new(MemoryFileRecordRepository::new())))
    }

    #[test]
    fn test_default_config_enables_local_only() {
        let factory = ClientFactory::from_config(&QofConfig::default(), extension()).unwrap();
        assert_eq!(factory.registered_modes(), vec![StorageMode::Local]);

        let client = factory.build_client("LOCAL").unwrap();
        assert_eq!(client.mode(), StorageMode::Local);
    }

    #[test]
    fn test_unknown_and_disabled_modes_differ() {
        let factory = ClientFactory::from_config(&QofConfig::default(), extension()).unwrap();

        match factory.build_client("s3").unwrap_err() {
            QofError::UnsupportedMode { mode, supported } => {
                assert_eq!(mode, "s3");
                assert_eq!(supported, "local, cos, oss");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(
            factory.build_client("").unwrap_err(),
            QofError::UnsupportedMode { .. }
        ));

        match factory.build_client("oss").unwrap_err() {
            QofError::ModeNotEnabled { mode, registered } => {
                assert_eq!(mode, "oss");
                assert_eq!(registered, "local");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_cloud_mode_from_config() {
        let mut config = QofConfig::default();
        config.cos.enable = true;
        config.cos.shared = StationSettings {
            bucket: Some("files-1250000000".to_string()),
            region: Some("ap-guangzhou".to_string()),
            access_key_id: Some("id".to_string()),
            access_key_secret: Some("secret".to_string()),
            ..Default::default()
        };

        let factory = ClientFactory::from_config(&config, extension()).unwrap();
        assert_eq!(factory.registered_modes(), vec![StorageMode::Local, StorageMode::Cos]);
        assert_eq!(factory.build_client("cos").unwrap().stations().default_station(), "default");
    }

    #[test]
    fn test_incomplete_cloud_config_fails_fast() {
        let mut config = QofConfig::default();
        config.oss.enable = true;
        config.oss.shared.bucket = Some("bucket".to_string());

        let err = ClientFactory::from_config(&config, extension()).unwrap_err();
        assert!(matches!(err, QofError::Configuration(_)));
    }

    #[test]
    fn test_empty_factory_lists_no_modes() {
        let factory = ClientFactory::new();
        match factory.build_client("local").unwrap_err() {
            QofError::ModeNotEnabled { registered, .. } => assert_eq!(registered, "none"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
