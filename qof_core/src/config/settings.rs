use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::storage::StorageMode;

pub const DEFAULT_STATION: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QofConfig {
    /// Upper bound for a single upload in bytes; zero or negative disables it.
    pub max_file_size: i64,
    pub preview_supported_types: Vec<String>,
    pub enable_magic_number_detection: bool,
    pub buffer_size: usize,
    pub worker_id: u16,
    pub local: BackendSettings,
    pub cos: BackendSettings,
    pub oss: BackendSettings,
}

/// Settings of one storage technology.
///
/// The shared station fields double as the single station when `multiple`
/// is empty, and as fallbacks for any field a `multiple` entry leaves unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub enable: bool,
    pub default_storage_station: Option<String>,
    #[serde(flatten)]
    pub shared: StationSettings,
    pub multiple: HashMap<String, StationSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    #[serde(alias = "bucket_name")]
    pub bucket: Option<String>,
    pub filepath: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    #[serde(alias = "secret_id")]
    pub access_key_id: Option<String>,
    #[serde(alias = "secret_key")]
    pub access_key_secret: Option<String>,
    /// Bytes per second.
    pub rate_limit: Option<u64>,
}

impl Default for QofConfig {
    fn default() -> Self {
        Self {
            max_file_size: 104_857_600,
            preview_supported_types: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "application/pdf".to_string(),
            ],
            enable_magic_number_detection: true,
            buffer_size: 8192,
            worker_id: 1,
            local: BackendSettings {
                enable: true,
                shared: StationSettings {
                    filepath: Some("./uploads".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            cos: BackendSettings::default(),
            oss: BackendSettings::default(),
        }
    }
}

impl BackendSettings {
    /// Name of the station used when a request does not pick one.
    pub fn default_station(&self) -> &str {
        self.default_storage_station
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_STATION)
    }
}

impl QofConfig {
    /// Defaults, then `qof.toml` when present, then `QOF_*` variables
    /// (`QOF_LOCAL__FILEPATH=/srv/files`).
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if Path::new("qof.toml").exists() {
            builder = builder.add_source(File::with_name("qof"));
        }

        builder = builder.add_source(Self::environment());

        Self::finish(builder.build()?)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        Self::finish(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("QOF")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let qof_config: QofConfig = config.try_deserialize()?;
        qof_config.validate()?;
        Ok(qof_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Message(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        if self.worker_id > 1023 {
            return Err(ConfigError::Message(
                "Worker id must fit in 10 bits (0-1023)".to_string(),
            ));
        }

        if self
            .preview_supported_types
            .iter()
            .any(|t| t.trim().is_empty())
        {
            return Err(ConfigError::Message(
                "Preview supported types cannot contain empty entries".to_string(),
            ));
        }

        if self.max_file_size <= 0 {
            tracing::warn!("File size limit disabled - uploads of any size are accepted");
        }

        Ok(())
    }

    pub fn backend(&self, mode: StorageMode) -> &BackendSettings {
        match mode {
            StorageMode::Local => &self.local,
            StorageMode::Cos => &self.cos,
            StorageMode::Oss => &self.oss,
        }
    }

    pub fn enabled_modes(&self) -> Vec<StorageMode> {
        StorageMode::ALL
            .into_iter()
            .filter(|mode| self.backend(*mode).enable)
            .collect()
    }

    /// Preview allow-list, lowercased.
    pub fn preview_types(&self) -> Vec<String> {
        self.preview_supported_types
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect()
    }
}
