//! Storage station resolution.
//!
//! A station is one named destination (bucket or root directory, path prefix,
//! credentials, rate limit) inside a single storage technology. Registries are
//! built once at startup and only read afterwards.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::config::{BackendSettings, StationSettings};
use crate::error::{QofError, Result};
use crate::storage::StorageMode;

/// Anything that may name the station it targets.
pub trait StationTarget {
    fn storage_station(&self) -> Option<&str>;
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    KeyPair { access_key_id: String, access_key_secret: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::KeyPair { access_key_id, .. } => f
                .debug_struct("KeyPair")
                .field("access_key_id", access_key_id)
                .field("access_key_secret", &"***")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub name: String,
    /// Bucket name for object stores, root directory for local storage.
    pub bucket_or_root: String,
    pub path_prefix: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub rate_limit: Option<u64>,
    pub credentials: Credentials,
}

impl StationConfig {
    pub fn local(name: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket_or_root: root.into(),
            path_prefix: String::new(),
            endpoint: None,
            region: None,
            rate_limit: None,
            credentials: Credentials::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StationRegistry {
    default_station: String,
    stations: HashMap<String, StationConfig>,
}

impl StationRegistry {
    /// Fails when the default station has no configuration.
    pub fn new(default_station: impl Into<String>, stations: HashMap<String, StationConfig>) -> Result<Self> {
        let default_station = default_station.into();
        if !stations.contains_key(&default_station) {
            return Err(QofError::configuration(format!(
                "Default storage station [{}] is not configured",
                default_station
            )));
        }

        Ok(Self {
            default_station,
            stations,
        })
    }

    pub fn single(station: StationConfig) -> Self {
        let default_station = station.name.clone();
        let mut stations = HashMap::new();
        stations.insert(default_station.clone(), station);
        Self {
            default_station,
            stations,
        }
    }

    /// Builds every station of one backend, inheriting unset per-station
    /// fields from the shared settings.
    pub fn from_settings(mode: StorageMode, settings: &BackendSettings) -> Result<Self> {
        let default_station = settings.default_station().to_string();

        let names: Vec<String> = if settings.multiple.is_empty() {
            vec![default_station.clone()]
        } else {
            settings.multiple.keys().cloned().collect()
        };

        let mut stations = HashMap::with_capacity(names.len());
        for name in names {
            let station = build_station(mode, settings, &name)?;
            debug!(mode = %mode, station = %name, "Storage station configured");
            stations.insert(name, station);
        }

        Self::new(default_station, stations)
    }

    pub fn default_station(&self) -> &str {
        &self.default_station
    }

    pub fn get(&self, name: &str) -> Option<&StationConfig> {
        self.stations.get(name)
    }

    pub fn station_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The requested station when it exists, the default station otherwise.
    pub fn resolve(&self, requested: Option<&str>) -> &StationConfig {
        requested
            .and_then(|name| self.stations.get(name))
            .unwrap_or_else(|| &self.stations[&self.default_station])
    }
}

pub fn resolve_station<'a>(target: &impl StationTarget, registry: &'a StationRegistry) -> &'a StationConfig {
    registry.resolve(target.storage_station())
}

/// Reads one field for the station a request targets.
///
/// With no `multiple` entries the shared value is used directly. Otherwise the
/// requested station (or the default one when the request names none or an
/// unknown one) is consulted first and the shared value fills in when the
/// station leaves the field unset.
pub fn resolve_value<T, R>(
    requested: Option<&str>,
    shared: &T,
    multiple: &HashMap<String, T>,
    default_station: &str,
    field: &str,
    accessor: impl Fn(&T) -> Option<R>,
) -> Result<R> {
    let station = pick_station(requested, multiple, default_station);
    lookup_value(station, shared, multiple, accessor)?.ok_or_else(|| {
        if multiple.is_empty() {
            QofError::configuration(format!("Missing storage setting [{}]", field))
        } else {
            QofError::configuration(format!("Missing storage setting [multiple.{}.{}]", station, field))
        }
    })
}

fn pick_station<'a, T>(requested: Option<&'a str>, multiple: &HashMap<String, T>, default_station: &'a str) -> &'a str {
    requested
        .filter(|name| multiple.contains_key(*name))
        .unwrap_or(default_station)
}

/// `Ok(None)` when neither the station nor the shared settings carry a value.
fn lookup_value<T, R>(
    station: &str,
    shared: &T,
    multiple: &HashMap<String, T>,
    accessor: impl Fn(&T) -> Option<R>,
) -> Result<Option<R>> {
    if multiple.is_empty() {
        return Ok(accessor(shared));
    }

    let config = multiple.get(station).ok_or_else(|| {
        QofError::configuration(format!("Storage station [{}] is not configured", station))
    })?;

    Ok(accessor(config).or_else(|| accessor(shared)))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn build_station(mode: StorageMode, settings: &BackendSettings, name: &str) -> Result<StationConfig> {
    let shared = &settings.shared;
    let multiple = &settings.multiple;
    let default_station = settings.default_station();

    let required = |label: &str, accessor: fn(&StationSettings) -> Option<String>| {
        resolve_value(Some(name), shared, multiple, default_station, label, accessor)
    };
    let optional = |accessor: fn(&StationSettings) -> Option<String>| lookup_value(name, shared, multiple, accessor);

    let rate_limit = lookup_value(name, shared, multiple, |s| s.rate_limit)?.filter(|limit| *limit > 0);

    match mode {
        StorageMode::Local => Ok(StationConfig {
            name: name.to_string(),
            bucket_or_root: required("filepath", |s| non_blank(&s.filepath))?,
            path_prefix: String::new(),
            endpoint: None,
            region: None,
            rate_limit,
            credentials: Credentials::None,
        }),
        StorageMode::Cos | StorageMode::Oss => {
            let endpoint = optional(|s| non_blank(&s.endpoint))?;
            let region = optional(|s| non_blank(&s.region))?;
            if endpoint.is_none() && region.is_none() {
                return Err(QofError::configuration(format!(
                    "Missing storage setting [{}.endpoint] or [{}.region] for station [{}]",
                    mode, mode, name
                )));
            }

            Ok(StationConfig {
                name: name.to_string(),
                bucket_or_root: required("bucket", |s| non_blank(&s.bucket))?,
                path_prefix: optional(|s| non_blank(&s.filepath))?.unwrap_or_default(),
                endpoint,
                region,
                rate_limit,
                credentials: Credentials::KeyPair {
                    access_key_id: required("access_key_id", |s| non_blank(&s.access_key_id))?,
                    access_key_secret: required("access_key_secret", |s| non_blank(&s.access_key_secret))?,
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Target(Option<&'static str>);

    impl StationTarget for Target {
        fn storage_station(&self) -> Option<&str> {
            self.0
        }
    }

    fn registry() -> StationRegistry {
        let mut stations = HashMap::new();
        stations.insert("main".to_string(), StationConfig::local("main", "/srv/main"));
        stations.insert("archive".to_string(), StationConfig::local("archive", "/srv/archive"));
        StationRegistry::new("main", stations).unwrap()
    }

    fn cos_settings() -> BackendSettings {
        let mut settings = BackendSettings {
            enable: true,
            default_storage_station: Some("avatars".to_string()),
            shared: StationSettings {
                access_key_id: Some("shared-id".to_string()),
                access_key_secret: Some("shared-key".to_string()),
                region: Some("ap-guangzhou".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        settings.multiple.insert(
            "avatars".to_string(),
            StationSettings {
                bucket: Some("avatars-125".to_string()),
                rate_limit: Some(1024),
                ..Default::default()
            },
        );
        settings.multiple.insert(
            "reports".to_string(),
            StationSettings {
                bucket: Some("reports-125".to_string()),
                access_key_id: Some("reports-id".to_string()),
                filepath: Some("/reports".to_string()),
                ..Default::default()
            },
        );
        settings
    }

    #[test]
    fn test_unset_or_unknown_station_falls_back_to_default() {
        let registry = registry();
        assert_eq!(resolve_station(&Target(None), &registry).name, "main");
        assert_eq!(resolve_station(&Target(Some("missing")), &registry).name, "main");
        assert_eq!(resolve_station(&Target(Some("archive")), &registry).name, "archive");
    }

    #[test]
    fn test_missing_default_station_fails_fast() {
        let mut stations = HashMap::new();
        stations.insert("archive".to_string(), StationConfig::local("archive", "/srv/archive"));
        let err = StationRegistry::new("main", stations).unwrap_err();
        assert!(matches!(err, QofError::Configuration(ref msg) if msg.contains("main")));
    }

    #[test]
    fn test_resolve_value_inherits_shared_fields() {
        let settings = cos_settings();
        let get = |station: Option<&str>, field: &str, accessor: fn(&StationSettings) -> Option<String>| {
            resolve_value(station, &settings.shared, &settings.multiple, "avatars", field, accessor)
        };

        assert_eq!(get(Some("reports"), "bucket", |s| s.bucket.clone()).unwrap(), "reports-125");
        assert_eq!(get(Some("reports"), "access_key_id", |s| s.access_key_id.clone()).unwrap(), "reports-id");
        assert_eq!(get(Some("avatars"), "access_key_id", |s| s.access_key_id.clone()).unwrap(), "shared-id");
        assert_eq!(get(Some("nope"), "bucket", |s| s.bucket.clone()).unwrap(), "avatars-125");

        let err = get(Some("avatars"), "endpoint", |s| s.endpoint.clone()).unwrap_err();
        assert!(matches!(err, QofError::Configuration(ref msg) if msg.contains("multiple.avatars.endpoint")));
    }

    #[test]
    fn test_resolve_value_without_multiple_uses_shared() {
        let shared = StationSettings {
            filepath: Some("/data".to_string()),
            ..Default::default()
        };
        let multiple = HashMap::new();
        let value = resolve_value(Some("anything"), &shared, &multiple, "default", "filepath", |s| {
            s.filepath.clone()
        });
        assert_eq!(value.unwrap(), "/data");
    }

    #[test]
    fn test_registry_from_cloud_settings() {
        let registry = StationRegistry::from_settings(StorageMode::Cos, &cos_settings()).unwrap();
        assert_eq!(registry.default_station(), "avatars");
        assert_eq!(registry.station_names(), vec!["avatars", "reports"]);

        let avatars = registry.get("avatars").unwrap();
        assert_eq!(avatars.rate_limit, Some(1024));
        assert_eq!(avatars.path_prefix, "");
        assert_eq!(
            avatars.credentials,
            Credentials::KeyPair {
                access_key_id: "shared-id".to_string(),
                access_key_secret: "shared-key".to_string(),
            }
        );

        let reports = registry.get("reports").unwrap();
        assert_eq!(reports.path_prefix, "/reports");
        assert_eq!(reports.region.as_deref(), Some("ap-guangzhou"));
    }

    #[test]
    fn test_registry_rejects_incomplete_station() {
        let mut settings = cos_settings();
        settings.shared.access_key_secret = None;
        let err = StationRegistry::from_settings(StorageMode::Cos, &settings).unwrap_err();
        assert!(matches!(err, QofError::Configuration(ref msg) if msg.contains("access_key_secret")));

        let mut settings = cos_settings();
        settings.default_storage_station = Some("gone".to_string());
        assert!(StationRegistry::from_settings(StorageMode::Cos, &settings).is_err());
    }

    #[test]
    fn test_single_local_station() {
        let settings = BackendSettings {
            enable: true,
            shared: StationSettings {
                filepath: Some("./files".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let registry = StationRegistry::from_settings(StorageMode::Local, &settings).unwrap();
        assert_eq!(registry.default_station(), "default");
        assert_eq!(registry.resolve(None).bucket_or_root, "./files");
    }

    #[test]
    fn test_credentials_are_redacted() {
        let creds = Credentials::KeyPair {
            access_key_id: "id".to_string(),
            access_key_secret: "very-secret".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("very-secret"));
    }
}
