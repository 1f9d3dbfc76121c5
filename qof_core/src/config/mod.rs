pub mod settings;

pub use settings::{BackendSettings, QofConfig, StationSettings, DEFAULT_STATION};
