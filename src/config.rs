use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Process configuration surface read by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct MshConfig {
    /// Endpoint used to break PMode-resolution ties.
    #[serde(default)]
    pub default_responder_address: Option<String>,
    /// Retention window for duplicate-detection records.
    #[serde(default = "default_duplicate_retention_minutes")]
    pub duplicate_retention_minutes: u64,
    /// Interval between duplicate-record disposal runs.
    #[serde(default = "default_disposal_interval_secs")]
    pub disposal_interval_secs: u64,
    /// Relaxes the https-only endpoint rule to also allow http.
    #[serde(default)]
    pub debug_mode: bool,
    /// Optional path to a YAML PMode document loaded at start-up.
    #[serde(default)]
    pub pmode_document_path: Option<String>,
}

impl Default for MshConfig {
    fn default() -> Self {
        Self {
            default_responder_address: None,
            duplicate_retention_minutes: default_duplicate_retention_minutes(),
            disposal_interval_secs: default_disposal_interval_secs(),
            debug_mode: false,
            pmode_document_path: None,
        }
    }
}

const fn default_duplicate_retention_minutes() -> u64 {
    60 * 24
}

const fn default_disposal_interval_secs() -> u64 {
    300
}

impl MshConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("MSH").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn disposal_interval(&self) -> Duration {
        Duration::from_secs(self.disposal_interval_secs)
    }
}
