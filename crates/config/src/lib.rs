use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "partyline.toml",
    "config/partyline.toml",
    "../partyline.toml",
    "../config/partyline.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub delivery: DeliveryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7080,
        }
    }
}

/// Tunable knobs of the delivery core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Bound on one persistence save before the sender is told to retry
    #[serde(default = "DeliveryConfig::default_save_timeout_ms")]
    pub save_timeout_ms: u64,
    /// Capacity of each connection's outbound event channel
    #[serde(default = "DeliveryConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl DeliveryConfig {
    const fn default_save_timeout_ms() -> u64 {
        5_000
    }

    const fn default_outbound_buffer() -> usize {
        256
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            save_timeout_ms: Self::default_save_timeout_ms(),
            outbound_buffer: Self::default_outbound_buffer(),
        }
    }
}

/// Load the application configuration by combining defaults, an optional
/// TOML file, and `PARTYLINE_*` environment overrides.
///
/// ```
/// std::env::remove_var("PARTYLINE_CONFIG");
///
/// let config = partyline_config::load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// assert!(config.delivery.save_timeout_ms > 0);
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())
        .unwrap()
        .set_default("http.port", i64::from(defaults.http.port))
        .unwrap()
        .set_default(
            "delivery.save_timeout_ms",
            i64::try_from(defaults.delivery.save_timeout_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "delivery.outbound_buffer",
            i64::try_from(defaults.delivery.outbound_buffer).unwrap_or(i64::MAX),
        )
        .unwrap();

    if let Some(path) = config_file() {
        debug!(path = %path.display(), "loading configuration file");
        builder = builder.add_source(config::File::from(path));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PARTYLINE")
            .separator("__")
            .try_parsing(true),
    );

    let settings = builder.build().context("failed to build configuration")?;
    settings
        .try_deserialize()
        .context("failed to deserialize configuration")
}

fn config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("PARTYLINE_CONFIG") {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Some(path);
        }
        debug!(path = %path.display(), "PARTYLINE_CONFIG points at a missing file, ignoring");
    }

    DEFAULT_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}
