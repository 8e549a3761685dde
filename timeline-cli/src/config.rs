use anyhow::{Context, Result};
use hls_timeline::{DegradedPolicy, RetryPolicy, SequencerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use timeline_storage::StorageConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub stream: StreamSettings,
    pub retry: RetrySettings,
    /// Seconds between polls while following the live edge
    pub poll_interval_secs: u64,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            stream: StreamSettings::default(),
            retry: RetrySettings::default(),
            poll_interval_secs: 10,
            colored_output: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Source identifier used in clip file names
    pub source_id: String,
    /// Path of the bucket folders below the storage root
    pub prefix: String,
    pub bucket_width_secs: i64,
    pub manifest_name: String,
    pub settle_delay_secs: u64,
    pub degraded_policy: DegradedPolicy,
    /// List all folders once per bounded run instead of probing each bucket
    pub prime_listing: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            source_id: "rpi_orcasound_lab".to_string(),
            prefix: "rpi_orcasound_lab/hls".to_string(),
            bucket_width_secs: defaults.bucket_width,
            manifest_name: defaults.manifest_name,
            settle_delay_secs: defaults.settle_delay.as_secs(),
            degraded_policy: defaults.degraded_policy,
            prime_listing: true,
        }
    }
}

impl StreamSettings {
    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            bucket_width: self.bucket_width_secs,
            manifest_name: self.manifest_name.clone(),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            degraded_policy: self.degraded_policy,
            prime_listing: self.prime_listing,
            ..SequencerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_retries: defaults.max_retries,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from `config_path`, or from the default
    /// location when none is given. A missing file yields the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_config_path(),
        };

        match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read configuration file {}", path.display())
                })?;
                toml::from_str(&content).context("Failed to parse configuration file")
            }
            _ => Ok(Self::default()),
        }
    }

    /// `<config_dir>/hlstl/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hlstl").join("config.toml"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
