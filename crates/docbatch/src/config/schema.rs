use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Directory scanned by `start` when no explicit paths are given.
    #[serde(default)]
    pub input_directory: Option<String>,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    /// Where session state files live. Falls back to the platform data dir.
    #[serde(default)]
    pub state_directory: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_per_batch")]
    pub max_per_batch: usize,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub processing: ProcessingSettings,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_output_directory() -> String {
    "docbatch-output".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_per_batch() -> usize {
    10
}

fn default_batch_timeout_secs() -> u64 {
    2 * 60 * 60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_monitor_interval_ms() -> u64 {
    1000
}

fn default_extensions() -> Vec<String> {
    ["pdf", "txt", "md", "docx", "xml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            input_directory: None,
            output_directory: default_output_directory(),
            state_directory: None,
            worker_count: default_worker_count(),
            max_per_batch: default_max_per_batch(),
            batch_timeout_secs: default_batch_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            extensions: default_extensions(),
            exclude: Vec::new(),
            retry: RetryConfig::default(),
            backup: BackupConfig::default(),
            processing: ProcessingSettings::default(),
        }
    }
}

impl Config {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Resolved state directory: explicit setting, else `<data dir>/docbatch`.
    pub fn state_dir(&self) -> PathBuf {
        match &self.state_directory {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir(),
        }
    }
}

pub fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docbatch")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total supervisor runs per session invocation, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default = "default_max_count")]
    pub max_count: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_age_days() -> u32 {
    7
}

fn default_max_count() -> usize {
    20
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: default_max_age_days(),
            max_count: default_max_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    #[default]
    Text,
    Command,
}

/// Settings handed to every worker. `extra` is passed through untouched to
/// the processor (model parameters, prompt names, pricing tier, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessingSettings {
    #[serde(default)]
    pub processor: ProcessorKind,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
