use std::path::Path;

use crate::config::schema::{Config, ProcessorKind, CONFIG_VERSION};
use crate::error::ConfigError;

pub const ENV_STATE_DIR: &str = "DOCBATCH_STATE_DIR";
pub const ENV_WORKERS: &str = "DOCBATCH_WORKERS";
pub const ENV_MAX_PER_BATCH: &str = "DOCBATCH_MAX_PER_BATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let config: Config = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config)?;

    Ok(config)
}

/// Applies `DOCBATCH_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        if !dir.trim().is_empty() {
            config.state_directory = Some(dir);
        }
    }
    if let Some(workers) = parse_env_usize(ENV_WORKERS)? {
        config.worker_count = workers;
    }
    if let Some(max) = parse_env_usize(ENV_MAX_PER_BATCH)? {
        config.max_per_batch = max;
    }
    validate_config(config)
}

fn parse_env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.max_per_batch == 0 {
        return Err(ConfigError::Validation {
            message: "max_per_batch must be at least 1".to_string(),
        });
    }

    if config.batch_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "batch_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.poll_interval_ms == 0 || config.monitor_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "poll and monitor intervals must be positive".to_string(),
        });
    }

    if config.output_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "output_directory must not be empty".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if !config.retry.backoff_factor.is_finite() || config.retry.backoff_factor < 1.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.backoff_factor must be a finite number >= 1.0, got {}",
                config.retry.backoff_factor
            ),
        });
    }

    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        return Err(ConfigError::Validation {
            message: "retry.max_delay_ms must not be smaller than retry.base_delay_ms".to_string(),
        });
    }

    if config.backup.enabled && config.backup.max_count == 0 {
        return Err(ConfigError::Validation {
            message: "backup.max_count must be at least 1 when backups are enabled".to_string(),
        });
    }

    for pattern in &config.exclude {
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(ConfigError::Validation {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
            });
        }
    }

    if config.processing.processor == ProcessorKind::Command
        && config.processing.command.is_empty()
    {
        return Err(ConfigError::Validation {
            message: "processing.command is required when processing.processor is 'command'"
                .to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_load_valid_json_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "input_directory": "/input",
            "output_directory": "/output",
            "worker_count": 4,
            "max_per_batch": 10
        }
        "#;

        let config = load_config_from_str(config_json, ConfigFormat::Json).unwrap();
        assert_eq!(config.input_directory.as_deref(), Some("/input"));
        assert_eq!(config.output_directory, "/output");
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_per_batch, 10);
    }

    #[test]
    fn test_load_valid_yaml_config() {
        let config_yaml = r#"
version: "1.0"
output_directory: /output
worker_count: 2
retry:
  max_attempts: 5
processing:
  processor: command
  command: ["python", "screen.py", "{document}"]
  model: gpt-4o-mini
"#;

        let config = load_config_from_str(config_yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.processing.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let result = load_config_from_str(r#"{"version": "2.0"}"#, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let result = load_config_from_str(r#"{"worker_count": 0}"#, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_rejects_command_processor_without_command() {
        let result = load_config_from_str(
            r#"{"processing": {"processor": "command"}}"#,
            ConfigFormat::Json,
        );
        match result {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("processing.command"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_backoff() {
        let result = load_config_from_str(
            r#"{"retry": {"backoff_factor": 0.5}}"#,
            ConfigFormat::Json,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/docbatch.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(ENV_WORKERS, "3");
        std::env::set_var(ENV_STATE_DIR, "/tmp/docbatch-state");
        let mut config = Config::default();
        apply_env_overrides(&mut config).unwrap();
        std::env::remove_var(ENV_WORKERS);
        std::env::remove_var(ENV_STATE_DIR);

        assert_eq!(config.worker_count, 3);
        assert_eq!(config.state_directory.as_deref(), Some("/tmp/docbatch-state"));
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_number() {
        std::env::set_var(ENV_MAX_PER_BATCH, "many");
        let mut config = Config::default();
        let result = apply_env_overrides(&mut config);
        std::env::remove_var(ENV_MAX_PER_BATCH);

        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }
}
