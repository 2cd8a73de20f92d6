use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// On-disk encoding of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Picks the format from the file extension; anything that is not
    /// `.yaml`/`.yml` is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
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
    let value: serde_json::Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_schema(&value)?;

    let config: Config = serde_json::from_value(value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let messages: Vec<String> = validator
        .iter_errors(value)
        .map(|e| e.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.directories.source.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "directories.source must not be empty".to_string(),
        });
    }
    if config.directories.destination.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "directories.destination must not be empty".to_string(),
        });
    }

    if config.processing.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "processing.worker_count must be at least 1".to_string(),
        });
    }

    let limits = &config.security.archive_limits;
    if limits.max_files == 0
        || limits.max_total_size == 0
        || limits.max_depth == 0
        || limits.max_file_size == 0
    {
        return Err(ConfigError::Validation {
            message: "security.archive_limits values must be positive".to_string(),
        });
    }

    let atomic = &config.atomic_move;
    if atomic.check_interval <= 0.0 || atomic.duration_seconds < 0.0 {
        return Err(ConfigError::Validation {
            message: "atomic_move intervals must be positive".to_string(),
        });
    }
    if atomic.check_interval > atomic.duration_seconds && atomic.duration_seconds > 0.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "atomic_move.check_interval ({}) must not exceed duration_seconds ({})",
                atomic.check_interval, atomic.duration_seconds
            ),
        });
    }

    for (key, category) in &config.categories {
        let destination = Path::new(&category.destination);
        if destination.is_absolute()
            || destination
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "category '{}' destination must be a relative path inside the destination root",
                    key
                ),
            });
        }
    }

    Ok(())
}
