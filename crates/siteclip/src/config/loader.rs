use std::path::Path;

use crate::config::schema::ClipConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClipConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ClipConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: ClipConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &ClipConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "batch_size must be at least 1".to_string(),
        });
    }

    let thresholds = &config.thresholds;
    if !(thresholds.max_percentage > 0.0 && thresholds.max_area_ha > 0.0) {
        return Err(ConfigError::Validation {
            message: format!(
                "Thresholds must be positive (max_percentage={}, max_area_ha={})",
                thresholds.max_percentage, thresholds.max_area_ha
            ),
        });
    }

    if !(config.buffer_epsilon.is_finite() && config.buffer_epsilon > 0.0) {
        return Err(ConfigError::Validation {
            message: format!(
                "buffer_epsilon must be finite and positive, got {}",
                config.buffer_epsilon
            ),
        });
    }

    if let Some(url) = &config.notifications.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation {
                message: format!("webhook_url must be an http(s) URL: {}", url),
            });
        }
    }

    Ok(())
}
