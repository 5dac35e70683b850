use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content)?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

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

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let endpoint = config.model.endpoint.as_str();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("Model endpoint must be an http(s) URL: {}", endpoint),
        });
    }

    if config.chunking.max_files_per_chunk == 0 || config.chunking.max_chars_per_chunk == 0 {
        return Err(ConfigError::Validation {
            message: "Chunk limits must be positive".to_string(),
        });
    }

    if config.retry.max_retries == 0 {
        return Err(ConfigError::Validation {
            message: "maxRetries must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.model.name, "gemini-2.5-flash");
        assert_eq!(config.model.api_key_env_var.as_deref(), Some("GEMINI_API_KEY"));
        assert_eq!(config.model.request_timeout_secs, 300);
        assert_eq!(config.chunking.max_files_per_chunk, 20);
        assert_eq!(config.chunking.max_chars_per_chunk, 40_000);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.database_path().ends_with("repaircode.db"));
    }

    #[test]
    fn test_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "dataDirectory": "/var/lib/repaircode",
            "databasePath": "/var/lib/repaircode/jobs.db",
            "model": {
                "name": "gemini-2.5-pro",
                "endpoint": "http://localhost:8080/v1beta",
                "apiKeyFile": "/run/secrets/gemini",
                "apiKeyEnvVar": null,
                "requestTimeoutSecs": 60
            },
            "chunking": { "maxFilesPerChunk": 5, "maxCharsPerChunk": 1000 },
            "retry": { "maxRetries": 2 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.data_dir(), Path::new("/var/lib/repaircode"));
        assert_eq!(config.database_path(), Path::new("/var/lib/repaircode/jobs.db"));
        assert_eq!(config.model.name, "gemini-2.5-pro");
        assert_eq!(config.model.api_key_env_var, None);
        assert_eq!(config.chunking.max_files_per_chunk, 5);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_unknown_field_rejected_by_schema() {
        let result = load_config_from_str(r#"{ "version": "1.0", "workers": 4 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "chunking": { "maxFilesPerChunk": 0 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "model": { "endpoint": "ftp://models" } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/definitely/not/here/repaircode.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
