use super::types::*;
use crate::config::{env_var_regex, expand_env_vars, expand_tilde, resolve_config_path};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// PutLogEvents accepts at most this many events per call.
pub const MAX_EVENTS_CEILING: usize = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let config = parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })?;

    Ok(config)
}

/// Load from the resolved config path, or fall back to defaults when no file exists.
pub fn load_or_default(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    match resolve_config_path(explicit) {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            load_config(&path)
        }
        None => {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Parse and validate a YAML document.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml)?;
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml_string)?
    };

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error.
/// Comment lines are skipped.
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = env_var_regex()?;
    let mut unexpanded_vars: Vec<String> = yaml_string
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| re.captures_iter(line).map(|cap| cap[1].to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn expand_paths(config: &mut Config) {
    config.state_file = expand_tilde(&config.state_file);
    config.reader.journalctl_path = expand_tilde(&config.reader.journalctl_path);
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.cloudwatch.log_group.trim().is_empty() {
        errors.push("cloudwatch.log_group cannot be empty".to_string());
    }
    if let Some(stream) = &config.cloudwatch.log_stream {
        if stream.trim().is_empty() {
            errors.push("cloudwatch.log_stream cannot be empty when set".to_string());
        }
    }
    if let Some(instance_id) = &config.instance_id {
        if instance_id.trim().is_empty() {
            errors.push("instance_id cannot be empty when set".to_string());
        }
    }
    if config.state_file.as_os_str().is_empty() {
        errors.push("state_file cannot be empty".to_string());
    }

    if config.reader.wait_timeout.is_zero() {
        errors.push("reader.wait_timeout must be greater than zero".to_string());
    }
    if config.shutdown_timeout.is_zero() {
        errors.push("shutdown_timeout must be greater than zero".to_string());
    }

    validate_batch(&config.batch, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_batch(batch: &BatchSection, errors: &mut Vec<String>) {
    if batch.max_payload_bytes == 0 {
        errors.push("batch.max_payload_bytes must be greater than zero".to_string());
    }
    if batch.max_events == 0 || batch.max_events > MAX_EVENTS_CEILING {
        errors.push(format!(
            "batch.max_events must be between 1 and {} (got {})",
            MAX_EVENTS_CEILING, batch.max_events
        ));
    }
    if batch.max_wait.is_zero() {
        errors.push("batch.max_wait must be greater than zero".to_string());
    }
    if batch.truncated_message_bytes >= batch.max_payload_bytes {
        errors.push(format!(
            "batch.truncated_message_bytes ({}) must be less than batch.max_payload_bytes ({})",
            batch.truncated_message_bytes, batch.max_payload_bytes
        ));
    }
}
