//! Configuration module for infra
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/infra/config.toml)
//! - User configuration (~/.infra/config.toml)
//! - Project configuration (./infra.toml)
//! - Environment variables
//!
//! Command-line flags are applied last by the binary.

use crate::error::{Error, Result};
use crate::retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
use crate::wait::PollOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AWS connection settings
    pub aws: AwsConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Retry settings for API calls
    pub retry: RetryConfig,

    /// Wait/poll settings
    pub poll: PollConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// AWS connection settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Region, falls back to the SDK default provider chain when unset
    pub region: Option<String>,

    /// Named profile from ~/.aws/config
    pub profile: Option<String>,

    /// Endpoint override (LocalStack and friends)
    pub endpoint_url: Option<String>,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Table,
    /// JSON for scripting
    Json,
    /// YAML output
    Yaml,
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format
    pub format: OutputFormat,

    /// Enable colored output
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Table,
            color: true,
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for a single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryConfig {
    /// Build the retry policy described by this section.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(self.initial_delay)
            .max_delay(self.max_delay)
            .backoff(BackoffStrategy::Exponential { multiplier: 2.0 })
            .jitter(JitterStrategy::Equal)
            .build()
    }
}

/// Wait/poll settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Time between two status checks
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Give up after this long
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(900),
        }
    }
}

impl PollConfig {
    /// Poll options for wait loops.
    pub fn options(&self) -> PollOptions {
        PollOptions::new(self.timeout, self.interval)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset and no -v flag is given
    pub level: Option<String>,

    /// Log line format
    pub format: LogFormat,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::Value::Object(serde_json::Map::new());

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                tracing::debug!("loading config from {}", path.display());
                merge_values(&mut merged, read_value(&path)?);
            } else if config_path.is_some() {
                return Err(Error::Config {
                    path,
                    message: "file does not exist".to_string(),
                });
            }
        }

        let mut config: Config =
            serde_json::from_value(merged).map_err(|e| Error::Config {
                path: config_path.map(Path::to_path_buf).unwrap_or_default(),
                message: e.to_string(),
            })?;

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load from a single file without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        serde_json::from_value(read_value(path)?).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        if let Ok(env_config) = std::env::var("INFRA_CONFIG") {
            return vec![PathBuf::from(env_config)];
        }

        let mut paths = vec![PathBuf::from("/etc/infra/config.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".infra/config.toml"));
        }

        paths.push(PathBuf::from("infra.toml"));

        paths
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(region) = first_env(&["INFRA_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"]) {
            self.aws.region = Some(region);
        }

        if let Some(profile) = first_env(&["INFRA_PROFILE", "AWS_PROFILE"]) {
            self.aws.profile = Some(profile);
        }

        if let Ok(url) = std::env::var("INFRA_ENDPOINT_URL") {
            self.aws.endpoint_url = Some(url);
        }

        if let Ok(format) = std::env::var("INFRA_OUTPUT") {
            match format.to_lowercase().as_str() {
                "table" => self.output.format = OutputFormat::Table,
                "json" => self.output.format = OutputFormat::Json,
                "yaml" | "yml" => self.output.format = OutputFormat::Yaml,
                other => tracing::warn!("ignoring unknown INFRA_OUTPUT value '{}'", other),
            }
        }

        if std::env::var("NO_COLOR").is_ok() || std::env::var("INFRA_NO_COLOR").is_ok() {
            self.output.color = false;
        }
    }
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.is_empty())
}

/// Read a config file into a format-neutral value tree
fn read_value(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let parse_err = |message: String| Error::Config {
        path: path.to_path_buf(),
        message,
    };

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension {
        "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string())),
        "toml" => toml::from_str::<toml::Value>(&content)
            .map_err(|e| parse_err(e.to_string()))
            .and_then(|v| serde_json::to_value(v).map_err(|e| parse_err(e.to_string()))),
        _ => match toml::from_str::<toml::Value>(&content) {
            Ok(v) => serde_json::to_value(v).map_err(|e| parse_err(e.to_string())),
            Err(_) => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string())),
        },
    }
}

/// Deep-merge `overlay` into `base`; tables merge key by key, everything else replaces
fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.output.format, OutputFormat::Table);
        assert!(config.output.color);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.poll.interval, Duration::from_secs(10));
        assert!(config.aws.region.is_none());
    }

    #[test]
    fn test_merge_values_is_deep() {
        let mut base = json!({"aws": {"region": "us-east-1", "profile": "dev"}});
        merge_values(&mut base, json!({"aws": {"region": "eu-west-1"}}));
        assert_eq!(base["aws"]["region"], "eu-west-1");
        assert_eq!(base["aws"]["profile"], "dev");
    }

    #[test]
    fn test_humantime_durations() {
        let config: Config = toml::from_str(
            r#"
            [poll]
            interval = "2s"
            timeout = "5m"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert_eq!(config.poll.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = RetryConfig {
            max_retries: 7,
            ..RetryConfig::default()
        };
        assert_eq!(config.policy().max_retries, 7);
    }
}
