//! Tests for configuration loading, file formats and environment overrides

use infra::config::{Config, LogFormat, OutputFormat};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use tempfile::{tempdir, NamedTempFile};

const ENV_KEYS: &[&str] = &[
    "INFRA_CONFIG",
    "INFRA_REGION",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "INFRA_PROFILE",
    "AWS_PROFILE",
    "INFRA_ENDPOINT_URL",
    "INFRA_OUTPUT",
    "NO_COLOR",
    "INFRA_NO_COLOR",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.output.format, OutputFormat::Table);
    assert!(config.output.color);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.poll.timeout, Duration::from_secs(900));
    assert_eq!(config.logging.format, LogFormat::Text);
    assert!(config.logging.level.is_none());
}

#[test]
fn test_load_toml_file() {
    let file = write_config(
        ".toml",
        r#"
[aws]
region = "eu-central-1"
profile = "ops"

[output]
format = "json"
color = false

[retry]
max_retries = 5
initial_delay = "250ms"
max_delay = "10s"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.aws.region.as_deref(), Some("eu-central-1"));
    assert_eq!(config.aws.profile.as_deref(), Some("ops"));
    assert_eq!(config.output.format, OutputFormat::Json);
    assert!(!config.output.color);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
    assert_eq!(config.retry.max_delay, Duration::from_secs(10));
}

#[test]
fn test_load_yaml_file() {
    let file = write_config(
        ".yaml",
        r#"
poll:
  interval: 3s
  timeout: 2m
logging:
  level: debug
  format: json
"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.poll.interval, Duration::from_secs(3));
    assert_eq!(config.poll.timeout, Duration::from_secs(120));
    assert_eq!(config.logging.level.as_deref(), Some("debug"));
    assert_eq!(config.logging.format, LogFormat::Json);

    let opts = config.poll.options();
    assert_eq!(opts.interval, Duration::from_secs(3));
    assert_eq!(opts.timeout, Duration::from_secs(120));
}

#[test]
fn test_load_json_file() {
    let file = write_config(
        ".json",
        r#"{"aws": {"endpoint_url": "http://localhost:4566"}, "output": {"format": "yaml"}}"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(
        config.aws.endpoint_url.as_deref(),
        Some("http://localhost:4566")
    );
    assert_eq!(config.output.format, OutputFormat::Yaml);
    // Untouched sections keep their defaults
    assert_eq!(config.retry.max_retries, 3);
}

#[test]
fn test_invalid_field_type_is_config_error() {
    let file = write_config(".toml", "[retry]\nmax_retries = \"many\"\n");

    let err = Config::from_file(file.path()).unwrap_err();
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_unparseable_file_is_config_error() {
    let file = write_config(".json", "{ not json");

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("configuration"));
}

#[test]
#[serial]
fn test_load_explicit_missing_path_fails() {
    clear_env();
    let temp = tempdir().unwrap();
    let path = temp.path().join("missing.toml");

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
#[serial]
fn test_load_explicit_path() {
    clear_env();
    let file = write_config(".toml", "[aws]\nregion = \"ap-southeast-2\"\n");

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.aws.region.as_deref(), Some("ap-southeast-2"));
}

#[test]
#[serial]
fn test_infra_config_env_selects_file() {
    clear_env();
    let file = write_config(".toml", "[retry]\nmax_retries = 9\n");
    std::env::set_var("INFRA_CONFIG", file.path());

    let config = Config::load(None).unwrap();
    assert_eq!(config.retry.max_retries, 9);

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let file = write_config(
        ".toml",
        "[aws]\nregion = \"us-east-1\"\nprofile = \"dev\"\n[output]\nformat = \"table\"\n",
    );

    std::env::set_var("INFRA_REGION", "eu-west-1");
    std::env::set_var("AWS_REGION", "us-west-2");
    std::env::set_var("INFRA_OUTPUT", "YAML");
    std::env::set_var("INFRA_ENDPOINT_URL", "http://localhost:4566");

    let config = Config::load(Some(file.path())).unwrap();

    // INFRA_REGION wins over AWS_REGION
    assert_eq!(config.aws.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.aws.profile.as_deref(), Some("dev"));
    assert_eq!(config.output.format, OutputFormat::Yaml);
    assert_eq!(
        config.aws.endpoint_url.as_deref(),
        Some("http://localhost:4566")
    );

    clear_env();
}

#[test]
#[serial]
fn test_aws_default_region_fallback() {
    clear_env();
    std::env::set_var("AWS_DEFAULT_REGION", "sa-east-1");

    let mut config = Config::default();
    config.apply_env_overrides();
    assert_eq!(config.aws.region.as_deref(), Some("sa-east-1"));

    clear_env();
}

#[test]
#[serial]
fn test_unknown_output_env_is_ignored() {
    clear_env();
    std::env::set_var("INFRA_OUTPUT", "xml");

    let mut config = Config::default();
    config.apply_env_overrides();
    assert_eq!(config.output.format, OutputFormat::Table);

    clear_env();
}

#[test]
#[serial]
fn test_no_color_env() {
    clear_env();
    std::env::set_var("NO_COLOR", "1");

    let mut config = Config::default();
    config.apply_env_overrides();
    assert!(!config.output.color);

    clear_env();
}
