//! CLI tests for infra
//!
//! These only exercise paths that finish before any AWS call is made:
//! argument parsing, help output, completions, configuration errors and
//! local input validation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

// Helper to get a command with a pinned region and no ambient config
fn infra_cmd() -> Command {
    let mut cmd = Command::cargo_bin("infra").unwrap();
    cmd.env("AWS_REGION", "us-east-1")
        .env("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .env("AWS_SECRET_ACCESS_KEY", "secret")
        .env("AWS_EC2_METADATA_DISABLED", "true")
        .env("NO_COLOR", "1")
        .env_remove("INFRA_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

#[test]
fn test_version_flag() {
    infra_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("infra"));
}

#[test]
fn test_help_lists_service_groups() {
    infra_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ec2")
                .and(predicate::str::contains("s3"))
                .and(predicate::str::contains("kms"))
                .and(predicate::str::contains("cfn"))
                .and(predicate::str::contains("ssm"))
                .and(predicate::str::contains("asg")),
        );
}

#[test]
fn test_no_command_fails() {
    infra_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_subcommand_help() {
    infra_cmd()
        .args(["s3", "sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run").and(predicate::str::contains("--delete")));
}

// =============================================================================
// Argument Validation Tests
// =============================================================================

#[test]
fn test_invalid_output_format() {
    infra_cmd()
        .args(["-o", "xml", "sts", "whoami"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xml"));
}

#[test]
fn test_ec2_start_requires_ids() {
    infra_cmd()
        .args(["ec2", "start"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_asg_rejects_unknown_health() {
    infra_cmd()
        .args(["asg", "set-health", "i-0123456789abcdef0", "sick"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sick"));
}

#[test]
fn test_ssm_put_secure_conflicts_with_list() {
    infra_cmd()
        .args(["ssm", "put", "/app/key", "value", "--secure", "--list"])
        .assert()
        .failure();
}

// =============================================================================
// Local Validation Tests (exit code 4 = invalid input)
// =============================================================================

#[test]
fn test_sync_missing_directory() {
    let temp = tempdir().unwrap();
    let missing = temp.path().join("nope");

    infra_cmd()
        .args(["s3", "sync"])
        .arg(&missing)
        .arg("s3://my-bucket/site")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_s3_ls_rejects_non_s3_url() {
    infra_cmd()
        .args(["s3", "ls", "https://example.com/x"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not an s3:// URL"));
}

#[test]
fn test_s3_mb_rejects_bad_bucket_name() {
    infra_cmd()
        .args(["s3", "mb", "Bad_Bucket"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("invalid bucket name"));
}

#[test]
fn test_kms_delete_rejects_short_window() {
    infra_cmd()
        .args(["kms", "delete", "1234abcd-12ab-34cd-56ef-1234567890ab", "--days", "3"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("pending window"));
}

#[test]
fn test_kms_decrypt_rejects_bad_base64() {
    infra_cmd()
        .args(["kms", "decrypt", "!!not-base64!!"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("base64"));
}

#[test]
fn test_cfn_create_rejects_bad_parameter() {
    let temp = tempdir().unwrap();
    let template = temp.path().join("stack.yaml");
    std::fs::write(&template, "Resources: {}\n").unwrap();

    infra_cmd()
        .args(["cfn", "create", "web", "--template-file"])
        .arg(&template)
        .args(["--param", "broken"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_cfn_create_rejects_unknown_capability() {
    let temp = tempdir().unwrap();
    let template = temp.path().join("stack.yaml");
    std::fs::write(&template, "Resources: {}\n").unwrap();

    infra_cmd()
        .args(["cfn", "create", "web", "--template-file"])
        .arg(&template)
        .args(["--capability", "CAPABILITY_EVERYTHING"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("unknown capability"));
}

#[test]
fn test_ec2_create_key_pair_refuses_existing_file() {
    let temp = tempdir().unwrap();
    let key = temp.path().join("existing.pem");
    std::fs::write(&key, "old").unwrap();

    infra_cmd()
        .args(["ec2", "create-key-pair", "ops", "--out"])
        .arg(&key)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_ssm_ls_requires_absolute_path() {
    infra_cmd()
        .args(["ssm", "ls", "app/prod"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("must start with '/'"));
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_missing_explicit_config_fails() {
    let temp = tempdir().unwrap();

    infra_cmd()
        .arg("--config")
        .arg(temp.path().join("missing.toml"))
        .args(["s3", "ls", "not-a-url"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_malformed_config_fails() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("infra.toml");
    std::fs::write(&path, "[retry]\nmax_retries = \"many\"\n").unwrap();

    infra_cmd()
        .arg("--config")
        .arg(&path)
        .args(["s3", "ls", "not-a-url"])
        .assert()
        .code(5);
}

// =============================================================================
// Completions Tests
// =============================================================================

#[test]
fn test_completions_bash() {
    infra_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("infra"));
}

#[test]
fn test_completions_instructions() {
    infra_cmd()
        .args(["completions", "zsh", "--instructions"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_infra"));
}
