//! CLI module for infra
//!
//! This module provides the command-line interface for infra,
//! including argument parsing and subcommand dispatch.

pub mod commands;
pub mod completions;
pub mod output;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use infra::config::{Config, LogFormat, OutputFormat};
use std::path::PathBuf;

/// infra - manage AWS resources from the command line
#[derive(Parser, Debug, Clone)]
#[command(name = "infra")]
#[command(version)]
#[command(
    about = "Manage EC2, S3, KMS, CloudFormation, SSM and Auto Scaling resources",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// AWS region (overrides config and AWS_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// AWS shared config profile
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Custom endpoint URL (e.g. LocalStack)
    #[arg(long, global = true)]
    pub endpoint_url: Option<String>,

    /// Output format
    #[arg(short = 'o', long, global = true)]
    pub output: Option<OutputFormat>,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "INFRA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log line format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Maximum retries for retryable API failures
    #[arg(long, global = true)]
    pub retries: Option<u32>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the caller identity
    Sts(commands::sts::StsArgs),

    /// EC2 instances, volumes and key pairs
    Ec2(commands::ec2::Ec2Args),

    /// S3 buckets and objects
    S3(commands::s3::S3Args),

    /// KMS keys and envelope encryption
    Kms(commands::kms::KmsArgs),

    /// CloudFormation stacks
    Cfn(commands::cfn::CfnArgs),

    /// SSM parameters and Run Command
    Ssm(commands::ssm::SsmArgs),

    /// Auto Scaling groups
    Asg(commands::asg::AsgArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for completions command
#[derive(Parser, Debug, Clone)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,

    /// Print installation instructions instead of the script
    #[arg(long)]
    pub instructions: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(region) = &self.region {
            config.aws.region = Some(region.clone());
        }
        if let Some(profile) = &self.profile {
            config.aws.profile = Some(profile.clone());
        }
        if let Some(endpoint) = &self.endpoint_url {
            config.aws.endpoint_url = Some(endpoint.clone());
        }
        if let Some(format) = self.output {
            config.output.format = format;
        }
        if self.no_color {
            config.output.color = false;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(retries) = self.retries {
            config.retry.max_retries = retries;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["infra", "sts", "whoami"]).unwrap();
        assert!(matches!(cli.command, Commands::Sts(_)));
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::try_parse_from(["infra", "-vvvv", "s3", "ls"]).unwrap();
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "infra", "ec2", "list", "--region", "eu-west-1", "-o", "json", "--retries", "0",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert_eq!(config.aws.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_no_color_override() {
        let cli = Cli::try_parse_from(["infra", "--no-color", "kms", "list"]).unwrap();
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert!(!config.output.color);
    }

    #[test]
    fn test_unknown_output_format_rejected() {
        assert!(Cli::try_parse_from(["infra", "-o", "xml", "sts", "whoami"]).is_err());
    }
}
