//! Subcommands module for the infra CLI
//!
//! One module per AWS service group. Every command runs its SDK calls
//! through the configured [`RetryPolicy`].

pub mod asg;
pub mod cfn;
pub mod ec2;
pub mod kms;
pub mod s3;
pub mod ssm;
pub mod sts;

use crate::cli::output::OutputFormatter;
use aws_config::SdkConfig;
use infra::config::Config;
use infra::retry::RetryPolicy;
use infra::wait::PollOptions;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration after CLI overrides
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Shared AWS SDK configuration
    pub sdk: SdkConfig,
    /// Retry policy for API calls
    pub retry: RetryPolicy,
    /// Timing for `--wait`
    pub poll: PollOptions,
}

impl CommandContext {
    /// Create a new command context from the effective configuration
    pub fn new(config: Config, sdk: SdkConfig, verbosity: u8) -> Self {
        let output = OutputFormatter::new(config.output.format, config.output.color, verbosity);

        Self {
            retry: config.retry.policy(),
            poll: config.poll.options(),
            output,
            sdk,
            config,
        }
    }

    /// Region the SDK resolved, for messages
    pub fn region(&self) -> String {
        self.sdk
            .region()
            .map(|r| r.to_string())
            .or_else(|| self.config.aws.region.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
