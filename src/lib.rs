//! # infra - AWS resource managers
//!
//! `infra` wraps the official AWS SDK clients in small, testable managers for
//! the resources an operator touches day to day: EC2 instances, volumes and
//! key pairs, S3 buckets and objects, KMS keys, CloudFormation stacks, SSM
//! parameters and commands, Auto Scaling groups, and the STS caller identity.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        infra CLI                             │
//! │             (clap parsing, table/json/yaml output)           │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Config + RetryPolicy + wait                  │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!       ┌──────────┬──────────┬─┴────────┬──────────┬──────────┐
//!       ▼          ▼          ▼          ▼          ▼          ▼
//!     ec2         s3         kms       cfn        ssm     autoscaling
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 AWS SDK for Rust (aws-sdk-*)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use infra::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load(None)?;
//!     let shared = load_sdk_config(&config.aws).await;
//!
//!     let ec2 = ec2::Manager::new(&shared);
//!     let policy = config.retry.policy();
//!     let instances = policy
//!         .execute(|| ec2.list_instances(&ec2::InstanceQuery::default()))
//!         .await?;
//!
//!     for instance in instances {
//!         println!("{} {}", instance.instance_id, instance.state);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aws;
pub mod config;
pub mod error;
pub mod humanize;
pub mod retry;
pub mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aws::{
        autoscaling, cloudformation, ec2, kms, load_sdk_config, parse_tag, s3, ssm, sts, Tags,
    };
    pub use crate::config::{Config, LogFormat, OutputFormat};
    pub use crate::error::{Error, Result};
    pub use crate::retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
    pub use crate::wait::{PollOptions, PollStatus};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
