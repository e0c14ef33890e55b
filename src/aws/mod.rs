//! AWS (Amazon Web Services) managers.
//!
//! Each submodule wraps one official SDK client in a `Manager` that logs its
//! calls, follows pagination, projects SDK output into small serializable
//! types, and maps SDK failures into [`crate::error::Error::Api`] with a
//! retryability flag.
//!
//! ## Authentication
//!
//! AWS credentials are loaded from the standard AWS credential chain:
//!
//! 1. Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`)
//! 2. AWS credentials file (`~/.aws/credentials`), optionally a named profile
//! 3. IAM instance profile (when running on EC2)
//! 4. ECS task role (when running in ECS)
//!
//! The region is taken from the infra configuration first and falls back to
//! the SDK default provider chain.

pub mod autoscaling;
pub mod cloudformation;
pub mod ec2;
pub mod kms;
pub mod s3;
pub mod ssm;
pub mod sts;

use crate::config::AwsConfig;
use crate::error::{Error, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Build the shared SDK configuration used by every manager.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let region_provider =
        RegionProviderChain::first_try(aws.region.clone().map(Region::new)).or_default_provider();

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
    if let Some(profile) = &aws.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &aws.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let config = loader.load().await;
    tracing::debug!(
        "loaded AWS config (region {:?}, profile {:?})",
        config.region(),
        aws.profile
    );
    config
}

/// Returns true when an SDK failure is transient.
///
/// Timeouts and unparseable responses are retryable; dispatch failures only
/// when the connector reports an I/O problem or a timeout.
#[inline]
pub fn is_sdk_err_retryable<E, R>(e: &SdkError<E, R>) -> bool {
    match e {
        SdkError::TimeoutError(_) | SdkError::ResponseError(_) => true,
        SdkError::DispatchFailure(e) => e.is_timeout() || e.is_io(),
        _ => false,
    }
}

/// Map an SDK failure into [`Error::Api`], tagging the operation name.
pub(crate) fn api_error<E, R>(operation: &str, e: SdkError<E, R>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let retryable = is_sdk_err_retryable(&e);
    Error::api(
        format!("failed {} {}", operation, DisplayErrorContext(&e)),
        retryable,
    )
}

/// Resource tags, ordered by key so table output is stable.
pub type Tags = BTreeMap<String, String>;

/// Parse a `KEY=VALUE` tag argument.
pub fn parse_tag(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(Error::InvalidInput(format!(
            "invalid tag '{}', expected KEY=VALUE",
            s
        ))),
    }
}

/// Normalize an SDK accessor to an `Option`.
///
/// Members the service model marks as required are exposed either as `T` or
/// as `Option<T>` depending on the protocol; this accepts both.
pub(crate) fn optional<T>(v: impl Into<Option<T>>) -> Option<T> {
    v.into()
}

/// Convert an SDK timestamp to chrono.
pub fn to_chrono(dt: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_smithy_runtime_api::client::result::ConnectorError;

    #[test]
    fn test_timeout_is_retryable() {
        let e: SdkError<std::io::Error, ()> = SdkError::timeout_error("request timed out");
        assert!(is_sdk_err_retryable(&e));
    }

    #[test]
    fn test_dispatch_failure_retryability() {
        let io: SdkError<std::io::Error, ()> =
            SdkError::dispatch_failure(ConnectorError::io("connection reset".into()));
        assert!(is_sdk_err_retryable(&io));

        let user: SdkError<std::io::Error, ()> =
            SdkError::dispatch_failure(ConnectorError::user("bad request".into()));
        assert!(!is_sdk_err_retryable(&user));
    }

    #[test]
    fn test_construction_failure_is_not_retryable() {
        let e: SdkError<std::io::Error, ()> = SdkError::construction_failure("missing field");
        assert!(!is_sdk_err_retryable(&e));
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(
            parse_tag("Name=web-1").unwrap(),
            ("Name".to_string(), "web-1".to_string())
        );
        assert_eq!(
            parse_tag("Env=").unwrap(),
            ("Env".to_string(), String::new())
        );
        assert!(parse_tag("novalue").is_err());
        assert!(parse_tag("=x").is_err());
    }

    #[test]
    fn test_optional_accepts_both_shapes() {
        assert_eq!(optional::<&str>("x"), Some("x"));
        assert_eq!(optional::<&str>(None), None);
        assert_eq!(optional::<i64>(Some(3)), Some(3));
    }

    #[test]
    fn test_to_chrono() {
        let dt = aws_smithy_types::DateTime::from_secs(1_700_000_000);
        assert_eq!(to_chrono(&dt).unwrap().timestamp(), 1_700_000_000);
    }
}
