//! AWS EC2 Auto Scaling manager.

use crate::aws::is_sdk_err_retryable;
use crate::error::{Error, Result};
use aws_config::SdkConfig;
use aws_sdk_autoscaling::operation::set_desired_capacity::SetDesiredCapacityError;
use aws_sdk_autoscaling::operation::set_instance_health::SetInstanceHealthError;
use aws_sdk_autoscaling::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Health status reported to the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Unhealthy => "Unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            _ => Err(Error::InvalidInput(format!(
                "invalid health status '{}', expected Healthy or Unhealthy",
                s
            ))),
        }
    }
}

/// Another scaling request holds the group.
pub fn is_contention_set_instance_health(e: &SetInstanceHealthError) -> bool {
    matches!(e, SetInstanceHealthError::ResourceContentionFault(_))
}

pub fn is_contention_set_desired_capacity(e: &SetDesiredCapacityError) -> bool {
    matches!(
        e,
        SetDesiredCapacityError::ResourceContentionFault(_)
            | SetDesiredCapacityError::ScalingActivityInProgressFault(_)
    )
}

/// Implements AWS EC2 autoscaling manager.
#[derive(Debug, Clone)]
pub struct Manager {
    cli: Client,
}

impl Manager {
    pub fn new(shared_config: &SdkConfig) -> Self {
        Self {
            cli: Client::new(shared_config),
        }
    }

    pub fn client(&self) -> Client {
        self.cli.clone()
    }

    /// Sets the instance health: "Healthy" or "Unhealthy".
    pub async fn set_instance_health(&self, instance_id: &str, status: HealthStatus) -> Result<()> {
        tracing::info!(
            "setting instance health for '{}' with {}",
            instance_id,
            status
        );
        self.cli
            .set_instance_health()
            .instance_id(instance_id)
            .health_status(status.as_str())
            .send()
            .await
            .map_err(|e| {
                let contention = e
                    .as_service_error()
                    .map_or(false, is_contention_set_instance_health);
                Error::api(
                    format!("failed set_instance_health {}", DisplayErrorContext(&e)),
                    is_sdk_err_retryable(&e) || contention,
                )
            })?;

        tracing::info!(
            "successfully set instance health for '{}' with {}",
            instance_id,
            status
        );
        Ok(())
    }

    pub async fn set_desired_capacity(
        &self,
        group: &str,
        capacity: i32,
        honor_cooldown: bool,
    ) -> Result<()> {
        if capacity < 0 {
            return Err(Error::InvalidInput(format!(
                "desired capacity must not be negative, got {}",
                capacity
            )));
        }
        tracing::info!(
            "setting desired capacity of '{}' to {} (honor cooldown {})",
            group,
            capacity,
            honor_cooldown
        );
        self.cli
            .set_desired_capacity()
            .auto_scaling_group_name(group)
            .desired_capacity(capacity)
            .honor_cooldown(honor_cooldown)
            .send()
            .await
            .map_err(|e| {
                let contention = e
                    .as_service_error()
                    .map_or(false, is_contention_set_desired_capacity);
                Error::api(
                    format!("failed set_desired_capacity {}", DisplayErrorContext(&e)),
                    is_sdk_err_retryable(&e) || contention,
                )
            })?;

        tracing::info!("set desired capacity of '{}' to {}", group, capacity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_autoscaling::types::error::{
        ResourceContentionFault, ScalingActivityInProgressFault,
    };

    #[test]
    fn test_health_status_parse() {
        assert_eq!("healthy".parse::<HealthStatus>().unwrap(), HealthStatus::Healthy);
        assert_eq!(
            "Unhealthy".parse::<HealthStatus>().unwrap(),
            HealthStatus::Unhealthy
        );
        assert!("sick".parse::<HealthStatus>().is_err());
        assert_eq!(HealthStatus::Unhealthy.to_string(), "Unhealthy");
    }

    #[test]
    fn test_contention_is_detected() {
        let e = SetInstanceHealthError::ResourceContentionFault(
            ResourceContentionFault::builder()
                .message("another request is in progress")
                .build(),
        );
        assert!(is_contention_set_instance_health(&e));

        let e = SetDesiredCapacityError::ScalingActivityInProgressFault(
            ScalingActivityInProgressFault::builder().build(),
        );
        assert!(is_contention_set_desired_capacity(&e));
    }
}
