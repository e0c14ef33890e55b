//! AWS STS manager.

use crate::aws::api_error;
use crate::error::Result;
use aws_config::SdkConfig;
use aws_sdk_sts::Client;
use serde::{Deserialize, Serialize};

/// Identity of the caller as reported by STS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: String,
    pub role_arn: String,
    pub user_id: String,
}

/// Implements AWS STS manager.
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

    /// Queries the AWS caller identity from the default credentials.
    pub async fn get_identity(&self) -> Result<Identity> {
        tracing::info!("fetching STS caller identity");
        let resp = self
            .cli
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| api_error("get_caller_identity", e))?;

        let identity = Identity {
            account_id: resp.account().unwrap_or_default().to_string(),
            role_arn: resp.arn().unwrap_or_default().to_string(),
            user_id: resp.user_id().unwrap_or_default().to_string(),
        };
        tracing::info!(
            "caller is {} in account {}",
            identity.role_arn,
            identity.account_id
        );
        Ok(identity)
    }
}
