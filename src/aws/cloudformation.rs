//! AWS CloudFormation manager.
//!
//! Stacks are created from an inline template body. Use
//! [`Manager::poll_stack`] to block until a stack reaches a desired status;
//! rollback and `*_FAILED` statuses end the wait early.

use crate::aws::{api_error, optional, to_chrono, Tags};
use crate::error::{Error, Result};
use crate::wait::{poll, PollOptions, PollStatus};
use aws_config::SdkConfig;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::operation::describe_stacks::DescribeStacksError;
use aws_sdk_cloudformation::types::{Capability, Parameter, StackStatus, Tag};
use aws_sdk_cloudformation::Client;
use aws_smithy_runtime_api::client::result::SdkError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest template accepted inline by CreateStack.
pub const MAX_TEMPLATE_BODY_BYTES: usize = 51_200;

/// Input for [`Manager::create_stack`].
#[derive(Debug, Clone, Default)]
pub struct CreateStack {
    pub name: String,
    pub template_body: String,
    pub parameters: Vec<(String, String)>,
    pub capabilities: Vec<String>,
    pub tags: Tags,
}

impl CreateStack {
    fn validate(&self) -> Result<Vec<Capability>> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("stack name must not be empty".into()));
        }
        if self.template_body.trim().is_empty() {
            return Err(Error::InvalidInput("template body is empty".into()));
        }
        if self.template_body.len() > MAX_TEMPLATE_BODY_BYTES {
            return Err(Error::InvalidInput(format!(
                "template body is {} bytes, the inline limit is {}",
                self.template_body.len(),
                MAX_TEMPLATE_BODY_BYTES
            )));
        }
        self.capabilities
            .iter()
            .map(|c| parse_capability(c))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

/// Projection of a described stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub id: String,
    pub name: String,
    pub status: String,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub outputs: Vec<StackOutput>,
}

impl From<&aws_sdk_cloudformation::types::Stack> for Stack {
    fn from(s: &aws_sdk_cloudformation::types::Stack) -> Self {
        Self {
            id: s.stack_id().unwrap_or_default().to_string(),
            name: optional::<&str>(s.stack_name())
                .unwrap_or_default()
                .to_string(),
            status: optional::<&StackStatus>(s.stack_status())
                .map(|st| st.as_str().to_string())
                .unwrap_or_default(),
            reason: s.stack_status_reason().map(String::from),
            description: s.description().map(String::from),
            created: optional::<&aws_smithy_types::DateTime>(s.creation_time()).and_then(to_chrono),
            outputs: s
                .outputs()
                .iter()
                .map(|o| StackOutput {
                    key: o.output_key().unwrap_or_default().to_string(),
                    value: o.output_value().unwrap_or_default().to_string(),
                    description: o.description().map(String::from),
                })
                .collect(),
        }
    }
}

/// Row of a stack listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub reason: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

impl From<&aws_sdk_cloudformation::types::StackSummary> for StackSummary {
    fn from(s: &aws_sdk_cloudformation::types::StackSummary) -> Self {
        Self {
            id: s.stack_id().unwrap_or_default().to_string(),
            name: optional::<&str>(s.stack_name())
                .unwrap_or_default()
                .to_string(),
            status: optional::<&StackStatus>(s.stack_status())
                .map(|st| st.as_str().to_string())
                .unwrap_or_default(),
            reason: s.stack_status_reason().map(String::from),
            created: optional::<&aws_smithy_types::DateTime>(s.creation_time()).and_then(to_chrono),
        }
    }
}

/// Parse `KEY=VALUE` stack parameters.
pub fn parse_parameters<S: AsRef<str>>(params: &[S]) -> Result<Vec<(String, String)>> {
    params
        .iter()
        .map(|p| {
            let p = p.as_ref();
            match p.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => {
                    Ok((k.trim().to_string(), v.to_string()))
                }
                _ => Err(Error::InvalidInput(format!(
                    "invalid parameter '{}', expected KEY=VALUE",
                    p
                ))),
            }
        })
        .collect()
}

/// Parse a capability such as `CAPABILITY_IAM`.
pub fn parse_capability(s: &str) -> Result<Capability> {
    let upper = s.trim().to_ascii_uppercase();
    if Capability::values().iter().any(|v| *v == upper) {
        Ok(Capability::from(upper.as_str()))
    } else {
        Err(Error::InvalidInput(format!(
            "unknown capability '{}', expected one of {}",
            s,
            Capability::values().join(", ")
        )))
    }
}

/// Decide the next poll step from the observed stack status.
pub fn stack_poll_status(current: &StackStatus, desired: &StackStatus) -> PollStatus<()> {
    if current == desired {
        return PollStatus::Done(());
    }
    match current {
        StackStatus::RollbackComplete
        | StackStatus::UpdateRollbackComplete
        | StackStatus::DeleteComplete => PollStatus::Failed(current.as_str().to_string()),
        s if s.as_str().ends_with("_FAILED") => PollStatus::Failed(s.as_str().to_string()),
        s => PollStatus::Pending(s.as_str().to_string()),
    }
}

fn is_stack_missing<R>(e: &SdkError<DescribeStacksError, R>) -> bool {
    e.as_service_error()
        .and_then(|se| se.message())
        .map_or(false, |m| m.contains("does not exist"))
}

/// Implements AWS CloudFormation manager.
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

    /// Creates a stack and returns its id.
    pub async fn create_stack(&self, input: &CreateStack) -> Result<String> {
        let capabilities = input.validate()?;
        tracing::info!(
            "creating stack '{}' ({} parameter(s), capabilities {:?})",
            input.name,
            input.parameters.len(),
            input.capabilities
        );

        let parameters = input
            .parameters
            .iter()
            .map(|(k, v)| {
                Parameter::builder()
                    .parameter_key(k)
                    .parameter_value(v)
                    .build()
            })
            .collect::<Vec<_>>();
        let tags = input
            .tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidInput(format!("invalid tag: {}", e)))?;

        let resp = self
            .cli
            .create_stack()
            .stack_name(&input.name)
            .template_body(&input.template_body)
            .set_parameters(if parameters.is_empty() {
                None
            } else {
                Some(parameters)
            })
            .set_capabilities(if capabilities.is_empty() {
                None
            } else {
                Some(capabilities)
            })
            .set_tags(if tags.is_empty() { None } else { Some(tags) })
            .send()
            .await
            .map_err(|e| api_error("create_stack", e))?;

        let stack_id = resp
            .stack_id()
            .ok_or_else(|| Error::other("create_stack returned no stack id"))?
            .to_string();
        tracing::info!("created stack '{}' ({})", input.name, stack_id);
        Ok(stack_id)
    }

    pub async fn delete_stack(&self, name: &str) -> Result<()> {
        tracing::info!("deleting stack '{}'", name);
        self.cli
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| api_error("delete_stack", e))?;
        tracing::info!("requested deletion of stack '{}'", name);
        Ok(())
    }

    async fn find_stack(&self, name: &str) -> Result<Option<Stack>> {
        let resp = match self.cli.describe_stacks().stack_name(name).send().await {
            Ok(v) => v,
            Err(e) if is_stack_missing(&e) => return Ok(None),
            Err(e) => return Err(api_error("describe_stacks", e)),
        };
        Ok(resp.stacks().first().map(Stack::from))
    }

    pub async fn describe_stack(&self, name: &str) -> Result<Stack> {
        tracing::info!("describing stack '{}'", name);
        self.find_stack(name)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("stack '{}' does not exist", name)))
    }

    /// Lists stack summaries; `active_only` hides deleted stacks.
    pub async fn list_stacks(&self, active_only: bool) -> Result<Vec<StackSummary>> {
        tracing::info!("listing stacks (active only {})", active_only);

        let filter = active_only.then(|| {
            StackStatus::values()
                .iter()
                .filter(|s| **s != StackStatus::DeleteComplete.as_str())
                .map(|s| StackStatus::from(*s))
                .collect::<Vec<_>>()
        });

        let mut stacks = Vec::new();
        let mut pages = self
            .cli
            .list_stacks()
            .set_stack_status_filter(filter)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error("list_stacks", e))?;
            stacks.extend(page.stack_summaries().iter().map(StackSummary::from));
        }

        tracing::info!("found {} stack(s)", stacks.len());
        Ok(stacks)
    }

    /// Polls the stack until it reaches `desired`.
    ///
    /// Waiting for `DELETE_COMPLETE` succeeds with `None` once the stack is
    /// gone.
    pub async fn poll_stack(
        &self,
        name: &str,
        desired: StackStatus,
        opts: &PollOptions,
    ) -> Result<Option<Stack>> {
        let description = format!("stack '{}' to reach {}", name, desired.as_str());
        poll(&description, opts, || {
            let desired = desired.clone();
            async move {
                let stack = match self.find_stack(name).await? {
                    Some(stack) => stack,
                    None if desired == StackStatus::DeleteComplete => {
                        return Ok(PollStatus::Done(None))
                    }
                    None => return Ok(PollStatus::Failed("stack does not exist".into())),
                };

                let current = StackStatus::from(stack.status.as_str());
                Ok(match stack_poll_status(&current, &desired) {
                    PollStatus::Done(()) => PollStatus::Done(Some(stack)),
                    PollStatus::Pending(s) => PollStatus::Pending(s),
                    PollStatus::Failed(s) => PollStatus::Failed(match &stack.reason {
                        Some(reason) => format!("{} ({})", s, reason),
                        None => s,
                    }),
                })
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameters() {
        let params = parse_parameters(&["Env=prod", "Url=http://x?a=b"]).unwrap();
        assert_eq!(
            params,
            vec![
                ("Env".to_string(), "prod".to_string()),
                ("Url".to_string(), "http://x?a=b".to_string()),
            ]
        );
        assert!(parse_parameters(&["broken"]).is_err());
        assert!(parse_parameters::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_capability() {
        assert_eq!(
            parse_capability("capability_named_iam").unwrap(),
            Capability::CapabilityNamedIam
        );
        assert!(parse_capability("CAPABILITY_EVERYTHING").is_err());
    }

    #[test]
    fn test_stack_poll_status() {
        let create_complete = StackStatus::CreateComplete;
        assert_eq!(
            stack_poll_status(&create_complete, &create_complete),
            PollStatus::Done(())
        );
        assert_eq!(
            stack_poll_status(&StackStatus::CreateInProgress, &create_complete),
            PollStatus::Pending("CREATE_IN_PROGRESS".to_string())
        );
        for failed in [
            StackStatus::CreateFailed,
            StackStatus::RollbackComplete,
            StackStatus::RollbackFailed,
            StackStatus::UpdateRollbackComplete,
        ] {
            assert!(matches!(
                stack_poll_status(&failed, &create_complete),
                PollStatus::Failed(_)
            ));
        }
        assert_eq!(
            stack_poll_status(&StackStatus::RollbackComplete, &StackStatus::RollbackComplete),
            PollStatus::Done(())
        );
        assert!(matches!(
            stack_poll_status(&StackStatus::DeleteInProgress, &StackStatus::DeleteComplete),
            PollStatus::Pending(_)
        ));
    }

    #[test]
    fn test_create_stack_validation() {
        let mut input = CreateStack {
            name: "web".into(),
            template_body: "{}".into(),
            capabilities: vec!["CAPABILITY_IAM".into()],
            ..Default::default()
        };
        assert_eq!(input.validate().unwrap(), vec![Capability::CapabilityIam]);

        input.template_body = " ".into();
        assert!(input.validate().is_err());

        input.template_body = "x".repeat(MAX_TEMPLATE_BODY_BYTES + 1);
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("inline limit"));

        input.template_body = "{}".into();
        input.name = String::new();
        assert!(input.validate().is_err());
    }
}
