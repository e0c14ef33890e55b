//! AWS SSM manager: Parameter Store and Run Command.

use crate::aws::{api_error, optional, to_chrono};
use crate::error::{Error, Result};
use crate::wait::{poll, PollOptions, PollStatus};
use aws_config::SdkConfig;
use aws_sdk_ssm::operation::delete_parameter::DeleteParameterError;
use aws_sdk_ssm::operation::get_command_invocation::GetCommandInvocationError;
use aws_sdk_ssm::operation::get_parameter::GetParameterError;
use aws_sdk_ssm::types::{CommandInvocationStatus, ParameterType};
use aws_sdk_ssm::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document used by [`Manager::send_command`] callers for plain shell commands.
pub const SHELL_DOCUMENT: &str = "AWS-RunShellScript";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    pub kind: String,
    pub version: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl From<&aws_sdk_ssm::types::Parameter> for Parameter {
    fn from(p: &aws_sdk_ssm::types::Parameter) -> Self {
        Self {
            name: p.name().unwrap_or_default().to_string(),
            value: p.value().unwrap_or_default().to_string(),
            kind: p
                .r#type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            version: optional::<i64>(p.version()).unwrap_or_default(),
            last_modified: p.last_modified_date().and_then(to_chrono),
        }
    }
}

/// Result of one command invocation on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub command_id: String,
    pub instance_id: String,
    pub status: String,
    pub response_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Decide the next poll step from the observed invocation status.
///
/// `Cancelled` and `TimedOut` are terminal as well as `Failed`; each only
/// satisfies a wait that asked for it.
pub fn command_poll_status(
    current: &CommandInvocationStatus,
    desired: &CommandInvocationStatus,
) -> PollStatus<()> {
    if current == desired {
        return PollStatus::Done(());
    }
    match current {
        CommandInvocationStatus::Failed
        | CommandInvocationStatus::Cancelled
        | CommandInvocationStatus::TimedOut => {
            PollStatus::Failed(format!("command invocation {}", current.as_str()))
        }
        s => PollStatus::Pending(s.as_str().to_string()),
    }
}

/// Implements AWS SSM manager.
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

    pub async fn get_parameter(&self, name: &str, decrypt: bool) -> Result<Parameter> {
        tracing::info!("getting parameter '{}' (decrypt {})", name, decrypt);
        let resp = match self
            .cli
            .get_parameter()
            .name(name)
            .with_decryption(decrypt)
            .send()
            .await
        {
            Ok(v) => v,
            Err(e) => {
                if matches!(
                    e.as_service_error(),
                    Some(GetParameterError::ParameterNotFound(_))
                ) {
                    return Err(Error::InvalidInput(format!(
                        "parameter '{}' not found",
                        name
                    )));
                }
                return Err(api_error("get_parameter", e));
            }
        };

        resp.parameter()
            .map(Parameter::from)
            .ok_or_else(|| Error::other("get_parameter returned no parameter"))
    }

    /// Writes a parameter and returns the new version.
    pub async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        kind: ParameterType,
        overwrite: bool,
    ) -> Result<i64> {
        tracing::info!(
            "putting parameter '{}' (type {}, overwrite {})",
            name,
            kind.as_str(),
            overwrite
        );
        let resp = self
            .cli
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(kind)
            .overwrite(overwrite)
            .send()
            .await
            .map_err(|e| api_error("put_parameter", e))?;

        let version = optional::<i64>(resp.version()).unwrap_or_default();
        tracing::info!("stored parameter '{}' version {}", name, version);
        Ok(version)
    }

    pub async fn delete_parameter(&self, name: &str) -> Result<()> {
        tracing::info!("deleting parameter '{}'", name);
        match self.cli.delete_parameter().name(name).send().await {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(DeleteParameterError::ParameterNotFound(_))
                ) =>
            {
                Err(Error::InvalidInput(format!(
                    "parameter '{}' not found",
                    name
                )))
            }
            Err(e) => Err(api_error("delete_parameter", e)),
        }
    }

    /// Lists parameters under a path such as `/app/prod`.
    pub async fn get_parameters_by_path(
        &self,
        path: &str,
        recursive: bool,
        decrypt: bool,
    ) -> Result<Vec<Parameter>> {
        if !path.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "parameter path '{}' must start with '/'",
                path
            )));
        }
        tracing::info!("listing parameters under '{}' (recursive {})", path, recursive);

        let mut params = Vec::new();
        let mut pages = self
            .cli
            .get_parameters_by_path()
            .path(path)
            .recursive(recursive)
            .with_decryption(decrypt)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error("get_parameters_by_path", e))?;
            params.extend(page.parameters().iter().map(Parameter::from));
        }

        tracing::info!("found {} parameter(s)", params.len());
        Ok(params)
    }

    /// Sends `commands` through `document` and returns the command id.
    pub async fn send_command(
        &self,
        document: &str,
        instance_ids: &[String],
        commands: &[String],
    ) -> Result<String> {
        if instance_ids.is_empty() {
            return Err(Error::InvalidInput("no instance ids given".into()));
        }
        if commands.is_empty() {
            return Err(Error::InvalidInput("no commands given".into()));
        }
        tracing::info!(
            "sending {} command(s) via '{}' to {:?}",
            commands.len(),
            document,
            instance_ids
        );

        let resp = self
            .cli
            .send_command()
            .document_name(document)
            .set_instance_ids(Some(instance_ids.to_vec()))
            .parameters("commands", commands.to_vec())
            .send()
            .await
            .map_err(|e| api_error("send_command", e))?;

        let command_id = resp
            .command()
            .and_then(|c| c.command_id())
            .ok_or_else(|| Error::other("send_command returned no command id"))?
            .to_string();
        tracing::info!("sent command '{}'", command_id);
        Ok(command_id)
    }

    /// Fetches the invocation; `None` while SSM has not registered it yet.
    async fn find_invocation(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> Result<Option<CommandOutput>> {
        let resp = match self
            .cli
            .get_command_invocation()
            .command_id(command_id)
            .instance_id(instance_id)
            .send()
            .await
        {
            Ok(v) => v,
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(GetCommandInvocationError::InvocationDoesNotExist(_))
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(api_error("get_command_invocation", e)),
        };

        Ok(Some(CommandOutput {
            command_id: command_id.to_string(),
            instance_id: instance_id.to_string(),
            status: resp
                .status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            response_code: optional::<i32>(resp.response_code()).unwrap_or(-1),
            stdout: resp.standard_output_content().unwrap_or_default().to_string(),
            stderr: resp.standard_error_content().unwrap_or_default().to_string(),
        }))
    }

    pub async fn get_command_output(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> Result<CommandOutput> {
        tracing::info!(
            "getting output of command '{}' on '{}'",
            command_id,
            instance_id
        );
        self.find_invocation(command_id, instance_id)
            .await?
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "no invocation of command '{}' on '{}'",
                    command_id, instance_id
                ))
            })
    }

    /// Polls the invocation of `command_id` on `instance_id` until it reaches
    /// `desired`.
    pub async fn poll_command(
        &self,
        command_id: &str,
        instance_id: &str,
        desired: CommandInvocationStatus,
        opts: &PollOptions,
    ) -> Result<CommandOutput> {
        let description = format!(
            "command '{}' on '{}' to reach {}",
            command_id,
            instance_id,
            desired.as_str()
        );
        poll(&description, opts, || {
            let desired = desired.clone();
            async move {
                let output = match self.find_invocation(command_id, instance_id).await? {
                    Some(output) => output,
                    None => return Ok(PollStatus::Pending("not registered".into())),
                };
                let current = CommandInvocationStatus::from(output.status.as_str());
                Ok(match command_poll_status(&current, &desired) {
                    PollStatus::Done(()) => PollStatus::Done(output),
                    PollStatus::Pending(s) => PollStatus::Pending(s),
                    PollStatus::Failed(s) => PollStatus::Failed(s),
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
    fn test_command_poll_status() {
        let success = CommandInvocationStatus::Success;
        assert_eq!(command_poll_status(&success, &success), PollStatus::Done(()));
        assert_eq!(
            command_poll_status(&CommandInvocationStatus::InProgress, &success),
            PollStatus::Pending("InProgress".to_string())
        );
        assert_eq!(
            command_poll_status(&CommandInvocationStatus::Failed, &success),
            PollStatus::Failed("command invocation Failed".to_string())
        );
        assert!(matches!(
            command_poll_status(&CommandInvocationStatus::Cancelled, &success),
            PollStatus::Failed(_)
        ));
    }

    #[test]
    fn test_waiting_for_failed_accepts_failed() {
        let failed = CommandInvocationStatus::Failed;
        assert_eq!(command_poll_status(&failed, &failed), PollStatus::Done(()));
        assert!(matches!(
            command_poll_status(&CommandInvocationStatus::Pending, &failed),
            PollStatus::Pending(_)
        ));
    }
}
