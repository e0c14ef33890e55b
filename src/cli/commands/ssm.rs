//! SSM command - Parameter Store and Run Command

use super::CommandContext;
use crate::cli::output::{or_dash, state_cell};
use anyhow::Result;
use aws_sdk_ssm::types::{CommandInvocationStatus, ParameterType};
use clap::{Parser, Subcommand};
use infra::aws::ssm::{self, Parameter, SHELL_DOCUMENT};
use tabled::Tabled;

/// Arguments for the ssm command
#[derive(Parser, Debug, Clone)]
pub struct SsmArgs {
    #[command(subcommand)]
    pub action: SsmAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SsmAction {
    /// Print a parameter value
    Get(GetArgs),

    /// Write a parameter
    Put(PutArgs),

    /// Delete a parameter
    Rm(NameArgs),

    /// List parameters under a path
    Ls(LsArgs),

    /// Run shell commands on an instance
    Run(RunArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct GetArgs {
    /// Parameter name
    pub name: String,

    /// Decrypt SecureString values
    #[arg(long)]
    pub decrypt: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PutArgs {
    /// Parameter name
    pub name: String,

    /// Parameter value
    pub value: String,

    /// Store as SecureString
    #[arg(long, conflicts_with = "list")]
    pub secure: bool,

    /// Store as StringList
    #[arg(long)]
    pub list: bool,

    /// Replace an existing value
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct NameArgs {
    /// Parameter name
    pub name: String,
}

#[derive(Parser, Debug, Clone)]
pub struct LsArgs {
    /// Path such as /app/prod
    pub path: String,

    /// Include nested paths
    #[arg(long, short = 'r')]
    pub recursive: bool,

    /// Decrypt SecureString values
    #[arg(long)]
    pub decrypt: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Target instance id
    pub instance_id: String,

    /// Commands to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub commands: Vec<String>,

    /// SSM document
    #[arg(long, default_value = SHELL_DOCUMENT)]
    pub document: String,

    /// Wait for the command and print its output
    #[arg(long)]
    pub wait: bool,
}

#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Version")]
    version: i64,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

impl PutArgs {
    fn kind(&self) -> ParameterType {
        if self.secure {
            ParameterType::SecureString
        } else if self.list {
            ParameterType::StringList
        } else {
            ParameterType::String
        }
    }
}

impl SsmArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let manager = ssm::Manager::new(&ctx.sdk);

        match &self.action {
            SsmAction::Get(args) => {
                let param = ctx
                    .retry
                    .execute(|| manager.get_parameter(&args.name, args.decrypt))
                    .await?;
                if ctx.output.is_table() {
                    ctx.output.raw(&param.value);
                } else {
                    ctx.output.record(&param, &[])?;
                }
            }
            SsmAction::Put(args) => {
                let version = ctx
                    .retry
                    .execute(|| {
                        manager.put_parameter(&args.name, &args.value, args.kind(), args.overwrite)
                    })
                    .await?;
                ctx.output
                    .success(&format!("stored '{}' version {}", args.name, version));
            }
            SsmAction::Rm(args) => {
                ctx.retry
                    .execute(|| manager.delete_parameter(&args.name))
                    .await?;
                ctx.output.success(&format!("deleted '{}'", args.name));
            }
            SsmAction::Ls(args) => {
                let params = ctx
                    .retry
                    .execute(|| {
                        manager.get_parameters_by_path(&args.path, args.recursive, args.decrypt)
                    })
                    .await?;
                ctx.output.list(&params, |p: &Parameter| ParameterRow {
                    name: p.name.clone(),
                    kind: p.kind.clone(),
                    version: p.version,
                    value: if p.kind == ParameterType::SecureString.as_str() && !args.decrypt {
                        "********".to_string()
                    } else {
                        p.value.clone()
                    },
                    modified: or_dash(p.last_modified.map(|c| c.format("%Y-%m-%d %H:%M"))),
                })?;
            }
            SsmAction::Run(args) => {
                let instance_ids = vec![args.instance_id.clone()];
                let command_id = manager
                    .send_command(&args.document, &instance_ids, &args.commands)
                    .await?;
                ctx.output.success(&format!(
                    "sent command '{}' to '{}'",
                    command_id, args.instance_id
                ));

                if !args.wait {
                    if !ctx.output.is_table() {
                        ctx.output
                            .record(&serde_json::json!({ "command_id": command_id }), &[])?;
                    }
                    return Ok(0);
                }

                let result = manager
                    .poll_command(
                        &command_id,
                        &args.instance_id,
                        CommandInvocationStatus::Success,
                        &ctx.poll,
                    )
                    .await;

                let output = match result {
                    Ok(output) => output,
                    Err(e) => {
                        // Show what the command printed before failing.
                        if let Ok(output) = manager
                            .get_command_output(&command_id, &args.instance_id)
                            .await
                        {
                            if !output.stderr.is_empty() {
                                ctx.output.warning("command stderr follows");
                                eprint!("{}", output.stderr);
                            }
                        }
                        return Err(e.into());
                    }
                };

                if ctx.output.is_table() {
                    print!("{}", output.stdout);
                    if !output.stderr.is_empty() {
                        eprint!("{}", output.stderr);
                    }
                    ctx.output.note(&format!(
                        "status {} exit code {}",
                        state_cell(&output.status),
                        output.response_code
                    ));
                } else {
                    ctx.output.record(&output, &[])?;
                }
            }
        }

        Ok(0)
    }
}
