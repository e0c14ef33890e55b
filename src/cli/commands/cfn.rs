//! CloudFormation command - stacks

use super::CommandContext;
use crate::cli::output::{or_dash, state_cell};
use anyhow::{Context, Result};
use aws_sdk_cloudformation::types::StackStatus;
use clap::{Parser, Subcommand};
use infra::aws::cloudformation::{self, parse_parameters, CreateStack, StackSummary};
use infra::aws::{parse_tag, Tags};
use std::path::PathBuf;
use tabled::Tabled;

/// Arguments for the cfn command
#[derive(Parser, Debug, Clone)]
pub struct CfnArgs {
    #[command(subcommand)]
    pub action: CfnAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CfnAction {
    /// List stacks
    List(ListArgs),

    /// Describe a stack and its outputs
    Describe(StackArgs),

    /// Create a stack from a template file
    Create(CreateArgs),

    /// Delete a stack
    Delete(DeleteArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Include deleted stacks
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StackArgs {
    /// Stack name or id
    pub name: String,
}

#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Stack name
    pub name: String,

    /// Template file (JSON or YAML)
    #[arg(long = "template-file")]
    pub template_file: PathBuf,

    /// Parameter KEY=VALUE; repeatable
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Capability such as CAPABILITY_IAM; repeatable
    #[arg(long = "capability")]
    pub capabilities: Vec<String>,

    /// Tag KEY=VALUE; repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Wait for CREATE_COMPLETE
    #[arg(long)]
    pub wait: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Stack name or id
    pub name: String,

    /// Wait for DELETE_COMPLETE
    #[arg(long)]
    pub wait: bool,
}

#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl CfnArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let manager = cloudformation::Manager::new(&ctx.sdk);

        match &self.action {
            CfnAction::List(args) => {
                let stacks = ctx
                    .retry
                    .execute(|| manager.list_stacks(!args.all))
                    .await?;
                ctx.output.list(&stacks, |s: &StackSummary| StackRow {
                    name: s.name.clone(),
                    status: state_cell(&s.status),
                    created: or_dash(s.created.map(|c| c.format("%Y-%m-%d %H:%M"))),
                    reason: or_dash(s.reason.as_ref()),
                })?;
            }
            CfnAction::Describe(args) => {
                let stack = ctx
                    .retry
                    .execute(|| manager.describe_stack(&args.name))
                    .await?;
                ctx.output.record(
                    &stack,
                    &[
                        ("Name", stack.name.clone()),
                        ("Id", stack.id.clone()),
                        ("Status", state_cell(&stack.status)),
                        ("Reason", or_dash(stack.reason.as_ref())),
                        ("Description", or_dash(stack.description.as_ref())),
                        ("Created", or_dash(stack.created)),
                    ],
                )?;
                if ctx.output.is_table() && !stack.outputs.is_empty() {
                    println!();
                    ctx.output.list(&stack.outputs, |o: &cloudformation::StackOutput| {
                        OutputRow {
                            key: o.key.clone(),
                            value: o.value.clone(),
                        }
                    })?;
                }
            }
            CfnAction::Create(args) => {
                let template_body = std::fs::read_to_string(&args.template_file).with_context(
                    || format!("reading template {}", args.template_file.display()),
                )?;
                let tags = args
                    .tags
                    .iter()
                    .map(|t| parse_tag(t))
                    .collect::<infra::error::Result<Tags>>()?;
                let input = CreateStack {
                    name: args.name.clone(),
                    template_body,
                    parameters: parse_parameters(args.params.as_slice())?,
                    capabilities: args.capabilities.clone(),
                    tags,
                };

                let stack_id = manager.create_stack(&input).await?;
                ctx.output
                    .success(&format!("creating stack '{}' ({})", args.name, stack_id));

                if args.wait {
                    manager
                        .poll_stack(&args.name, StackStatus::CreateComplete, &ctx.poll)
                        .await?;
                    ctx.output
                        .success(&format!("stack '{}' is CREATE_COMPLETE", args.name));
                }
            }
            CfnAction::Delete(args) => {
                ctx.retry
                    .execute(|| manager.delete_stack(&args.name))
                    .await?;
                ctx.output
                    .success(&format!("deleting stack '{}'", args.name));

                if args.wait {
                    manager
                        .poll_stack(&args.name, StackStatus::DeleteComplete, &ctx.poll)
                        .await?;
                    ctx.output
                        .success(&format!("stack '{}' is DELETE_COMPLETE", args.name));
                }
            }
        }

        Ok(0)
    }
}
