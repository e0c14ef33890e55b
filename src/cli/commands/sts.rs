//! STS command - caller identity

use super::CommandContext;
use anyhow::Result;
use clap::{Parser, Subcommand};
use infra::aws::sts;

/// Arguments for the sts command
#[derive(Parser, Debug, Clone)]
pub struct StsArgs {
    #[command(subcommand)]
    pub action: StsAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StsAction {
    /// Print the account, ARN and user id of the current credentials
    Whoami,
}

impl StsArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let manager = sts::Manager::new(&ctx.sdk);
        match self.action {
            StsAction::Whoami => {
                let identity = ctx.retry.execute(|| manager.get_identity()).await?;
                ctx.output.record(
                    &identity,
                    &[
                        ("Account", identity.account_id.clone()),
                        ("ARN", identity.role_arn.clone()),
                        ("UserId", identity.user_id.clone()),
                        ("Region", ctx.region()),
                    ],
                )?;
            }
        }
        Ok(0)
    }
}
