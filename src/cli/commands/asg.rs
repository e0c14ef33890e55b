//! Auto Scaling command - instance health and capacity

use super::CommandContext;
use anyhow::Result;
use clap::{Parser, Subcommand};
use infra::aws::autoscaling::{self, HealthStatus};

/// Arguments for the asg command
#[derive(Parser, Debug, Clone)]
pub struct AsgArgs {
    #[command(subcommand)]
    pub action: AsgAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AsgAction {
    /// Report an instance as healthy or unhealthy
    #[command(name = "set-health")]
    SetHealth(SetHealthArgs),

    /// Set the desired capacity of a group
    #[command(name = "set-capacity")]
    SetCapacity(SetCapacityArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct SetHealthArgs {
    /// Instance id
    pub instance_id: String,

    /// healthy or unhealthy
    pub status: HealthStatus,
}

#[derive(Parser, Debug, Clone)]
pub struct SetCapacityArgs {
    /// Auto Scaling group name
    pub group: String,

    /// Desired number of instances
    pub capacity: i32,

    /// Reject the change while the group is in cooldown
    #[arg(long)]
    pub honor_cooldown: bool,
}

impl AsgArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let manager = autoscaling::Manager::new(&ctx.sdk);

        match &self.action {
            AsgAction::SetHealth(args) => {
                ctx.retry
                    .execute(|| manager.set_instance_health(&args.instance_id, args.status))
                    .await?;
                ctx.output.success(&format!(
                    "instance '{}' marked {}",
                    args.instance_id, args.status
                ));
            }
            AsgAction::SetCapacity(args) => {
                ctx.retry
                    .execute(|| {
                        manager.set_desired_capacity(
                            &args.group,
                            args.capacity,
                            args.honor_cooldown,
                        )
                    })
                    .await?;
                ctx.output.success(&format!(
                    "desired capacity of '{}' set to {}",
                    args.group, args.capacity
                ));
            }
        }

        Ok(0)
    }
}
