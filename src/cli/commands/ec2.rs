//! EC2 command - instances, volumes and key pairs

use super::CommandContext;
use crate::cli::output::{or_dash, state_cell};
use anyhow::{Context, Result};
use aws_sdk_ec2::types::{InstanceStateName, KeyType};
use clap::{Parser, Subcommand, ValueEnum};
use infra::aws::ec2::{self, Instance, InstanceQuery, KeyPair, StateChange, Volume};
use infra::aws::parse_tag;
use std::path::PathBuf;
use tabled::Tabled;

/// Arguments for the ec2 command
#[derive(Parser, Debug, Clone)]
pub struct Ec2Args {
    #[command(subcommand)]
    pub action: Ec2Action,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Ec2Action {
    /// List instances
    List(ListArgs),

    /// Start instances
    Start(StateArgs),

    /// Stop instances
    Stop(StopArgs),

    /// Terminate instances
    Terminate(StateArgs),

    /// List EBS volumes
    Volumes,

    /// List key pairs
    #[command(name = "key-pairs")]
    KeyPairs,

    /// Create a key pair and save the private key
    #[command(name = "create-key-pair")]
    CreateKeyPair(CreateKeyPairArgs),

    /// Delete a key pair
    #[command(name = "delete-key-pair")]
    DeleteKeyPair(DeleteKeyPairArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Filter by state (running, stopped, ...); repeatable
    #[arg(long = "state")]
    pub states: Vec<String>,

    /// Filter by tag KEY=VALUE; repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Filter by instance id; repeatable
    #[arg(long = "id")]
    pub ids: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct StateArgs {
    /// Instance ids
    #[arg(required = true)]
    pub instance_ids: Vec<String>,

    /// Wait until every instance reaches the target state
    #[arg(long)]
    pub wait: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StopArgs {
    #[command(flatten)]
    pub target: StateArgs,

    /// Force the instances to stop
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    Rsa,
    Ed25519,
}

impl From<KeyKind> for KeyType {
    fn from(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Rsa => KeyType::Rsa,
            KeyKind::Ed25519 => KeyType::Ed25519,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CreateKeyPairArgs {
    /// Key pair name
    pub name: String,

    /// Where to write the private key (must not exist)
    #[arg(long = "out")]
    pub out: PathBuf,

    /// Key algorithm
    #[arg(long = "type", value_enum, default_value = "ed25519")]
    pub key_type: KeyKind,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteKeyPairArgs {
    /// Key pair name
    pub name: String,
}

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    instance_type: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "AZ")]
    az: String,
    #[tabled(rename = "Private IP")]
    private_ip: String,
    #[tabled(rename = "Public IP")]
    public_ip: String,
    #[tabled(rename = "Age")]
    age: String,
}

fn instance_row(i: &Instance) -> InstanceRow {
    let now = chrono::Utc::now();
    InstanceRow {
        id: i.instance_id.clone(),
        name: or_dash(i.name.as_ref()),
        instance_type: i.instance_type.clone(),
        state: state_cell(&i.state),
        az: or_dash(i.availability_zone.as_ref()),
        private_ip: or_dash(i.private_ip.as_ref()),
        public_ip: or_dash(i.public_ip.as_ref()),
        age: or_dash(i.launch_time.map(|t| infra::humanize::age(t, now))),
    }
}

#[derive(Tabled)]
struct StateChangeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Previous")]
    previous: String,
    #[tabled(rename = "Current")]
    current: String,
}

#[derive(Tabled)]
struct VolumeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Type")]
    volume_type: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "AZ")]
    az: String,
    #[tabled(rename = "Attached To")]
    attached_to: String,
    #[tabled(rename = "Encrypted")]
    encrypted: bool,
}

#[derive(Tabled)]
struct KeyPairRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    key_type: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

fn key_pair_row(k: &KeyPair) -> KeyPairRow {
    KeyPairRow {
        name: k.key_name.clone(),
        id: k.key_pair_id.clone(),
        key_type: k.key_type.clone(),
        fingerprint: k.fingerprint.clone(),
    }
}

impl ListArgs {
    fn query(&self) -> Result<InstanceQuery> {
        let tags = self
            .tags
            .iter()
            .map(|t| parse_tag(t))
            .collect::<infra::error::Result<Vec<_>>>()?;
        Ok(InstanceQuery {
            ids: self.ids.clone(),
            states: self.states.clone(),
            tags,
        })
    }
}

impl Ec2Args {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let manager = ec2::Manager::new(&ctx.sdk);

        match &self.action {
            Ec2Action::List(args) => {
                let query = args.query()?;
                let instances = ctx
                    .retry
                    .execute(|| manager.list_instances(&query))
                    .await?;
                ctx.output.list(&instances, instance_row)?;
            }
            Ec2Action::Start(args) => {
                let changes = ctx
                    .retry
                    .execute(|| manager.start_instances(&args.instance_ids))
                    .await?;
                report_changes(ctx, &changes)?;
                if args.wait {
                    wait_all(ctx, &manager, &args.instance_ids, InstanceStateName::Running).await?;
                }
            }
            Ec2Action::Stop(args) => {
                let changes = ctx
                    .retry
                    .execute(|| manager.stop_instances(&args.target.instance_ids, args.force))
                    .await?;
                report_changes(ctx, &changes)?;
                if args.target.wait {
                    wait_all(
                        ctx,
                        &manager,
                        &args.target.instance_ids,
                        InstanceStateName::Stopped,
                    )
                    .await?;
                }
            }
            Ec2Action::Terminate(args) => {
                let changes = ctx
                    .retry
                    .execute(|| manager.terminate_instances(&args.instance_ids))
                    .await?;
                report_changes(ctx, &changes)?;
                if args.wait {
                    wait_all(
                        ctx,
                        &manager,
                        &args.instance_ids,
                        InstanceStateName::Terminated,
                    )
                    .await?;
                }
            }
            Ec2Action::Volumes => {
                let volumes = ctx
                    .retry
                    .execute(|| manager.describe_volumes(Vec::new()))
                    .await?;
                ctx.output.list(&volumes, |v: &Volume| VolumeRow {
                    id: v.volume_id.clone(),
                    size: infra::humanize::bytes(u64::try_from(v.size).unwrap_or(0) << 30),
                    volume_type: v.volume_type.clone(),
                    state: state_cell(&v.state),
                    az: or_dash(v.availability_zone.as_ref()),
                    attached_to: or_dash(v.attached_to.as_ref()),
                    encrypted: v.encrypted,
                })?;
            }
            Ec2Action::KeyPairs => {
                let keys = ctx.retry.execute(|| manager.describe_key_pairs()).await?;
                ctx.output.list(&keys, key_pair_row)?;
            }
            Ec2Action::CreateKeyPair(args) => {
                let key = manager
                    .create_key_pair(&args.name, args.key_type.into(), &args.out)
                    .await
                    .with_context(|| format!("creating key pair '{}'", args.name))?;
                ctx.output.list(std::slice::from_ref(&key), key_pair_row)?;
                ctx.output.success(&format!(
                    "private key written to {}",
                    args.out.display()
                ));
            }
            Ec2Action::DeleteKeyPair(args) => {
                ctx.retry
                    .execute(|| manager.delete_key_pair(&args.name))
                    .await?;
                ctx.output
                    .success(&format!("deleted key pair '{}'", args.name));
            }
        }

        Ok(0)
    }
}

fn report_changes(ctx: &CommandContext, changes: &[StateChange]) -> Result<()> {
    ctx.output.list(changes, |c: &StateChange| StateChangeRow {
        id: c.instance_id.clone(),
        previous: state_cell(&c.previous),
        current: state_cell(&c.current),
    })
}

async fn wait_all(
    ctx: &CommandContext,
    manager: &ec2::Manager,
    instance_ids: &[String],
    desired: InstanceStateName,
) -> Result<()> {
    for id in instance_ids {
        manager
            .poll_instance_state(id, desired.clone(), &ctx.poll)
            .await?;
        ctx.output
            .success(&format!("instance '{}' is {}", id, desired.as_str()));
    }
    Ok(())
}
