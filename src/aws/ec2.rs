//! AWS EC2 manager for instances, volumes and key pairs.
//!
//! ## Instances
//!
//! Instances are looked up with [`InstanceQuery`], which compiles ids, state
//! names and `KEY=VALUE` tag pairs into EC2 describe filters. Start, stop and
//! terminate return the state transition reported by EC2; use
//! [`Manager::poll_instance_state`] to block until the transition finishes.
//!
//! ## Key pairs
//!
//! [`Manager::create_key_pair`] writes the private key to disk with mode 0400
//! and refuses to overwrite an existing file.

use crate::aws::{api_error, to_chrono, Tags};
use crate::error::{Error, Result};
use crate::wait::{poll, PollOptions, PollStatus};
use aws_config::SdkConfig;
use aws_sdk_ec2::types::{Filter, InstanceStateChange, InstanceStateName, KeyType};
use aws_sdk_ec2::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Selection criteria for [`Manager::list_instances`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceQuery {
    /// Restrict to these instance ids
    pub ids: Vec<String>,
    /// Restrict to these state names (`running`, `stopped`, ...)
    pub states: Vec<String>,
    /// Every pair must match the instance tags
    pub tags: Vec<(String, String)>,
}

impl InstanceQuery {
    /// Compile the query into EC2 describe filters.
    pub fn filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();

        if !self.ids.is_empty() {
            filters.push(
                Filter::builder()
                    .name("instance-id")
                    .set_values(Some(self.ids.clone()))
                    .build(),
            );
        }

        if !self.states.is_empty() {
            filters.push(
                Filter::builder()
                    .name("instance-state-name")
                    .set_values(Some(self.states.clone()))
                    .build(),
            );
        }

        for (key, value) in &self.tags {
            filters.push(
                Filter::builder()
                    .name(format!("tag:{}", key))
                    .values(value)
                    .build(),
            );
        }

        filters
    }
}

/// Projection of an EC2 instance for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub name: Option<String>,
    pub instance_type: String,
    pub state: String,
    pub availability_zone: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub launch_time: Option<DateTime<Utc>>,
    pub tags: Tags,
}

impl From<&aws_sdk_ec2::types::Instance> for Instance {
    fn from(instance: &aws_sdk_ec2::types::Instance) -> Self {
        let tags: Tags = instance
            .tags()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect();

        Self {
            instance_id: instance.instance_id().unwrap_or_default().to_string(),
            name: tags.get("Name").cloned(),
            instance_type: instance
                .instance_type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            state: instance
                .state()
                .and_then(|s| s.name())
                .map(|n| n.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            availability_zone: instance
                .placement()
                .and_then(|p| p.availability_zone())
                .map(str::to_string),
            private_ip: instance.private_ip_address().map(str::to_string),
            public_ip: instance.public_ip_address().map(str::to_string),
            launch_time: instance.launch_time().and_then(to_chrono),
            tags,
        }
    }
}

/// State transition reported by start/stop/terminate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub instance_id: String,
    pub previous: String,
    pub current: String,
}

impl From<&InstanceStateChange> for StateChange {
    fn from(change: &InstanceStateChange) -> Self {
        let name = |s: Option<&aws_sdk_ec2::types::InstanceState>| {
            s.and_then(|s| s.name())
                .map(|n| n.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        Self {
            instance_id: change.instance_id().unwrap_or_default().to_string(),
            previous: name(change.previous_state()),
            current: name(change.current_state()),
        }
    }
}

/// Projection of an EBS volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub volume_id: String,
    /// Size in GiB
    pub size: i32,
    pub volume_type: String,
    pub state: String,
    pub availability_zone: Option<String>,
    pub attached_to: Option<String>,
    pub encrypted: bool,
}

impl From<&aws_sdk_ec2::types::Volume> for Volume {
    fn from(v: &aws_sdk_ec2::types::Volume) -> Self {
        Self {
            volume_id: v.volume_id().unwrap_or_default().to_string(),
            size: v.size().unwrap_or_default(),
            volume_type: v
                .volume_type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            state: v
                .state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            availability_zone: v.availability_zone().map(str::to_string),
            attached_to: v
                .attachments()
                .iter()
                .find_map(|a| a.instance_id())
                .map(str::to_string),
            encrypted: v.encrypted().unwrap_or(false),
        }
    }
}

/// Projection of an EC2 key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub key_name: String,
    pub key_pair_id: String,
    pub fingerprint: String,
    pub key_type: String,
}

/// Decide the next poll step from the observed instance state.
///
/// A missing instance only satisfies a wait for `terminated`; reaching
/// `terminated` while waiting for anything else is a failure.
pub fn instance_poll_status(
    current: Option<&InstanceStateName>,
    desired: &InstanceStateName,
) -> PollStatus<()> {
    match current {
        None if *desired == InstanceStateName::Terminated => PollStatus::Done(()),
        None => PollStatus::Failed("instance not found".to_string()),
        Some(c) if c == desired => PollStatus::Done(()),
        Some(InstanceStateName::Terminated) => {
            PollStatus::Failed("instance terminated unexpectedly".to_string())
        }
        Some(c) => PollStatus::Pending(c.as_str().to_string()),
    }
}

/// Create a new private key file, owner read-only on Unix.
///
/// Fails with [`Error::InvalidInput`] when the path already exists.
pub async fn create_key_file(key_path: &Path) -> Result<tokio::fs::File> {
    if let Some(parent) = key_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o400);

    options.open(key_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Error::InvalidInput(format!("key path '{}' already exists", key_path.display()))
        } else {
            Error::io(key_path, e)
        }
    })
}

async fn discard_key_file(key_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(key_path).await {
        tracing::warn!("could not remove '{}': {}", key_path.display(), e);
    }
}

/// Implements AWS EC2 manager.
#[derive(Debug, Clone)]
pub struct Manager {
    pub region: String,
    cli: Client,
}

impl Manager {
    pub fn new(shared_config: &SdkConfig) -> Self {
        Self {
            region: shared_config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            cli: Client::new(shared_config),
        }
    }

    pub fn client(&self) -> Client {
        self.cli.clone()
    }

    /// Describes instances matching the filters, following pagination.
    pub async fn describe_instances(&self, filters: Vec<Filter>) -> Result<Vec<Instance>> {
        tracing::info!("describing instances in region '{}'", self.region);

        let mut pages = self
            .cli
            .describe_instances()
            .set_filters(if filters.is_empty() { None } else { Some(filters) })
            .into_paginator()
            .send();

        let mut instances = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error("describe_instances", e))?;
            for reservation in page.reservations() {
                instances.extend(reservation.instances().iter().map(Instance::from));
            }
        }

        tracing::info!("found {} instance(s)", instances.len());
        Ok(instances)
    }

    /// Lists instances selected by the query.
    pub async fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<Instance>> {
        self.describe_instances(query.filters()).await
    }

    /// Fetches a single instance, `None` if EC2 no longer reports it.
    pub async fn describe_instance(&self, instance_id: &str) -> Result<Option<Instance>> {
        let query = InstanceQuery {
            ids: vec![instance_id.to_string()],
            ..Default::default()
        };
        Ok(self.list_instances(&query).await?.into_iter().next())
    }

    pub async fn start_instances(&self, instance_ids: &[String]) -> Result<Vec<StateChange>> {
        tracing::info!("starting instances {:?}", instance_ids);
        let resp = self
            .cli
            .start_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("start_instances", e))?;
        Ok(resp.starting_instances().iter().map(StateChange::from).collect())
    }

    pub async fn stop_instances(
        &self,
        instance_ids: &[String],
        force: bool,
    ) -> Result<Vec<StateChange>> {
        tracing::info!("stopping instances {:?} (force {})", instance_ids, force);
        let resp = self
            .cli
            .stop_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .force(force)
            .send()
            .await
            .map_err(|e| api_error("stop_instances", e))?;
        Ok(resp.stopping_instances().iter().map(StateChange::from).collect())
    }

    pub async fn terminate_instances(&self, instance_ids: &[String]) -> Result<Vec<StateChange>> {
        tracing::info!("terminating instances {:?}", instance_ids);
        let resp = self
            .cli
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("terminate_instances", e))?;
        Ok(resp
            .terminating_instances()
            .iter()
            .map(StateChange::from)
            .collect())
    }

    /// Polls the instance until it reaches `desired`.
    ///
    /// Returns the final instance, or `None` when waiting for termination and
    /// the instance has already disappeared.
    pub async fn poll_instance_state(
        &self,
        instance_id: &str,
        desired: InstanceStateName,
        opts: &PollOptions,
    ) -> Result<Option<Instance>> {
        let description = format!("instance '{}' {}", instance_id, desired.as_str());
        poll(&description, opts, || {
            let desired = desired.clone();
            async move {
                let instance = self.describe_instance(instance_id).await?;
                let current = instance
                    .as_ref()
                    .map(|i| InstanceStateName::from(i.state.as_str()));
                Ok(match instance_poll_status(current.as_ref(), &desired) {
                    PollStatus::Done(()) => PollStatus::Done(instance),
                    PollStatus::Pending(s) => PollStatus::Pending(s),
                    PollStatus::Failed(s) => PollStatus::Failed(s),
                })
            }
        })
        .await
    }

    /// Describes EBS volumes matching the filters, following pagination.
    pub async fn describe_volumes(&self, filters: Vec<Filter>) -> Result<Vec<Volume>> {
        tracing::info!("describing volumes in region '{}'", self.region);

        let mut pages = self
            .cli
            .describe_volumes()
            .set_filters(if filters.is_empty() { None } else { Some(filters) })
            .into_paginator()
            .send();

        let mut volumes = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error("describe_volumes", e))?;
            volumes.extend(page.volumes().iter().map(Volume::from));
        }

        tracing::info!("found {} volume(s)", volumes.len());
        Ok(volumes)
    }

    /// Creates a key pair and saves the private key to `key_path`.
    ///
    /// The key file is created before the API call, so a path that cannot be
    /// written never leaves an orphaned key pair behind.
    pub async fn create_key_pair(
        &self,
        key_name: &str,
        key_type: KeyType,
        key_path: &Path,
    ) -> Result<KeyPair> {
        let mut file = create_key_file(key_path).await?;

        tracing::info!("creating EC2 key pair '{}'", key_name);
        let resp = match self
            .cli
            .create_key_pair()
            .key_name(key_name)
            .key_type(key_type.clone())
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                discard_key_file(key_path).await;
                return Err(api_error("create_key_pair", e));
            }
        };

        let Some(material) = resp.key_material() else {
            discard_key_file(key_path).await;
            return Err(Error::other("create_key_pair returned no key material"));
        };

        file.write_all(material.as_bytes())
            .await
            .map_err(|e| Error::io(key_path, e))?;
        file.sync_all().await.map_err(|e| Error::io(key_path, e))?;

        tracing::info!("saved key pair '{}' to {}", key_name, key_path.display());
        Ok(KeyPair {
            key_name: resp.key_name().unwrap_or(key_name).to_string(),
            key_pair_id: resp.key_pair_id().unwrap_or_default().to_string(),
            fingerprint: resp.key_fingerprint().unwrap_or_default().to_string(),
            key_type: key_type.as_str().to_string(),
        })
    }

    pub async fn delete_key_pair(&self, key_name: &str) -> Result<()> {
        tracing::info!("deleting EC2 key pair '{}'", key_name);
        self.cli
            .delete_key_pair()
            .key_name(key_name)
            .send()
            .await
            .map_err(|e| api_error("delete_key_pair", e))?;
        Ok(())
    }

    pub async fn describe_key_pairs(&self) -> Result<Vec<KeyPair>> {
        tracing::info!("describing key pairs in region '{}'", self.region);
        let resp = self
            .cli
            .describe_key_pairs()
            .send()
            .await
            .map_err(|e| api_error("describe_key_pairs", e))?;

        Ok(resp
            .key_pairs()
            .iter()
            .map(|k| KeyPair {
                key_name: k.key_name().unwrap_or_default().to_string(),
                key_pair_id: k.key_pair_id().unwrap_or_default().to_string(),
                fingerprint: k.key_fingerprint().unwrap_or_default().to_string(),
                key_type: k
                    .key_type()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect())
    }
}
