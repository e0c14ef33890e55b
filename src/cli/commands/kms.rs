//! KMS command - keys and envelope encryption

use super::CommandContext;
use crate::cli::output::{or_dash, state_cell};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use infra::aws::kms::{self, decode_base64, encode_base64, KeySummary};
use infra::aws::{parse_tag, Tags};
use serde::Serialize;
use tabled::Tabled;

/// Arguments for the kms command
#[derive(Parser, Debug, Clone)]
pub struct KmsArgs {
    #[command(subcommand)]
    pub action: KmsAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum KmsAction {
    /// List keys with their aliases
    List,

    /// Create a symmetric key
    Create(CreateArgs),

    /// Describe a key
    Describe(KeyArgs),

    /// Schedule key deletion
    Delete(DeleteArgs),

    /// Encrypt text and print base64 ciphertext
    Encrypt(EncryptArgs),

    /// Decrypt base64 ciphertext and print the plaintext
    Decrypt(DecryptArgs),

    /// Generate an AES-256 data key
    #[command(name = "data-key")]
    DataKey(KeyArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Key description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Tag KEY=VALUE; repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct KeyArgs {
    /// Key id, ARN or alias
    pub key_id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Key id or ARN
    pub key_id: String,

    /// Waiting period before deletion (7-30)
    #[arg(long, default_value_t = 30)]
    pub days: i32,
}

#[derive(Parser, Debug, Clone)]
pub struct EncryptArgs {
    /// Key id, ARN or alias
    pub key_id: String,

    /// Text to encrypt
    pub plaintext: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DecryptArgs {
    /// Base64 ciphertext
    pub ciphertext: String,
}

#[derive(Tabled)]
struct KeyRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Aliases")]
    aliases: String,
}

#[derive(Serialize)]
struct DataKeyOutput {
    plaintext: String,
    ciphertext: String,
}

impl KmsArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let manager = kms::Manager::new(&ctx.sdk);

        match &self.action {
            KmsAction::List => {
                let keys = ctx.retry.execute(|| manager.list_keys()).await?;
                ctx.output.list(&keys, |k: &KeySummary| KeyRow {
                    id: k.id.clone(),
                    aliases: if k.aliases.is_empty() {
                        "-".to_string()
                    } else {
                        k.aliases.join(", ")
                    },
                })?;
            }
            KmsAction::Create(args) => {
                let tags = args
                    .tags
                    .iter()
                    .map(|t| parse_tag(t))
                    .collect::<infra::error::Result<Tags>>()?;
                let key = manager.create_key(&args.description, &tags).await?;
                ctx.output.record(
                    &key,
                    &[
                        ("KeyId", key.id.clone()),
                        ("ARN", key.arn.clone()),
                        ("State", state_cell(&key.state)),
                    ],
                )?;
            }
            KmsAction::Describe(args) => {
                let key = ctx
                    .retry
                    .execute(|| manager.describe_key(&args.key_id))
                    .await?;
                ctx.output.record(
                    &key,
                    &[
                        ("KeyId", key.id.clone()),
                        ("ARN", key.arn.clone()),
                        ("Description", key.description.clone()),
                        ("State", state_cell(&key.state)),
                        ("Usage", key.usage.clone()),
                        ("Spec", key.spec.clone()),
                        ("Created", or_dash(key.created)),
                        ("DeletionDate", or_dash(key.deletion_date)),
                    ],
                )?;
            }
            KmsAction::Delete(args) => {
                kms::validate_pending_window(args.days)?;
                let when = ctx
                    .retry
                    .execute(|| manager.schedule_key_deletion(&args.key_id, args.days))
                    .await?;
                ctx.output.success(&format!(
                    "key '{}' scheduled for deletion on {}",
                    args.key_id,
                    or_dash(when)
                ));
            }
            KmsAction::Encrypt(args) => {
                let ciphertext = ctx
                    .retry
                    .execute(|| manager.encrypt(&args.key_id, args.plaintext.as_bytes()))
                    .await?;
                ctx.output.raw(&encode_base64(&ciphertext));
            }
            KmsAction::Decrypt(args) => {
                let ciphertext = decode_base64(&args.ciphertext)?;
                let plaintext = ctx
                    .retry
                    .execute(|| manager.decrypt(&ciphertext))
                    .await?;
                let text = String::from_utf8(plaintext)
                    .context("decrypted plaintext is not valid UTF-8")?;
                ctx.output.raw(&text);
            }
            KmsAction::DataKey(args) => {
                let key = ctx
                    .retry
                    .execute(|| manager.generate_data_key(&args.key_id))
                    .await?;
                let out = DataKeyOutput {
                    plaintext: encode_base64(&key.plaintext),
                    ciphertext: encode_base64(&key.ciphertext),
                };
                ctx.output.record(
                    &out,
                    &[
                        ("Plaintext", out.plaintext.clone()),
                        ("Ciphertext", out.ciphertext.clone()),
                    ],
                )?;
            }
        }

        Ok(0)
    }
}
