//! AWS KMS manager.

use crate::aws::{api_error, to_chrono, Tags};
use crate::error::{Error, Result};
use aws_config::SdkConfig;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{DataKeySpec, KeySpec, KeyUsageType, Tag};
use aws_sdk_kms::Client;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Allowed waiting period for scheduled key deletion
pub const PENDING_WINDOW_DAYS: RangeInclusive<i32> = 7..=30;

/// Projection of KMS key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub arn: String,
    pub description: String,
    pub state: String,
    pub usage: String,
    pub spec: String,
    pub created: Option<DateTime<Utc>>,
    pub deletion_date: Option<DateTime<Utc>>,
}

impl From<&aws_sdk_kms::types::KeyMetadata> for Key {
    fn from(m: &aws_sdk_kms::types::KeyMetadata) -> Self {
        Self {
            id: m.key_id().to_string(),
            arn: m.arn().unwrap_or_default().to_string(),
            description: m.description().unwrap_or_default().to_string(),
            state: m
                .key_state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            usage: m
                .key_usage()
                .map(|u| u.as_str().to_string())
                .unwrap_or_default(),
            spec: m
                .key_spec()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            created: m.creation_date().and_then(to_chrono),
            deletion_date: m.deletion_date().and_then(to_chrono),
        }
    }
}

/// A key id joined with its aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySummary {
    pub id: String,
    pub arn: String,
    pub aliases: Vec<String>,
}

/// Envelope-encryption data key.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey {
    pub plaintext: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &"<redacted>")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

pub fn validate_pending_window(days: i32) -> Result<()> {
    if PENDING_WINDOW_DAYS.contains(&days) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "pending window must be between {} and {} days, got {}",
            PENDING_WINDOW_DAYS.start(),
            PENDING_WINDOW_DAYS.end(),
            days
        )))
    }
}

pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_base64(s: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(s.trim())
        .map_err(|e| Error::InvalidInput(format!("invalid base64 input: {}", e)))
}

/// Implements AWS KMS manager.
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

    /// Creates a symmetric encrypt/decrypt key.
    pub async fn create_key(&self, description: &str, tags: &Tags) -> Result<Key> {
        tracing::info!("creating KMS key '{}'", description);

        let tags = tags
            .iter()
            .map(|(k, v)| Tag::builder().tag_key(k).tag_value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidInput(format!("invalid tag: {}", e)))?;

        let resp = self
            .cli
            .create_key()
            .description(description)
            .key_usage(KeyUsageType::EncryptDecrypt)
            .key_spec(KeySpec::SymmetricDefault)
            .set_tags(if tags.is_empty() { None } else { Some(tags) })
            .send()
            .await
            .map_err(|e| api_error("create_key", e))?;

        let key = resp
            .key_metadata()
            .map(Key::from)
            .ok_or_else(|| Error::other("create_key returned no key metadata"))?;
        tracing::info!("created KMS key '{}'", key.id);
        Ok(key)
    }

    pub async fn describe_key(&self, key_id: &str) -> Result<Key> {
        tracing::info!("describing KMS key '{}'", key_id);
        let resp = self
            .cli
            .describe_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|e| api_error("describe_key", e))?;

        resp.key_metadata()
            .map(Key::from)
            .ok_or_else(|| Error::other("describe_key returned no key metadata"))
    }

    /// Lists all keys, each joined with its aliases.
    pub async fn list_keys(&self) -> Result<Vec<KeySummary>> {
        tracing::info!("listing KMS keys");

        let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
        let mut alias_pages = self.cli.list_aliases().into_paginator().send();
        while let Some(page) = alias_pages.next().await {
            let page = page.map_err(|e| api_error("list_aliases", e))?;
            for alias in page.aliases() {
                if let (Some(target), Some(name)) = (alias.target_key_id(), alias.alias_name()) {
                    aliases
                        .entry(target.to_string())
                        .or_default()
                        .push(name.to_string());
                }
            }
        }

        let mut keys = Vec::new();
        let mut key_pages = self.cli.list_keys().into_paginator().send();
        while let Some(page) = key_pages.next().await {
            let page = page.map_err(|e| api_error("list_keys", e))?;
            for entry in page.keys() {
                let id = entry.key_id().unwrap_or_default().to_string();
                let mut names = aliases.remove(&id).unwrap_or_default();
                names.sort();
                keys.push(KeySummary {
                    arn: entry.key_arn().unwrap_or_default().to_string(),
                    aliases: names,
                    id,
                });
            }
        }

        tracing::info!("found {} key(s)", keys.len());
        Ok(keys)
    }

    /// Schedules key deletion after the pending window (7 to 30 days).
    pub async fn schedule_key_deletion(
        &self,
        key_id: &str,
        pending_window_days: i32,
    ) -> Result<Option<DateTime<Utc>>> {
        validate_pending_window(pending_window_days)?;
        tracing::info!(
            "scheduling deletion of KMS key '{}' in {} days",
            key_id,
            pending_window_days
        );

        let resp = self
            .cli
            .schedule_key_deletion()
            .key_id(key_id)
            .pending_window_in_days(pending_window_days)
            .send()
            .await
            .map_err(|e| api_error("schedule_key_deletion", e))?;

        Ok(resp.deletion_date().and_then(to_chrono))
    }

    pub async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        tracing::info!(
            "encrypting {} byte(s) with KMS key '{}'",
            plaintext.len(),
            key_id
        );
        let resp = self
            .cli
            .encrypt()
            .key_id(key_id)
            .plaintext(Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| api_error("encrypt", e))?;

        resp.ciphertext_blob()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| Error::other("encrypt returned no ciphertext"))
    }

    pub async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        tracing::info!("decrypting {} byte(s)", ciphertext.len());
        let resp = self
            .cli
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| api_error("decrypt", e))?;

        resp.plaintext()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| Error::other("decrypt returned no plaintext"))
    }

    /// Generates an AES-256 data key under `key_id`.
    pub async fn generate_data_key(&self, key_id: &str) -> Result<DataKey> {
        tracing::info!("generating data key with KMS key '{}'", key_id);
        let resp = self
            .cli
            .generate_data_key()
            .key_id(key_id)
            .key_spec(DataKeySpec::Aes256)
            .send()
            .await
            .map_err(|e| api_error("generate_data_key", e))?;

        match (resp.plaintext(), resp.ciphertext_blob()) {
            (Some(plaintext), Some(ciphertext)) => Ok(DataKey {
                plaintext: plaintext.as_ref().to_vec(),
                ciphertext: ciphertext.as_ref().to_vec(),
            }),
            _ => Err(Error::other("generate_data_key returned an incomplete key")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_window() {
        assert!(validate_pending_window(7).is_ok());
        assert!(validate_pending_window(30).is_ok());
        assert!(validate_pending_window(6).is_err());
        assert!(validate_pending_window(31).is_err());
    }

    #[test]
    fn test_base64_helpers() {
        let encoded = encode_base64(b"secret");
        assert_eq!(encoded, "c2VjcmV0");
        assert_eq!(decode_base64(" c2VjcmV0\n").unwrap(), b"secret");
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn test_data_key_debug_redacts() {
        let key = DataKey {
            plaintext: vec![1, 2, 3],
            ciphertext: vec![9; 16],
        };
        let out = format!("{:?}", key);
        assert!(out.contains("redacted"));
        assert!(!out.contains("[1, 2, 3]"));
    }
}
