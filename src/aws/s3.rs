//! AWS S3 manager - buckets, objects and directory sync.
//!
//! # Sync
//!
//! [`plan_sync`] compares a local directory tree with the objects under an S3
//! prefix and decides what to upload and (optionally) delete:
//!
//! - a file missing remotely is uploaded
//! - a file whose size differs is uploaded
//! - a file whose MD5 differs from a single-part ETag is uploaded
//! - with `delete`, remote keys with no local file are removed
//!
//! Multipart ETags (`"<hash>-<parts>"`) are not MD5 digests, so for those only
//! the size is compared.
//!
//! The prefix is treated as a directory: syncing to `p` touches `p/...` only,
//! never siblings such as `photos/...`.
//!
//! # Uploads
//!
//! Files of [`MULTIPART_THRESHOLD`] bytes or more go up as a multipart upload;
//! a failed part aborts the upload so no orphaned parts are billed.

use crate::aws::{api_error, to_chrono};
use crate::error::{Error, Result};
use aws_config::SdkConfig;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// DeleteObjects accepts at most this many keys per request
const DELETE_BATCH_SIZE: usize = 1000;

/// Minimum size for multipart upload (5 MB)
pub const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Default part size for multipart upload (8 MB)
const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum part size for multipart upload (5 GB)
const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts in a multipart upload
const MAX_PARTS: u64 = 10_000;

/// Read buffer for local checksums
const DIGEST_CHUNK: usize = 64 * 1024;

/// Determine if multipart upload should be used
pub fn should_use_multipart(file_size: u64) -> bool {
    file_size >= MULTIPART_THRESHOLD
}

/// Part size that keeps `file_size` within [`MAX_PARTS`] parts.
pub fn part_size_for(file_size: u64) -> u64 {
    let mut part_size = DEFAULT_PART_SIZE;
    while file_size.div_ceil(part_size) > MAX_PARTS {
        part_size *= 2;
        if part_size >= MAX_PART_SIZE {
            return MAX_PART_SIZE;
        }
    }
    part_size
}

/// Projection of an S3 bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

/// Projection of an S3 object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
}

impl From<&aws_sdk_s3::types::Object> for Object {
    fn from(o: &aws_sdk_s3::types::Object) -> Self {
        Self {
            key: o.key().unwrap_or_default().to_string(),
            size: o.size().unwrap_or_default().max(0) as u64,
            last_modified: o.last_modified().and_then(to_chrono),
            etag: o.e_tag().map(|t| t.trim_matches('"').to_string()),
            storage_class: o.storage_class().map(|c| c.as_str().to_string()),
        }
    }
}

/// Split `s3://bucket/prefix` into bucket and prefix.
pub fn parse_s3_url(url: &str) -> Result<(String, String)> {
    let rest = url.strip_prefix("s3://").ok_or_else(|| {
        Error::InvalidInput(format!("'{}' is not an s3:// URL", url))
    })?;

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (rest, ""),
    };
    validate_bucket_name(bucket)?;

    Ok((bucket.to_string(), prefix.to_string()))
}

/// Validate an S3 bucket name against the general purpose bucket rules.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::InvalidInput(format!(
            "invalid bucket name '{}': {}",
            name, reason
        )))
    };

    if name.len() < 3 || name.len() > 63 {
        return invalid("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return invalid("only lowercase letters, digits, '.' and '-' are allowed");
    }
    let first = name.chars().next().unwrap_or('-');
    let last = name.chars().last().unwrap_or('-');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return invalid("must begin and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("must not contain two adjacent periods");
    }
    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return invalid("must not be formatted as an IP address");
    }

    Ok(())
}

/// A file found while walking the local side of a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Path relative to the sync root, with `/` separators
    pub relative: String,
    pub path: PathBuf,
    pub size: u64,
}

impl LocalFile {
    fn md5_hex(&self) -> Result<String> {
        let mut file = std::fs::File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut context = md5::Context::new();
        let mut buf = vec![0u8; DIGEST_CHUNK];
        loop {
            let n = file.read(&mut buf).map_err(|e| Error::io(&self.path, e))?;
            if n == 0 {
                break;
            }
            context.consume(&buf[..n]);
        }
        Ok(format!("{:x}", context.compute()))
    }
}

/// Walk `root` and collect every regular file.
pub fn scan_local(root: &Path) -> Result<Vec<LocalFile>> {
    if !root.is_dir() {
        return Err(Error::InvalidInput(format!(
            "'{}' is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::other(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry
            .metadata()
            .map_err(|e| Error::io(entry.path(), std::io::Error::other(e.to_string())))?
            .len();
        files.push(LocalFile {
            relative,
            path: entry.path().to_path_buf(),
            size,
        });
    }
    Ok(files)
}

/// Join a key prefix and a relative path without doubling the separator.
pub fn join_key(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, relative)
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Directory form of a key prefix: `p` becomes `p/`, empty stays empty.
pub fn dir_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// Why a file is part of the upload set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    Missing,
    SizeChanged,
    ContentChanged,
}

/// A planned upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file: LocalFile,
    pub key: String,
    pub reason: UploadReason,
}

/// What a sync will do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub uploads: Vec<Upload>,
    pub deletes: Vec<String>,
    pub unchanged: usize,
}

/// Compare local files with remote objects under `prefix`.
///
/// Remote keys outside the directory form of `prefix` are ignored.
pub fn plan_sync(
    local: &[LocalFile],
    remote: &[Object],
    prefix: &str,
    delete: bool,
) -> Result<SyncPlan> {
    let prefix = dir_prefix(prefix);
    let remote: Vec<&Object> = remote
        .iter()
        .filter(|o| o.key.starts_with(&prefix))
        .collect();
    let remote_by_key: BTreeMap<&str, &Object> =
        remote.iter().map(|o| (o.key.as_str(), *o)).collect();

    let mut plan = SyncPlan::default();
    let mut seen = std::collections::BTreeSet::new();

    for file in local {
        let key = join_key(&prefix, &file.relative);
        let reason = match remote_by_key.get(key.as_str()) {
            None => Some(UploadReason::Missing),
            Some(obj) if obj.size != file.size => Some(UploadReason::SizeChanged),
            Some(obj) => match obj.etag.as_deref() {
                Some(etag) if !etag.contains('-') => {
                    if etag != file.md5_hex()? {
                        Some(UploadReason::ContentChanged)
                    } else {
                        None
                    }
                }
                _ => None,
            },
        };

        match reason {
            Some(reason) => plan.uploads.push(Upload {
                file: file.clone(),
                key: key.clone(),
                reason,
            }),
            None => plan.unchanged += 1,
        }
        seen.insert(key);
    }

    if delete {
        plan.deletes = remote
            .iter()
            .filter(|o| !seen.contains(&o.key))
            .map(|o| o.key.clone())
            .collect();
    }

    Ok(plan)
}

/// Options for [`Manager::sync`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Remove remote keys that have no local counterpart
    pub delete: bool,
    /// Only compute the plan
    pub dry_run: bool,
}

/// Result of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
    pub bytes_uploaded: u64,
    pub dry_run: bool,
}

/// Implements AWS S3 manager.
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

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        tracing::info!("listing buckets");
        let resp = self
            .cli
            .list_buckets()
            .send()
            .await
            .map_err(|e| api_error("list_buckets", e))?;

        Ok(resp
            .buckets()
            .iter()
            .map(|b| Bucket {
                name: b.name().unwrap_or_default().to_string(),
                created: b.creation_date().and_then(to_chrono),
            })
            .collect())
    }

    /// Creates a bucket; a bucket already owned by the caller counts as success.
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket_name(bucket)?;
        tracing::info!("creating bucket '{}' in region '{}'", bucket, self.region);

        let mut req = self.cli.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if !self.region.is_empty() && self.region != "us-east-1" {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match req.send().await {
            Ok(_) => {
                tracing::info!("created bucket '{}'", bucket);
                Ok(())
            }
            Err(e) => {
                if matches!(
                    e.as_service_error(),
                    Some(CreateBucketError::BucketAlreadyOwnedByYou(_))
                ) {
                    tracing::warn!("bucket '{}' already exists and is owned by you", bucket);
                    return Ok(());
                }
                Err(api_error("create_bucket", e))
            }
        }
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        tracing::info!("deleting bucket '{}'", bucket);
        self.cli
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| api_error("delete_bucket", e))?;
        Ok(())
    }

    /// Lists every object under `prefix`, following pagination.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<Object>> {
        tracing::info!("listing objects in 's3://{}/{}'", bucket, prefix);

        let mut req = self.cli.list_objects_v2().bucket(bucket);
        if !prefix.is_empty() {
            req = req.prefix(prefix);
        }
        let mut pages = req.into_paginator().send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error("list_objects_v2", e))?;
            objects.extend(page.contents().iter().map(Object::from));
        }

        tracing::info!("found {} object(s)", objects.len());
        Ok(objects)
    }

    /// Deletes the given keys in batches; returns how many were removed.
    pub async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let ids = chunk
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::other(format!("invalid object identifier: {}", e)))?;
            let delete = Delete::builder()
                .set_objects(Some(ids))
                .quiet(true)
                .build()
                .map_err(|e| Error::other(format!("invalid delete request: {}", e)))?;

            tracing::info!("deleting {} object(s) from '{}'", chunk.len(), bucket);
            let resp = self
                .cli
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| api_error("delete_objects", e))?;

            if let Some(err) = resp.errors().first() {
                return Err(Error::api(
                    format!(
                        "failed delete_objects for key '{}': {}",
                        err.key().unwrap_or_default(),
                        err.message().unwrap_or_default()
                    ),
                    false,
                ));
            }
            deleted += chunk.len();
        }
        Ok(deleted)
    }

    /// Deletes every object under `prefix`.
    pub async fn delete_objects(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .list_objects(bucket, prefix)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();
        if keys.is_empty() {
            tracing::info!("nothing to delete under 's3://{}/{}'", bucket, prefix);
            return Ok(0);
        }
        self.delete_keys(bucket, &keys).await
    }

    /// Uploads a local file, switching to multipart above [`MULTIPART_THRESHOLD`].
    pub async fn put_object(&self, file_path: &Path, bucket: &str, key: &str) -> Result<u64> {
        let size = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| Error::io(file_path, e))?
            .len();
        tracing::info!(
            "uploading '{}' ({} bytes) to 's3://{}/{}'",
            file_path.display(),
            size,
            bucket,
            key
        );

        if should_use_multipart(size) {
            return self.put_object_multipart(file_path, bucket, key, size).await;
        }

        let body = ByteStream::from_path(file_path)
            .await
            .map_err(|e| Error::io(file_path, std::io::Error::other(e.to_string())))?;

        self.cli
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| api_error("put_object", e))?;
        Ok(size)
    }

    async fn put_object_multipart(
        &self,
        file_path: &Path,
        bucket: &str,
        key: &str,
        size: u64,
    ) -> Result<u64> {
        let part_size = part_size_for(size);
        let upload = self
            .cli
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| api_error("create_multipart_upload", e))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| Error::other("create_multipart_upload returned no upload id"))?
            .to_string();

        tracing::debug!(
            "multipart upload {} for s3://{}/{} ({} byte parts)",
            upload_id,
            bucket,
            key,
            part_size
        );

        match self
            .upload_parts(file_path, bucket, key, &upload_id, size, part_size)
            .await
        {
            Ok(parts) => {
                self.cli
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| api_error("complete_multipart_upload", e))?;
                Ok(size)
            }
            Err(e) => {
                tracing::warn!("aborting multipart upload {} for {}/{}", upload_id, bucket, key);
                if let Err(abort) = self
                    .cli
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!("failed abort_multipart_upload: {}", abort);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        file_path: &Path,
        bucket: &str,
        key: &str,
        upload_id: &str,
        size: u64,
        part_size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut offset = 0;
        let mut part_number = 1;

        while offset < size {
            let length = part_size.min(size - offset);
            let body = ByteStream::read_from()
                .path(file_path)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .map_err(|e| Error::io(file_path, std::io::Error::other(e.to_string())))?;

            let resp = self
                .cli
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(|e| api_error("upload_part", e))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(resp.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            tracing::debug!("uploaded part {} ({} bytes)", part_number, length);

            offset += length;
            part_number += 1;
        }

        Ok(parts)
    }

    /// Downloads an object to `file_path`, creating parent directories.
    pub async fn get_object(&self, bucket: &str, key: &str, file_path: &Path) -> Result<u64> {
        tracing::info!(
            "downloading 's3://{}/{}' to '{}'",
            bucket,
            key,
            file_path.display()
        );

        let resp = self
            .cli
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().and_then(|se| se.code()) == Some("NoSuchKey") {
                    Error::InvalidInput(format!("s3://{}/{} does not exist", bucket, key))
                } else {
                    api_error("get_object", e)
                }
            })?;

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }

        let mut file = tokio::fs::File::create(file_path)
            .await
            .map_err(|e| Error::io(file_path, e))?;
        let mut reader = resp.body.into_async_read();
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| Error::io(file_path, e))?;

        Ok(written)
    }

    /// Syncs a local directory up to `s3://bucket/prefix`.
    pub async fn sync(
        &self,
        dir: &Path,
        bucket: &str,
        prefix: &str,
        opts: SyncOptions,
    ) -> Result<SyncReport> {
        let prefix = dir_prefix(prefix);
        let local = scan_local(dir)?;
        let remote = self.list_objects(bucket, &prefix).await?;
        let delete = opts.delete;
        // checksumming reads every unchanged-size file
        let plan = tokio::task::spawn_blocking(move || plan_sync(&local, &remote, &prefix, delete))
            .await
            .map_err(|e| Error::other(format!("sync planning failed: {}", e)))??;

        tracing::info!(
            "sync plan: {} upload(s), {} delete(s), {} unchanged",
            plan.uploads.len(),
            plan.deletes.len(),
            plan.unchanged
        );

        let mut report = SyncReport {
            unchanged: plan.unchanged,
            dry_run: opts.dry_run,
            ..Default::default()
        };

        for upload in &plan.uploads {
            if !opts.dry_run {
                tracing::debug!("uploading {} ({:?})", upload.key, upload.reason);
                self.put_object(&upload.file.path, bucket, &upload.key).await?;
            }
            report.bytes_uploaded += upload.file.size;
            report.uploaded.push(upload.key.clone());
        }

        if !plan.deletes.is_empty() && !opts.dry_run {
            self.delete_keys(bucket, &plan.deletes).await?;
        }
        report.deleted = plan.deletes;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn object(key: &str, size: u64, etag: Option<&str>) -> Object {
        Object {
            key: key.to_string(),
            size,
            last_modified: None,
            etag: etag.map(str::to_string),
            storage_class: None,
        }
    }

    #[test]
    fn test_parse_s3_url() {
        assert_eq!(
            parse_s3_url("s3://my-bucket/logs/2024/").unwrap(),
            ("my-bucket".to_string(), "logs/2024/".to_string())
        );
        assert_eq!(
            parse_s3_url("s3://my-bucket").unwrap(),
            ("my-bucket".to_string(), String::new())
        );
        assert!(parse_s3_url("https://my-bucket").is_err());
        assert!(parse_s3_url("s3://A").is_err());
    }

    #[test]
    fn test_bucket_name_validation() {
        assert!(validate_bucket_name("my-bucket.logs").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("My-Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("my..bucket").is_err());
        assert!(validate_bucket_name("192.168.1.1").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "a/b.txt"), "a/b.txt");
        assert_eq!(join_key("backup", "a.txt"), "backup/a.txt");
        assert_eq!(join_key("backup/", "a.txt"), "backup/a.txt");
    }

    #[test]
    fn test_plan_sync() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("same.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("new.txt"), b"new").unwrap();
        std::fs::write(dir.path().join("grown.txt"), b"longer now").unwrap();
        std::fs::write(dir.path().join("edited.txt"), b"abc").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/multi.bin"), b"0123").unwrap();

        let local = scan_local(dir.path()).unwrap();
        assert_eq!(local.len(), 5);
        assert!(local.iter().any(|f| f.relative == "sub/multi.bin"));

        let hello_md5 = format!("{:x}", md5::compute(b"hello"));
        let remote = vec![
            object("p/same.txt", 5, Some(&hello_md5)),
            object("p/grown.txt", 3, None),
            object("p/edited.txt", 3, Some("00000000000000000000000000000000")),
            object("p/sub/multi.bin", 4, Some("deadbeef-2")),
            object("p/stale.txt", 1, None),
        ];

        let plan = plan_sync(&local, &remote, "p", true).unwrap();
        let reasons: BTreeMap<&str, UploadReason> = plan
            .uploads
            .iter()
            .map(|u| (u.key.as_str(), u.reason))
            .collect();

        assert_eq!(reasons.len(), 3);
        assert_eq!(reasons["p/new.txt"], UploadReason::Missing);
        assert_eq!(reasons["p/grown.txt"], UploadReason::SizeChanged);
        assert_eq!(reasons["p/edited.txt"], UploadReason::ContentChanged);
        assert_eq!(plan.unchanged, 2);
        assert_eq!(plan.deletes, vec!["p/stale.txt".to_string()]);

        let keep = plan_sync(&local, &remote, "p", false).unwrap();
        assert!(keep.deletes.is_empty());
    }

    #[test]
    fn test_scan_local_rejects_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(scan_local(&file), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_plan_sync_ignores_sibling_prefixes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let local = scan_local(dir.path()).unwrap();

        let remote = vec![
            object("p/a.txt", 1, None),
            object("p/old.txt", 1, None),
            object("photos/cat.jpg", 10, None),
            object("p2/keep.txt", 4, None),
        ];

        let plan = plan_sync(&local, &remote, "p", true).unwrap();
        assert_eq!(plan.deletes, vec!["p/old.txt".to_string()]);
        assert_eq!(plan.unchanged, 1);

        let plan = plan_sync(&local, &remote, "p/", true).unwrap();
        assert_eq!(plan.deletes, vec!["p/old.txt".to_string()]);
    }

    #[test]
    fn test_dir_prefix() {
        assert_eq!(dir_prefix(""), "");
        assert_eq!(dir_prefix("p"), "p/");
        assert_eq!(dir_prefix("p/"), "p/");
    }

    #[test]
    fn test_md5_streams_large_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..DIGEST_CHUNK * 3 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let file = LocalFile {
            relative: "big.bin".to_string(),
            path,
            size: data.len() as u64,
        };
        assert_eq!(file.md5_hex().unwrap(), format!("{:x}", md5::compute(&data)));
    }

    #[test]
    fn test_multipart_sizing() {
        assert!(!should_use_multipart(MULTIPART_THRESHOLD - 1));
        assert!(should_use_multipart(MULTIPART_THRESHOLD));

        assert_eq!(part_size_for(100 * 1024 * 1024), DEFAULT_PART_SIZE);

        // over the single PutObject limit, still within MAX_PARTS at 8 MB
        let six_gib: u64 = 6 * 1024 * 1024 * 1024;
        assert_eq!(part_size_for(six_gib), DEFAULT_PART_SIZE);
        let huge: u64 = 200 * 1024 * 1024 * 1024;
        let part = part_size_for(huge);
        assert!(huge.div_ceil(part) <= MAX_PARTS);
        assert!(part <= MAX_PART_SIZE);
    }
}
