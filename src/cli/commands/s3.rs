//! S3 command - buckets, objects and directory sync

use super::CommandContext;
use crate::cli::output::or_dash;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use infra::aws::s3::{self, parse_s3_url, Bucket, Object, SyncOptions};
use infra::humanize;
use std::path::{Path, PathBuf};
use tabled::Tabled;

/// Arguments for the s3 command
#[derive(Parser, Debug, Clone)]
pub struct S3Args {
    #[command(subcommand)]
    pub action: S3Action,
}

#[derive(Subcommand, Debug, Clone)]
pub enum S3Action {
    /// List buckets, or objects under s3://bucket/prefix
    Ls(LsArgs),

    /// Make a bucket
    Mb(BucketArgs),

    /// Remove a bucket
    Rb(RbArgs),

    /// Copy a file to or from S3
    Cp(CpArgs),

    /// Remove an object, or every object under a prefix
    Rm(RmArgs),

    /// Upload new and changed files from a directory
    Sync(SyncArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct LsArgs {
    /// s3://bucket[/prefix]
    pub url: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct BucketArgs {
    /// s3://bucket or bucket name
    pub bucket: String,
}

#[derive(Parser, Debug, Clone)]
pub struct RbArgs {
    /// s3://bucket or bucket name
    pub bucket: String,

    /// Delete every object first
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CpArgs {
    /// Source path or s3:// URL
    pub src: String,

    /// Destination path or s3:// URL
    pub dst: String,
}

#[derive(Parser, Debug, Clone)]
pub struct RmArgs {
    /// s3://bucket/key
    pub url: String,

    /// Treat the key as a prefix
    #[arg(long, short = 'r')]
    pub recursive: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Local directory
    pub dir: PathBuf,

    /// s3://bucket[/prefix]
    pub url: String,

    /// Delete remote objects with no local counterpart
    #[arg(long)]
    pub delete: bool,

    /// Show what would change without uploading
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Last Modified")]
    last_modified: String,
    #[tabled(rename = "Class")]
    storage_class: String,
}

/// Transfer direction resolved from `cp` arguments.
#[derive(Debug, PartialEq, Eq)]
enum Transfer {
    Upload {
        file: PathBuf,
        bucket: String,
        key: String,
    },
    Download {
        bucket: String,
        key: String,
        file: PathBuf,
    },
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn resolve_transfer(src: &str, dst: &str) -> Result<Transfer> {
    match (src.starts_with("s3://"), dst.starts_with("s3://")) {
        (false, true) => {
            let (bucket, mut key) = parse_s3_url(dst)?;
            if key.is_empty() || key.ends_with('/') {
                let name = Path::new(src)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if name.is_empty() {
                    bail!("cannot derive an object key from '{}'", src);
                }
                key.push_str(&name);
            }
            Ok(Transfer::Upload {
                file: PathBuf::from(src),
                bucket,
                key,
            })
        }
        (true, false) => {
            let (bucket, key) = parse_s3_url(src)?;
            if key.is_empty() || key.ends_with('/') {
                bail!("'{}' does not name an object", src);
            }
            let mut file = PathBuf::from(dst);
            if dst.ends_with('/') || file.is_dir() {
                file.push(file_name(&key));
            }
            Ok(Transfer::Download { bucket, key, file })
        }
        (true, true) => bail!("copying between two S3 locations is not supported"),
        (false, false) => bail!("one of source or destination must be an s3:// URL"),
    }
}

fn bucket_name(arg: &str) -> Result<String> {
    if arg.starts_with("s3://") {
        let (bucket, key) = parse_s3_url(arg)?;
        if !key.is_empty() {
            bail!("expected a bucket, got object path '{}'", arg);
        }
        Ok(bucket)
    } else {
        s3::validate_bucket_name(arg)?;
        Ok(arg.to_string())
    }
}

impl S3Args {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let manager = s3::Manager::new(&ctx.sdk);

        match &self.action {
            S3Action::Ls(args) => match &args.url {
                None => {
                    let buckets = ctx.retry.execute(|| manager.list_buckets()).await?;
                    ctx.output.list(&buckets, |b: &Bucket| BucketRow {
                        name: b.name.clone(),
                        created: or_dash(b.created.map(|c| c.format("%Y-%m-%d %H:%M"))),
                    })?;
                }
                Some(url) => {
                    let (bucket, prefix) = parse_s3_url(url)?;
                    let objects = ctx
                        .retry
                        .execute(|| manager.list_objects(&bucket, &prefix))
                        .await?;
                    ctx.output.list(&objects, |o: &Object| ObjectRow {
                        key: o.key.clone(),
                        size: humanize::bytes(o.size),
                        last_modified: or_dash(
                            o.last_modified.map(|c| c.format("%Y-%m-%d %H:%M")),
                        ),
                        storage_class: or_dash(o.storage_class.as_ref()),
                    })?;
                    let total: u64 = objects.iter().map(|o| o.size).sum();
                    ctx.output.note(&format!(
                        "{} object(s), {}",
                        objects.len(),
                        humanize::bytes(total)
                    ));
                }
            },
            S3Action::Mb(args) => {
                let bucket = bucket_name(&args.bucket)?;
                ctx.retry
                    .execute(|| manager.create_bucket(&bucket))
                    .await?;
                ctx.output.success(&format!(
                    "created bucket '{}' in {}",
                    bucket, manager.region
                ));
            }
            S3Action::Rb(args) => {
                let bucket = bucket_name(&args.bucket)?;
                if args.force {
                    let deleted = ctx
                        .retry
                        .execute(|| manager.delete_objects(&bucket, ""))
                        .await?;
                    ctx.output.info(&format!("deleted {} object(s)", deleted));
                }
                ctx.retry
                    .execute(|| manager.delete_bucket(&bucket))
                    .await?;
                ctx.output.success(&format!("removed bucket '{}'", bucket));
            }
            S3Action::Cp(args) => match resolve_transfer(&args.src, &args.dst)? {
                Transfer::Upload { file, bucket, key } => {
                    let size = ctx
                        .retry
                        .execute(|| manager.put_object(&file, &bucket, &key))
                        .await?;
                    ctx.output.success(&format!(
                        "uploaded {} to s3://{}/{} ({})",
                        file.display(),
                        bucket,
                        key,
                        humanize::bytes(size)
                    ));
                }
                Transfer::Download { bucket, key, file } => {
                    let size = ctx
                        .retry
                        .execute(|| manager.get_object(&bucket, &key, &file))
                        .await?;
                    ctx.output.success(&format!(
                        "downloaded s3://{}/{} to {} ({})",
                        bucket,
                        key,
                        file.display(),
                        humanize::bytes(size)
                    ));
                }
            },
            S3Action::Rm(args) => {
                let (bucket, key) = parse_s3_url(&args.url)?;
                let deleted = if args.recursive {
                    ctx.retry
                        .execute(|| manager.delete_objects(&bucket, &key))
                        .await?
                } else {
                    if key.is_empty() {
                        bail!("'{}' does not name an object; use --recursive", args.url);
                    }
                    let keys = [key.clone()];
                    ctx.retry
                        .execute(|| manager.delete_keys(&bucket, &keys))
                        .await?
                };
                ctx.output
                    .success(&format!("deleted {} object(s)", deleted));
            }
            S3Action::Sync(args) => {
                let (bucket, prefix) = parse_s3_url(&args.url)?;
                // Fail on a bad directory before touching AWS.
                s3::scan_local(&args.dir)?;
                let opts = SyncOptions {
                    delete: args.delete,
                    dry_run: args.dry_run,
                };
                let report = ctx
                    .retry
                    .execute(|| manager.sync(&args.dir, &bucket, &prefix, opts))
                    .await?;

                if ctx.output.is_table() {
                    let verb = if report.dry_run { "would upload" } else { "upload" };
                    for key in &report.uploaded {
                        ctx.output.raw(&format!("{}: s3://{}/{}", verb, bucket, key));
                    }
                    let verb = if report.dry_run { "would delete" } else { "delete" };
                    for key in &report.deleted {
                        ctx.output.raw(&format!("{}: s3://{}/{}", verb, bucket, key));
                    }
                    ctx.output.success(&format!(
                        "{} uploaded ({}), {} deleted, {} unchanged{}",
                        report.uploaded.len(),
                        humanize::bytes(report.bytes_uploaded),
                        report.deleted.len(),
                        report.unchanged,
                        if report.dry_run { " (dry run)" } else { "" }
                    ));
                } else {
                    ctx.output.record(&report, &[])?;
                }
            }
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_upload_appends_file_name() {
        let t = resolve_transfer("dist/app.tar.gz", "s3://my-bucket/releases/").unwrap();
        assert_eq!(
            t,
            Transfer::Upload {
                file: PathBuf::from("dist/app.tar.gz"),
                bucket: "my-bucket".into(),
                key: "releases/app.tar.gz".into(),
            }
        );
    }

    #[test]
    fn test_resolve_download_into_directory() {
        let t = resolve_transfer("s3://my-bucket/a/b.txt", "out/").unwrap();
        assert_eq!(
            t,
            Transfer::Download {
                bucket: "my-bucket".into(),
                key: "a/b.txt".into(),
                file: PathBuf::from("out/b.txt"),
            }
        );
    }

    #[test]
    fn test_resolve_rejects_bad_pairs() {
        assert!(resolve_transfer("a", "b").is_err());
        assert!(resolve_transfer("s3://aaa/x", "s3://bbb/y").is_err());
        assert!(resolve_transfer("s3://my-bucket/", "local").is_err());
    }

    #[test]
    fn test_bucket_name() {
        assert_eq!(bucket_name("s3://my-bucket").unwrap(), "my-bucket");
        assert_eq!(bucket_name("my-bucket").unwrap(), "my-bucket");
        assert!(bucket_name("s3://my-bucket/key").is_err());
        assert!(bucket_name("Bad_Bucket").is_err());
    }
}
