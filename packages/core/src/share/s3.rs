//! Object-storage buckets mounted through an s3fs container.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use snafu::ResultExt;

use super::{Share, ShareContext, TARGET};
use crate::config::MountConfig;
use crate::daemon::DaemonSpec;
use crate::error::{Error, HttpSnafu, InvalidUrlSnafu, Result};

/// Scheme name in the request.
pub const SCHEME: &str = "s3";

const IMAGE: &str = "kuberlab/s3fs";
const CONTAINER_MOUNT: &str = "/mnt/mountpoint";
const PASSWD_FILE: &str = "passwd_file=/etc/s3secret/passwd-s3fs";
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Checks `bucket` against the S3 bucket naming rules.
pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::InvalidBucket {
            bucket: bucket.to_string(),
            reason: reason.to_string(),
        })
    };

    if !(3..=63).contains(&bucket.len()) {
        return invalid("must be between 3 and 63 characters long");
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return invalid("only lowercase letters, digits, '.' and '-' are allowed");
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(bucket.chars().next()) || !alnum(bucket.chars().last()) {
        return invalid("must begin and end with a letter or digit");
    }
    if bucket.contains("..") {
        return invalid("must not contain two adjacent periods");
    }
    if bucket.parse::<Ipv4Addr>().is_ok() {
        return invalid("must not be formatted as an IP address");
    }
    Ok(())
}

/// Access key pair passed to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key_id: String,
    pub secret: String,
}

/// Builds the s3fs daemon for `bucket` mounted at `path`.
pub fn daemon_spec(
    path: &Path,
    bucket: &str,
    endpoint: Option<&str>,
    credentials: Option<&Credentials>,
) -> DaemonSpec {
    let mut spec = DaemonSpec::fuse(IMAGE, path, CONTAINER_MOUNT);
    if let Some(creds) = credentials {
        spec = spec
            .env("S3User", creds.key_id.as_str())
            .env("S3Secret", creds.secret.as_str());
    }
    spec = spec.arg(bucket).arg(CONTAINER_MOUNT).arg("-o").arg(PASSWD_FILE);
    if let Some(endpoint) = endpoint {
        spec = spec.arg("-o").arg(format!("url={endpoint}"));
    }
    spec
}

/// Fails unless `endpoint` answers for `bucket`.
///
/// Any HTTP status counts as reachable; only transport errors fail.
fn check_reachable(endpoint: &str, bucket: &str) -> Result<()> {
    url::Url::parse(endpoint).context(InvalidUrlSnafu { url: endpoint })?;
    let target = format!("{}/{}", endpoint.trim_end_matches('/'), bucket);
    let client = reqwest::blocking::Client::builder()
        .no_proxy()
        .timeout(REACHABILITY_TIMEOUT)
        .build()
        .context(HttpSnafu { url: target.as_str() })?;
    let response = client
        .head(&target)
        .send()
        .context(HttpSnafu { url: target.as_str() })?;
    tracing::debug!(target: TARGET, url = %target, status = response.status().as_u16(), "bucket endpoint reachable");
    Ok(())
}

/// s3fs-backed share.
pub struct S3Share {
    ctx: ShareContext,
    config: MountConfig,
}

impl S3Share {
    /// Creates the backend; parameters are validated on mount.
    pub fn new(ctx: &ShareContext, config: MountConfig) -> Self {
        Self {
            ctx: ctx.clone(),
            config,
        }
    }

    fn credentials(&self) -> Result<Option<Credentials>> {
        let Some(key_id) = self.config.optional_secret("aws_access_key_id")? else {
            return Ok(None);
        };
        let secret = self.config.secret("aws_access_key")?;
        Ok(Some(Credentials { key_id, secret }))
    }
}

pub(super) fn factory(ctx: &ShareContext, config: MountConfig) -> Result<Box<dyn Share>> {
    Ok(Box::new(S3Share::new(ctx, config)))
}

impl Share for S3Share {
    fn mount(&self, path: &Path) -> Result<()> {
        let bucket = self.config.require("bucket")?;
        validate_bucket_name(&bucket)?;
        let endpoint = self.config.get("endpoint");
        if let Some(endpoint) = &endpoint {
            check_reachable(endpoint, &bucket)?;
        }
        let credentials = self.credentials()?;

        let spec = daemon_spec(path, &bucket, endpoint.as_deref(), credentials.as_ref());
        self.ctx.supervisor().mount(path, &spec)?.into_result(path)
    }

    fn unmount(&self, path: &Path) -> Result<()> {
        self.ctx.supervisor().unmount(path)
    }
}
