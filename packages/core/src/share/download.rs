//! Datasets fetched by the host-wide downloader service and bound read-only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use snafu::ResultExt;

use super::{Share, ShareContext, TARGET};
use crate::config::MountConfig;
use crate::daemon::{DaemonSpec, RestartPolicy};
use crate::error::{Error, HttpSnafu, Result};
use crate::mount::{BindOptions, create_mount_point};
use crate::singleton::ensure_singleton;

/// Scheme name in the request.
pub const SCHEME: &str = "download";

const SERVICE_IMAGE: &str = "kuberlab/pluk-downloader:latest";
const SERVICE_NAME: &str = "pluk-downloader";
const SERVICE_DIR: &str = "/pluk-tmp";
const LOCK_FILE: &str = "pluk.lock";
const DEFAULT_DOWNLOADER: &str = "http://127.0.0.1:8084";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// The downloader service container.
pub fn service_spec() -> DaemonSpec {
    DaemonSpec::new(SERVICE_IMAGE)
        .named(SERVICE_NAME)
        .restart(RestartPolicy::Always)
        .env("PLUK_URL", "http://127.0.0.1:30802/pluk/v1")
        .env("DEBUG", "true")
        .env("DOWNLOAD_DIR", SERVICE_DIR)
        .option("-v")
        .option(format!("{SERVICE_DIR}:{SERVICE_DIR}"))
        .option("--network=host")
}

/// Dataset coordinates and access secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRequest {
    pub workspace: String,
    pub dataset: String,
    pub version: String,
    pub secret: String,
}

impl DatasetRequest {
    /// Reads the dataset coordinates and the optional `token` secret.
    pub fn from_config(config: &MountConfig) -> Result<Self> {
        Ok(Self {
            workspace: config.require("workspace")?,
            dataset: config.require("dataset")?,
            version: config.require("version")?,
            secret: config.optional_secret("token")?.unwrap_or_default(),
        })
    }

    fn url(&self, downloader: &str) -> String {
        format!(
            "{}/v1/download/{}/{}/{}",
            downloader.trim_end_matches('/'),
            self.workspace,
            self.dataset,
            self.version
        )
    }

    /// Asks the downloader for the local directory holding the dataset.
    pub fn resolve(&self, downloader: &str) -> Result<PathBuf> {
        let url = self.url(downloader);
        tracing::info!(target: TARGET, url = %url, "requesting dataset");
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HttpSnafu { url: url.as_str() })?;
        let response = client
            .get(&url)
            .header("X-Workspace-Name", &self.workspace)
            .header("X-Workspace-Secret", &self.secret)
            .send()
            .context(HttpSnafu { url: url.as_str() })?;
        let status = response.status().as_u16();
        let body = response.text().context(HttpSnafu { url: url.as_str() })?;
        if status >= 400 {
            return Err(Error::HttpStatus { status, body });
        }
        let dataset_path = body.trim();
        if dataset_path.is_empty() {
            return Err(Error::InvalidConfig {
                message: format!("downloader returned no path for {url}"),
            });
        }
        Ok(PathBuf::from(dataset_path))
    }
}

/// Downloader-backed share.
pub struct DownloadShare {
    ctx: ShareContext,
    config: MountConfig,
    downloader: String,
}

impl DownloadShare {
    /// Creates the backend against the downloader on the local host.
    pub fn new(ctx: &ShareContext, config: MountConfig) -> Self {
        Self::with_downloader(ctx, config, DEFAULT_DOWNLOADER)
    }

    /// Talks to the downloader at `base` instead of the local default.
    pub fn with_downloader(ctx: &ShareContext, config: MountConfig, base: impl Into<String>) -> Self {
        Self {
            ctx: ctx.clone(),
            config,
            downloader: base.into(),
        }
    }
}

pub(super) fn factory(ctx: &ShareContext, config: MountConfig) -> Result<Box<dyn Share>> {
    Ok(Box::new(DownloadShare::new(ctx, config)))
}

impl Share for DownloadShare {
    fn mount(&self, path: &Path) -> Result<()> {
        if self.ctx.mounts.is_mounted(path)? {
            return Ok(());
        }
        let request = DatasetRequest::from_config(&self.config)?;

        ensure_singleton(
            self.ctx.processes.as_ref(),
            self.ctx.clock.as_ref(),
            self.ctx.supervisor.schedule(),
            &self.ctx.lock_dir.join(LOCK_FILE),
            &service_spec(),
        )?;

        let dataset_path = request.resolve(&self.downloader)?;
        create_mount_point(path)?;
        tracing::info!(
            target: TARGET,
            from = %dataset_path.display(),
            to = %path.display(),
            "binding dataset"
        );
        self.ctx.mounts.bind(
            &dataset_path,
            path,
            BindOptions {
                recursive: true,
                read_only: true,
            },
        )?;
        self.ctx.log_mount_result(path);
        Ok(())
    }

    fn unmount(&self, path: &Path) -> Result<()> {
        if self.ctx.mounts.is_mounted(path)? {
            self.ctx.mounts.unmount(path)?;
        }
        Ok(())
    }
}
