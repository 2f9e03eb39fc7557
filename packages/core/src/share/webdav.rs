//! Dataset versions exported over WebDAV and mounted with davfs.

use std::path::Path;

use snafu::ResultExt;

use super::{Share, ShareContext, TARGET};
use crate::config::MountConfig;
use crate::error::{Error, InvalidUrlSnafu, Result};
use crate::mount::create_mount_point;
use crate::net;

/// Scheme name in the request.
pub const SCHEME: &str = "webdav";

const DEFAULT_SERVER_PORT: u16 = 30082;
const DEFAULT_USER: &str = "u";
const DEFAULT_PASSWORD: &str = "pass";

/// Builds the dataset URL below `server`.
pub fn dataset_url(server: &str, workspace: &str, dataset: &str, version: &str) -> Result<String> {
    let raw = format!(
        "{}/{workspace}/{dataset}/{version}",
        server.trim_end_matches('/')
    );
    url::Url::parse(&raw).context(InvalidUrlSnafu { url: raw.as_str() })?;
    Ok(raw)
}

fn default_server() -> Result<String> {
    Ok(format!(
        "http://{}:{}/webdav",
        net::local_ip()?,
        DEFAULT_SERVER_PORT
    ))
}

/// davfs-backed share.
pub struct WebdavShare {
    ctx: ShareContext,
    config: MountConfig,
}

impl WebdavShare {
    /// Creates the backend; the server and credentials are read on mount.
    pub fn new(ctx: &ShareContext, config: MountConfig) -> Self {
        Self {
            ctx: ctx.clone(),
            config,
        }
    }

    fn url(&self) -> Result<String> {
        let workspace = self.config.require("workspace")?;
        let dataset = self.config.require("dataset")?;
        let version = self.config.require("version")?;
        let server = match self.config.get("serverURL") {
            Some(server) => server,
            None => default_server()?,
        };
        dataset_url(&server, &workspace, &dataset, &version)
    }
}

pub(super) fn factory(ctx: &ShareContext, config: MountConfig) -> Result<Box<dyn Share>> {
    Ok(Box::new(WebdavShare::new(ctx, config)))
}

impl Share for WebdavShare {
    fn mount(&self, path: &Path) -> Result<()> {
        if self.ctx.mounts.is_mounted(path)? {
            return Ok(());
        }
        let url = self.url()?;
        let user = self
            .config
            .optional_secret("user")?
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        let password = self
            .config
            .optional_secret("password")?
            .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());
        create_mount_point(path)?;

        tracing::info!(target: TARGET, url = %url, path = %path.display(), "mounting davfs");
        let path_arg = path.to_string_lossy();
        let username = format!("username={user}");
        let out = self.ctx.runner.run_with_input(
            "mount",
            &["-t", "davfs", &url, &path_arg, "-o", "ro", "-o", &username],
            &format!("{password}\n"),
        )?;
        if !out.success() {
            return Err(Error::Mount {
                path: path.to_path_buf(),
                message: out.combined().trim().to_string(),
            });
        }
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
