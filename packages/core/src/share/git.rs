//! Git repositories cloned to a scratch directory and bind-mounted.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{Share, ShareContext, TARGET};
use crate::config::MountConfig;
use crate::error::Result;
use crate::mount::{BindOptions, create_mount_point};

/// Scheme name in the request.
pub const SCHEME: &str = "git";

const CLONE_PREFIX: &str = "flexmount-git-";

/// Extracts the bind source from `findmnt -o SOURCE` output.
///
/// Bind mounts show up as `device[/dir]`; the part in brackets is the
/// directory relative to the device's root.
pub fn parse_bind_source(out: &str) -> Option<PathBuf> {
    let line = out.lines().next()?.trim();
    let start = line.find('[')?;
    let end = line.rfind(']')?;
    if end <= start + 1 {
        return None;
    }
    Some(PathBuf::from(&line[start + 1..end]))
}

/// Git-backed share.
pub struct GitShare {
    ctx: ShareContext,
    config: MountConfig,
    scratch: PathBuf,
}

impl GitShare {
    /// Creates the backend cloning into the system temp directory.
    pub fn new(ctx: &ShareContext, config: MountConfig) -> Self {
        Self::with_scratch(ctx, config, std::env::temp_dir())
    }

    /// Creates the backend cloning into `scratch`.
    pub fn with_scratch(ctx: &ShareContext, config: MountConfig, scratch: PathBuf) -> Self {
        Self {
            ctx: ctx.clone(),
            config,
            scratch,
        }
    }

    /// Maps a bind source back to a clone directory this backend owns.
    fn owned_clone(&self, source: &Path) -> Option<PathBuf> {
        let name = source.file_name()?.to_str()?;
        name.starts_with(CLONE_PREFIX)
            .then(|| self.scratch.join(name))
    }
}

pub(super) fn factory(ctx: &ShareContext, config: MountConfig) -> Result<Box<dyn Share>> {
    Ok(Box::new(GitShare::new(ctx, config)))
}

impl Share for GitShare {
    fn mount(&self, path: &Path) -> Result<()> {
        if self.ctx.mounts.is_mounted(path)? {
            return Ok(());
        }
        let url = self.config.require("url")?;
        let clone_dir = self.scratch.join(format!("{CLONE_PREFIX}{}", Uuid::new_v4()));
        tracing::info!(
            target: TARGET,
            url = %url,
            dir = %clone_dir.display(),
            "cloning repository"
        );
        create_mount_point(path)?;

        let clone_arg = clone_dir.to_string_lossy();
        self.ctx
            .runner
            .run("git", &["clone", &url, &clone_arg])?
            .checked("git clone")?;

        tracing::info!(
            target: TARGET,
            from = %clone_dir.display(),
            to = %path.display(),
            "binding clone"
        );
        self.ctx
            .mounts
            .bind(&clone_dir, path, BindOptions::default())?;
        self.ctx.log_mount_result(path);
        Ok(())
    }

    fn unmount(&self, path: &Path) -> Result<()> {
        if !self.ctx.mounts.is_mounted(path)? {
            return Ok(());
        }
        let path_arg = path.to_string_lossy();
        let out = self
            .ctx
            .runner
            .run("findmnt", &["-n", "-o", "SOURCE", &path_arg])?
            .checked("findmnt")?;
        self.ctx.mounts.unmount(path)?;

        match parse_bind_source(&out.stdout).and_then(|source| self.owned_clone(&source)) {
            Some(clone_dir) => {
                tracing::info!(target: TARGET, dir = %clone_dir.display(), "clearing mount source");
                if let Err(error) = fs::remove_dir_all(&clone_dir) {
                    tracing::warn!(
                        target: TARGET,
                        dir = %clone_dir.display(),
                        error = %error,
                        "failed to clear mount source"
                    );
                }
            }
            None => tracing::warn!(
                target: TARGET,
                output = %out.stdout.trim(),
                "can't find clone directory in mount source"
            ),
        }
        Ok(())
    }
}
