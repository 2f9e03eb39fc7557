//! Host directories bound into place.

use std::path::{Path, PathBuf};

use super::{Share, ShareContext};
use crate::config::MountConfig;
use crate::error::Result;
use crate::mount::{BindOptions, create_mount_point};

/// Scheme name in the request.
pub const SCHEME: &str = "host";

/// Host directory bound onto the mount point.
pub struct HostShare {
    ctx: ShareContext,
    config: MountConfig,
}

impl HostShare {
    /// Creates the backend; the source directory is read on mount.
    pub fn new(ctx: &ShareContext, config: MountConfig) -> Self {
        Self {
            ctx: ctx.clone(),
            config,
        }
    }
}

pub(super) fn factory(ctx: &ShareContext, config: MountConfig) -> Result<Box<dyn Share>> {
    Ok(Box::new(HostShare::new(ctx, config)))
}

impl Share for HostShare {
    fn mount(&self, path: &Path) -> Result<()> {
        if self.ctx.mounts.is_mounted(path)? {
            return Ok(());
        }
        let source = PathBuf::from(self.config.require("path")?);
        create_mount_point(path)?;
        self.ctx
            .mounts
            .bind(&source, path, BindOptions::default())?;
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
