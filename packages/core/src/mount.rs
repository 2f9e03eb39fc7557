//! Mount status and mount primitives.
//!
//! [`is_mounted`] answers whether a path is an active mount point by comparing
//! its device id with the parent directory's. [`MountTable`] groups that query
//! with the kernel-level bind and unmount operations so callers can swap in a
//! fake.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags};
use snafu::ResultExt;

use crate::error::{BindMountSnafu, IoResultExt, Result, UnmountSnafu};

/// Returns whether `path` is a mount point.
///
/// A missing path is not mounted. Any other stat failure is an error.
pub fn is_mounted(path: &Path) -> Result<bool> {
    let mount_point = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).mount_status_context(path),
    };
    let parent = fs::metadata(path.join("..")).mount_status_context(path)?;

    Ok(mount_point.dev() != parent.dev())
}

/// Creates a mount point directory if it doesn't exist.
pub fn create_mount_point(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).mount_point_context(path)?;
    }
    Ok(())
}

/// Options for [`MountTable::bind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOptions {
    /// Bind submounts as well (`--rbind`).
    pub recursive: bool,
    /// Remount the bind read-only.
    pub read_only: bool,
}

/// Mount table queries and mount primitives.
pub trait MountTable: Send + Sync {
    /// Whether `path` is currently a mount point.
    fn is_mounted(&self, path: &Path) -> Result<bool>;

    /// Bind mounts `source` onto `target`.
    fn bind(&self, source: &Path, target: &Path, options: BindOptions) -> Result<()>;

    /// Unmounts `path`.
    fn unmount(&self, path: &Path) -> Result<()>;

    /// Unmounts `path` with `MNT_FORCE`.
    fn force_unmount(&self, path: &Path) -> Result<()>;
}

/// [`MountTable`] backed by the host kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostMountTable;

impl MountTable for HostMountTable {
    fn is_mounted(&self, path: &Path) -> Result<bool> {
        is_mounted(path)
    }

    fn bind(&self, source: &Path, target: &Path, options: BindOptions) -> Result<()> {
        let mut flags = MsFlags::MS_BIND;
        if options.recursive {
            flags |= MsFlags::MS_REC;
        }
        nix::mount::mount(Some(source), target, None::<&str>, flags, None::<&str>).context(
            BindMountSnafu {
                from: source,
                to: target,
            },
        )?;

        if options.read_only {
            // MS_RDONLY is ignored on the initial bind; it only sticks on remount.
            nix::mount::mount(
                None::<&str>,
                target,
                None::<&str>,
                flags | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                None::<&str>,
            )
            .context(BindMountSnafu {
                from: source,
                to: target,
            })?;
        }
        Ok(())
    }

    fn unmount(&self, path: &Path) -> Result<()> {
        nix::mount::umount2(path, MntFlags::empty()).context(UnmountSnafu { path })
    }

    fn force_unmount(&self, path: &Path) -> Result<()> {
        nix::mount::umount2(path, MntFlags::MNT_FORCE).context(UnmountSnafu { path })
    }
}
