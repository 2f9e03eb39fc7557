//! The label that joins a mount daemon to its mount point.
//!
//! Every supervised daemon is started with `flex.mount.path=<path>`, where the
//! value is the mount path exactly as the caller passed it. No normalisation
//! is applied: `/mnt/x` and `/mnt/x/` are different labels.

use std::fmt;
use std::path::Path;

/// Label key attached to mount daemons.
pub const MOUNT_PATH_LABEL: &str = "flex.mount.path";

/// A `flex.mount.path` label bound to one mount point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountLabel {
    path: String,
}

impl MountLabel {
    /// Builds the label for `path`.
    pub fn for_path(path: &Path) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
        }
    }

    /// The mount path carried by this label.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parses `key=value`, accepting only the mount path key.
    ///
    /// The value is everything after the first `=`, so paths containing `=`
    /// survive a round trip.
    pub fn parse(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once('=')?;
        if key != MOUNT_PATH_LABEL || value.is_empty() {
            return None;
        }
        Some(Self {
            path: value.to_string(),
        })
    }

    /// Argument for `docker ps --filter`.
    pub fn filter_arg(&self) -> String {
        format!("label={self}")
    }
}

impl fmt::Display for MountLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", MOUNT_PATH_LABEL, self.path)
    }
}
