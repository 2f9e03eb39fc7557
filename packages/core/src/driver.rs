//! Driver call dispatch.
//!
//! Turns one `init`, `mount` or `unmount` call into a [`DriverStatus`]
//! reply. Errors never escape: they become a `Failure` carrying the error
//! message, or `Not supported` for unknown backends.

use std::path::Path;

use crate::config::MountConfig;
use crate::error::{Error, Result};
use crate::protocol::DriverStatus;
use crate::share::{BackendRegistry, Share, ShareContext};

const TARGET: &str = "flexmount::driver";

/// Driver operation on a mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Mount,
    Unmount,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Mount => "mount",
            Operation::Unmount => "unmount",
        }
    }
}

/// Entry point used by the driver binary.
pub struct Driver {
    registry: BackendRegistry,
    ctx: ShareContext,
}

impl Driver {
    pub fn new(registry: BackendRegistry, ctx: ShareContext) -> Self {
        Self { registry, ctx }
    }

    /// Reply to `init`.
    pub fn init(&self) -> DriverStatus {
        tracing::info!(target: TARGET, "init");
        DriverStatus::init()
    }

    /// Mounts the share described by `options` at `path`.
    pub fn mount(&self, path: &Path, options: &str) -> DriverStatus {
        self.call(Operation::Mount, path, options)
    }

    /// Unmounts the share described by `options` from `path`.
    pub fn unmount(&self, path: &Path, options: &str) -> DriverStatus {
        self.call(Operation::Unmount, path, options)
    }

    fn call(&self, op: Operation, path: &Path, options: &str) -> DriverStatus {
        tracing::info!(target: TARGET, op = op.as_str(), path = %path.display(), "request");
        let reply = match self.run(op, path, options) {
            Ok(()) => DriverStatus::success(),
            Err(err) => reply_for(&err),
        };
        tracing::info!(
            target: TARGET,
            op = op.as_str(),
            path = %path.display(),
            status = ?reply.status,
            message = %reply.message,
            "result"
        );
        reply
    }

    fn run(&self, op: Operation, path: &Path, options: &str) -> Result<()> {
        let config = MountConfig::parse(options)?;
        let share: Box<dyn Share> = self.registry.create(&self.ctx, config)?;
        match op {
            Operation::Mount => share.mount(path),
            Operation::Unmount => share.unmount(path),
        }
    }
}

/// Maps a failed call to its reply.
pub fn reply_for(err: &Error) -> DriverStatus {
    if err.is_unsupported() {
        DriverStatus::not_supported(err.to_string())
    } else {
        DriverStatus::failure(err.to_string())
    }
}
