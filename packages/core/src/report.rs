//! Structured reporting for mount lifecycle events.

use std::path::Path;
use std::time::Duration;

use crate::daemon::DaemonHandle;
use crate::error::Error;

const TARGET: &str = "flexmount::supervisor";

/// Observer handed to the supervisor to surface lifecycle events.
pub trait MountReporter: Send + Sync {
    /// A daemon was found running for a path that is not mounted.
    fn orphan_daemon(&self, path: &Path, handle: &DaemonHandle);

    /// A path is mounted but no daemon backs it.
    fn stale_mount(&self, path: &Path);

    /// More than one daemon carries the path's label.
    fn duplicate_daemon(&self, path: &Path, handle: &DaemonHandle);

    /// A new daemon was started.
    fn daemon_started(&self, path: &Path, handle: &DaemonHandle);

    /// The mount appeared.
    fn mounted(&self, path: &Path, elapsed: Duration);

    /// The daemon died or could not be started.
    fn daemon_failed(&self, path: &Path, reason: &str);

    /// The mount did not appear in time.
    fn timed_out(&self, path: &Path, timeout: Duration);

    /// A best-effort cleanup step failed.
    fn cleanup_failed(&self, path: &Path, error: &Error);

    /// A daemon is being removed on unmount.
    fn unmounting(&self, path: &Path, handle: Option<&DaemonHandle>);
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl MountReporter for TracingReporter {
    fn orphan_daemon(&self, path: &Path, handle: &DaemonHandle) {
        tracing::warn!(
            target: TARGET,
            path = %path.display(),
            daemon = %handle,
            "mount point doesn't exist but daemon is running"
        );
    }

    fn stale_mount(&self, path: &Path) {
        tracing::warn!(
            target: TARGET,
            path = %path.display(),
            "mount point exists but daemon is not running"
        );
    }

    fn duplicate_daemon(&self, path: &Path, handle: &DaemonHandle) {
        tracing::warn!(
            target: TARGET,
            path = %path.display(),
            daemon = %handle,
            "removing duplicate daemon"
        );
    }

    fn daemon_started(&self, path: &Path, handle: &DaemonHandle) {
        tracing::info!(
            target: TARGET,
            path = %path.display(),
            daemon = %handle,
            "mount daemon started"
        );
    }

    fn mounted(&self, path: &Path, elapsed: Duration) {
        tracing::info!(
            target: TARGET,
            path = %path.display(),
            elapsed_ms = elapsed.as_millis() as u64,
            "mount is ready"
        );
    }

    fn daemon_failed(&self, path: &Path, reason: &str) {
        tracing::error!(
            target: TARGET,
            path = %path.display(),
            reason,
            "mount daemon failed"
        );
    }

    fn timed_out(&self, path: &Path, timeout: Duration) {
        tracing::error!(
            target: TARGET,
            path = %path.display(),
            timeout_s = timeout.as_secs(),
            "failed mount: timed out"
        );
    }

    fn cleanup_failed(&self, path: &Path, error: &Error) {
        tracing::warn!(
            target: TARGET,
            path = %path.display(),
            error = %error,
            "cleanup step failed"
        );
    }

    fn unmounting(&self, path: &Path, handle: Option<&DaemonHandle>) {
        match handle {
            Some(handle) => tracing::info!(
                target: TARGET,
                path = %path.display(),
                daemon = %handle,
                "terminating mount daemon"
            ),
            None => tracing::info!(
                target: TARGET,
                path = %path.display(),
                "no mount daemon to terminate"
            ),
        }
    }
}
