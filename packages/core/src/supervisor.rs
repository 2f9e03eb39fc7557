//! Mount daemon supervisor.
//!
//! [`Supervisor::mount`] drives one mount attempt through
//! reconcile, launch and poll:
//!
//! - **Reconcile**: look the daemon up by label and compare with the mount
//!   table. A healthy pair is left alone. A daemon without a mount is removed,
//!   a mount without a daemon is force-unmounted.
//! - **Launch**: start a new daemon labelled with the mount path.
//! - **Poll**: on every tick, succeed if the path is mounted, fail if the
//!   daemon exited, otherwise wait. The whole poll is bounded by a timeout.
//!
//! Every failure removes the daemon and force-unmounts the path before
//! returning. Cleanup errors go to the [`MountReporter`] and never replace the
//! original failure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::daemon::{self, DaemonHandle, DaemonSpec, ProcessManager};
use crate::error::{Error, Result};
use crate::label::MountLabel;
use crate::mount::MountTable;
use crate::poll::{Poll, PollSchedule, poll_until};
use crate::report::MountReporter;

/// Default time between two mount checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default bound on the wait for a mount to appear.
pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(120);

const GENERIC_FAILURE: &str = "Failed mount: mount daemon has been failed";

/// Tunables of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Time between two mount checks.
    pub poll_interval: Duration,
    /// Bound on the whole wait.
    pub timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_MOUNT_TIMEOUT,
        }
    }
}

impl SupervisorConfig {
    /// The polling schedule derived from this config.
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::new(self.poll_interval, self.timeout)
    }
}

/// Terminal state of one supervised mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionOutcome {
    /// A new daemon was started and the mount appeared.
    Mounted,
    /// A daemon was already backing an active mount.
    AlreadyMounted,
    /// The daemon could not start or exited; `reason` holds its output.
    Failed { reason: String },
    /// Nothing happened within the timeout.
    TimedOut { after: Duration },
}

impl SupervisionOutcome {
    /// Converts failure states into errors.
    pub fn into_result(self, path: &Path) -> Result<()> {
        match self {
            SupervisionOutcome::Mounted | SupervisionOutcome::AlreadyMounted => Ok(()),
            SupervisionOutcome::Failed { reason } => Err(Error::DaemonFailed { reason }),
            SupervisionOutcome::TimedOut { after } => Err(Error::MountTimeout {
                path: path.to_path_buf(),
                timeout: after,
            }),
        }
    }
}

enum Verdict {
    Mounted,
    Exited,
}

/// Supervises the daemons behind mount points.
pub struct Supervisor {
    processes: Arc<dyn ProcessManager>,
    mounts: Arc<dyn MountTable>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn MountReporter>,
    config: SupervisorConfig,
}

impl Supervisor {
    /// Creates a supervisor over the given collaborators.
    pub fn new(
        processes: Arc<dyn ProcessManager>,
        mounts: Arc<dyn MountTable>,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn MountReporter>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            processes,
            mounts,
            clock,
            reporter,
            config,
        }
    }

    /// Makes sure a daemon started from `spec` backs `path`.
    ///
    /// Errors are returned only when the daemon registry or the mount table
    /// cannot be queried during reconciliation. Daemon failures and timeouts
    /// are reported as outcomes.
    pub fn mount(&self, path: &Path, spec: &DaemonSpec) -> Result<SupervisionOutcome> {
        let started_at = self.clock.now();

        if self.reconcile(path)? {
            return Ok(SupervisionOutcome::AlreadyMounted);
        }

        let handle = match self.processes.start(&spec.labeled(MountLabel::for_path(path))) {
            Ok(handle) => handle,
            Err(err) => {
                let reason = match err {
                    Error::DaemonStart { output } => output,
                    other => other.to_string(),
                };
                self.reporter.daemon_failed(path, &reason);
                self.cleanup(path, None);
                return Ok(SupervisionOutcome::Failed { reason });
            }
        };
        self.reporter.daemon_started(path, &handle);

        let verdict = poll_until(self.clock.as_ref(), self.config.schedule(), || {
            Ok(self.check(path, &handle))
        })?;

        match verdict {
            Some(Verdict::Mounted) => {
                let elapsed = self.clock.now().saturating_duration_since(started_at);
                self.reporter.mounted(path, elapsed);
                Ok(SupervisionOutcome::Mounted)
            }
            Some(Verdict::Exited) => {
                let reason = match daemon::fetch_logs(self.processes.as_ref(), &handle) {
                    Ok(logs) if !logs.trim().is_empty() => logs,
                    Ok(_) => GENERIC_FAILURE.to_string(),
                    Err(err) => {
                        self.reporter.cleanup_failed(path, &err);
                        GENERIC_FAILURE.to_string()
                    }
                };
                self.reporter.daemon_failed(path, &reason);
                self.cleanup(path, Some(&handle));
                Ok(SupervisionOutcome::Failed { reason })
            }
            None => {
                self.reporter.timed_out(path, self.config.timeout);
                self.cleanup(path, Some(&handle));
                Ok(SupervisionOutcome::TimedOut {
                    after: self.config.timeout,
                })
            }
        }
    }

    /// Removes the daemon behind `path` and unmounts what is left.
    ///
    /// A path with neither daemon nor mount is a no-op.
    pub fn unmount(&self, path: &Path) -> Result<()> {
        let handles = daemon::find_daemons(self.processes.as_ref(), path)?;
        self.reporter.unmounting(path, handles.first());
        for handle in &handles {
            self.processes.remove(handle)?;
        }
        if self.mounts.is_mounted(path)? {
            self.mounts.unmount(path)?;
        }
        Ok(())
    }

    /// Resolves half states. Returns true when a healthy mount already exists.
    fn reconcile(&self, path: &Path) -> Result<bool> {
        let mut handles = daemon::find_daemons(self.processes.as_ref(), path)?.into_iter();
        let handle = handles.next();
        for extra in handles {
            self.reporter.duplicate_daemon(path, &extra);
            self.processes.remove(&extra)?;
        }

        let mounted = self.mounts.is_mounted(path)?;
        match (handle, mounted) {
            (Some(_), true) => Ok(true),
            (Some(handle), false) => {
                self.reporter.orphan_daemon(path, &handle);
                self.processes.remove(&handle)?;
                Ok(false)
            }
            (None, true) => {
                self.reporter.stale_mount(path);
                self.mounts.force_unmount(path)?;
                Ok(false)
            }
            (None, false) => Ok(false),
        }
    }

    fn check(&self, path: &Path, handle: &DaemonHandle) -> Poll<Verdict> {
        match self.mounts.is_mounted(path) {
            Ok(true) => return Poll::Ready(Verdict::Mounted),
            Ok(false) => {}
            Err(err) => {
                tracing::debug!(
                    target: "flexmount::supervisor",
                    path = %path.display(),
                    error = %err,
                    "mount status unavailable"
                );
            }
        }
        match daemon::check_health(self.processes.as_ref(), handle) {
            Ok(()) => Poll::Pending,
            Err(err) => {
                tracing::debug!(
                    target: "flexmount::supervisor",
                    daemon = %handle,
                    error = %err,
                    "daemon health check failed"
                );
                Poll::Ready(Verdict::Exited)
            }
        }
    }

    fn cleanup(&self, path: &Path, handle: Option<&DaemonHandle>) {
        match handle {
            Some(handle) => {
                if let Err(err) = self.processes.remove(handle) {
                    self.reporter.cleanup_failed(path, &err);
                }
            }
            // Reconciliation left no daemon behind, so a failed start leaves
            // at most one.
            None => match daemon::find_daemon(self.processes.as_ref(), path) {
                Ok(Some(handle)) => {
                    if let Err(err) = self.processes.remove(&handle) {
                        self.reporter.cleanup_failed(path, &err);
                    }
                }
                Ok(None) => {}
                Err(err) => self.reporter.cleanup_failed(path, &err),
            },
        }
        if let Err(err) = self.mounts.force_unmount(path) {
            self.reporter.cleanup_failed(path, &err);
        }
    }
}
