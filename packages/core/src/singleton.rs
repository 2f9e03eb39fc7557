//! Shared service containers started on demand.
//!
//! Some backends rely on one long-running container per host (the dataset
//! downloader). Concurrent driver invocations serialise on a lock file, look
//! the container up by name and start it only when it is missing.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::clock::Clock;
use crate::daemon::{DaemonFilter, DaemonHandle, DaemonSpec, DaemonState, ProcessManager};
use crate::error::{Error, Result};
use crate::poll::{Poll, PollSchedule, poll_until};

const TARGET: &str = "flexmount::singleton";

/// Exclusive lock represented by the existence of a file.
///
/// The file is removed when the guard is dropped.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    _file: File,
}

impl LockFile {
    fn try_create(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => Ok(Some(Self {
                path: path.to_path_buf(),
                _file: file,
            })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(source) => Err(Error::LockCreate {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Acquires the lock at `path`, retrying on every tick of `schedule`.
    pub fn acquire(clock: &dyn Clock, schedule: PollSchedule, path: &Path) -> Result<Self> {
        if let Some(lock) = Self::try_create(path)? {
            return Ok(lock);
        }
        tracing::debug!(target: TARGET, lock = %path.display(), "waiting for lock");
        let acquired = poll_until(clock, schedule, || {
            Ok(match Self::try_create(path)? {
                Some(lock) => Poll::Ready(lock),
                None => Poll::Pending,
            })
        })?;
        acquired.ok_or_else(|| Error::LockTimeout {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != ErrorKind::NotFound
        {
            tracing::warn!(
                target: TARGET,
                lock = %self.path.display(),
                error = %error,
                "failed to remove lock file"
            );
        }
    }
}

/// Makes sure the named container described by `spec` is running.
///
/// A running container is returned as is and a starting one is waited for.
/// An exited container is removed and started again from `spec`.
pub fn ensure_singleton(
    processes: &dyn ProcessManager,
    clock: &dyn Clock,
    schedule: PollSchedule,
    lock_path: &Path,
    spec: &DaemonSpec,
) -> Result<DaemonHandle> {
    let name = spec.name.clone().ok_or_else(|| Error::InvalidConfig {
        message: format!("service container for image '{}' has no name", spec.image),
    })?;

    let _lock = LockFile::acquire(clock, schedule, lock_path)?;

    if let Some(handle) = processes.list(&DaemonFilter::Name(name.clone()))?.into_iter().next() {
        match processes.inspect(&handle)? {
            DaemonState::Running => return Ok(handle),
            DaemonState::Other(state) => {
                tracing::debug!(target: TARGET, name = %name, state = %state, "waiting for service container");
                return wait_running(processes, clock, schedule, &name, handle);
            }
            DaemonState::Exited => {
                tracing::info!(target: TARGET, name = %name, container = %handle, "removing exited service container");
                processes.remove(&handle)?;
            }
        }
    }

    tracing::info!(target: TARGET, name = %name, image = %spec.image, "starting service container");
    let handle = processes.start(spec)?;
    wait_running(processes, clock, schedule, &name, handle)
}

fn wait_running(
    processes: &dyn ProcessManager,
    clock: &dyn Clock,
    schedule: PollSchedule,
    name: &str,
    handle: DaemonHandle,
) -> Result<DaemonHandle> {
    let state = poll_until(clock, schedule, || {
        Ok(match processes.inspect(&handle)? {
            DaemonState::Running => Poll::Ready(DaemonState::Running),
            DaemonState::Exited => Poll::Ready(DaemonState::Exited),
            DaemonState::Other(_) => Poll::Pending,
        })
    })?;

    match state {
        Some(DaemonState::Running) => Ok(handle),
        Some(_) => {
            let reason = processes
                .logs(&handle)
                .ok()
                .filter(|logs| !logs.trim().is_empty())
                .unwrap_or_else(|| format!("service container '{name}' has exited"));
            Err(Error::DaemonFailed { reason })
        }
        None => Err(Error::SingletonTimeout {
            name: name.to_string(),
        }),
    }
}
