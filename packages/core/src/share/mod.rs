//! Share backends and their selection.
//!
//! A [`Share`] makes one kind of data source appear at a mount point. The
//! [`BackendRegistry`] maps the scheme named in the request (`kuberlabFS`) to
//! a factory building the matching backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::MountConfig;
use crate::daemon::{DockerCli, ProcessManager};
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, ExecutionContext};
use crate::mount::{HostMountTable, MountTable};
use crate::report::{MountReporter, TracingReporter};
use crate::supervisor::{Supervisor, SupervisorConfig};

pub mod download;
pub mod git;
pub mod host;
pub mod plukefs;
pub mod s3;
pub mod webdav;

pub(crate) const TARGET: &str = "flexmount::share";

/// A data source that can be mounted at a path.
pub trait Share {
    /// Makes the source available at `path`.
    fn mount(&self, path: &Path) -> Result<()>;

    /// Tears down what [`Share::mount`] set up.
    fn unmount(&self, path: &Path) -> Result<()>;
}

/// Collaborators shared by all backends.
#[derive(Clone)]
pub struct ShareContext {
    /// Container runtime.
    pub processes: Arc<dyn ProcessManager>,
    /// Mount table and mount primitives.
    pub mounts: Arc<dyn MountTable>,
    /// Runner for plain commands (`git`, `mount`, `findmnt`).
    pub runner: Arc<dyn CommandRunner>,
    /// Time source for polling.
    pub clock: Arc<dyn Clock>,
    /// Lifecycle event sink.
    pub reporter: Arc<dyn MountReporter>,
    /// Polling tunables.
    pub supervisor: SupervisorConfig,
    /// Directory holding lock files.
    pub lock_dir: PathBuf,
}

impl ShareContext {
    /// Context talking to the real host through `docker_binary`.
    pub fn system(docker_binary: &str, supervisor: SupervisorConfig) -> Self {
        Self {
            processes: Arc::new(DockerCli::with_binary(ExecutionContext::new(), docker_binary)),
            mounts: Arc::new(HostMountTable),
            runner: Arc::new(ExecutionContext::new()),
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingReporter),
            supervisor,
            lock_dir: std::env::temp_dir(),
        }
    }

    /// Uses `dir` for lock files.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// A supervisor over this context's collaborators.
    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(
            self.processes.clone(),
            self.mounts.clone(),
            self.clock.clone(),
            self.reporter.clone(),
            self.supervisor,
        )
    }

    /// Logs the mount status of `path` after a direct mount.
    pub(crate) fn log_mount_result(&self, path: &Path) {
        match self.mounts.is_mounted(path) {
            Ok(mounted) => tracing::info!(
                target: TARGET,
                path = %path.display(),
                mounted,
                "mount result"
            ),
            Err(err) => tracing::warn!(
                target: TARGET,
                path = %path.display(),
                error = %err,
                "can't get mount status"
            ),
        }
    }
}

/// Builds a backend from its configuration.
pub type ShareFactory = fn(&ShareContext, MountConfig) -> Result<Box<dyn Share>>;

/// Scheme name to backend factory.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, ShareFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(s3::SCHEME, s3::factory);
        registry.register(plukefs::SCHEME, plukefs::factory);
        registry.register(git::SCHEME, git::factory);
        registry.register(webdav::SCHEME, webdav::factory);
        registry.register(download::SCHEME, download::factory);
        registry.register(host::SCHEME, host::factory);
        registry
    }

    /// Registers `factory` under `scheme`, replacing any previous entry.
    pub fn register(&mut self, scheme: impl Into<String>, factory: ShareFactory) {
        self.factories.insert(scheme.into(), factory);
    }

    /// Registered scheme names.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the backend named by `config`.
    pub fn create(&self, ctx: &ShareContext, config: MountConfig) -> Result<Box<dyn Share>> {
        let scheme = config.scheme()?.to_string();
        let factory = self
            .factories
            .get(&scheme)
            .ok_or_else(|| Error::UnsupportedBackend {
                scheme: scheme.clone(),
            })?;
        tracing::debug!(target: TARGET, scheme = %scheme, "selected backend");
        factory(ctx, config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{FakeMountTable, FakeProcessManager, Journal, ManualClock, ScriptedRunner};

    pub(crate) struct Fixture {
        pub journal: Journal,
        pub processes: Arc<FakeProcessManager>,
        pub mounts: Arc<FakeMountTable>,
        pub runner: ScriptedRunner,
        pub ctx: ShareContext,
    }

    pub(crate) fn fixture() -> Fixture {
        let journal = Journal::default();
        let processes = Arc::new(FakeProcessManager::new(journal.clone()));
        let mounts = Arc::new(FakeMountTable::new(journal.clone()));
        let runner = ScriptedRunner::default();
        let ctx = ShareContext {
            processes: processes.clone(),
            mounts: mounts.clone(),
            runner: Arc::new(runner.clone()),
            clock: Arc::new(ManualClock::new()),
            reporter: Arc::new(TracingReporter),
            supervisor: SupervisorConfig::default(),
            lock_dir: std::env::temp_dir(),
        };
        Fixture {
            journal,
            processes,
            mounts,
            runner,
            ctx,
        }
    }

    #[test]
    fn test_default_schemes() {
        let registry = BackendRegistry::with_defaults();
        let schemes: Vec<&str> = registry.schemes().collect();
        assert_eq!(
            schemes,
            vec!["download", "git", "host", "plukefs", "s3", "webdav"]
        );
    }

    #[test]
    fn test_unknown_scheme_is_unsupported() {
        let fx = fixture();
        let config = MountConfig::parse(r#"{"kuberlabFS":"nfs"}"#).unwrap();
        let err = BackendRegistry::with_defaults()
            .create(&fx.ctx, config)
            .err()
            .unwrap();
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "FS type 'nfs' is not supported");
    }

    #[test]
    fn test_missing_scheme() {
        let fx = fixture();
        let config = MountConfig::parse(r#"{"bucket":"b"}"#).unwrap();
        let err = BackendRegistry::with_defaults()
            .create(&fx.ctx, config)
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingBackend));
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_custom_factory() {
        struct Noop;
        impl Share for Noop {
            fn mount(&self, _path: &Path) -> Result<()> {
                Ok(())
            }
            fn unmount(&self, _path: &Path) -> Result<()> {
                Ok(())
            }
        }
        fn noop(_ctx: &ShareContext, _config: MountConfig) -> Result<Box<dyn Share>> {
            Ok(Box::new(Noop))
        }

        let fx = fixture();
        let mut registry = BackendRegistry::new();
        registry.register("noop", noop);
        let share = registry
            .create(&fx.ctx, MountConfig::parse(r#"{"kuberlabFS":"noop"}"#).unwrap())
            .unwrap();
        share.mount(Path::new("/mnt/x")).unwrap();
    }
}
