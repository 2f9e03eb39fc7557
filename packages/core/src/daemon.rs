//! Mount daemon registry and lifecycle control.
//!
//! A mount daemon is a long-running container that implements the filesystem
//! behind one mount point. Daemons are found by their [`MountLabel`], never by
//! a cached id, so the container runtime stays the single source of truth.

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::executor::CommandRunner;
use crate::label::MountLabel;

/// Opaque id of a daemon (a container id or name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DaemonHandle(String);

impl DaemonHandle {
    /// Wraps a raw id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DaemonHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status reported by the process manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    /// The daemon is running.
    Running,
    /// The daemon has stopped and will not come back on its own.
    Exited,
    /// Any other status (created, restarting, paused...).
    Other(String),
}

impl DaemonState {
    /// Maps a container runtime status string.
    pub fn from_status(status: &str) -> Self {
        match status.trim() {
            "running" => DaemonState::Running,
            "exited" | "dead" => DaemonState::Exited,
            other => DaemonState::Other(other.to_string()),
        }
    }
}

/// How to select daemons when listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonFilter {
    /// Daemons carrying this mount label.
    Label(MountLabel),
    /// The daemon with exactly this name.
    Name(String),
}

/// Restart policy of a started daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart (runtime default).
    #[default]
    Never,
    /// Restart whenever the daemon stops.
    Always,
}

/// Everything needed to start one daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonSpec {
    /// Image to run.
    pub image: String,
    /// Container options placed before the image (privileges, mounts...).
    pub options: Vec<String>,
    /// Environment variables.
    pub env: Vec<(String, String)>,
    /// Command and arguments placed after the image.
    pub command: Vec<String>,
    /// Mount label, set by the supervisor.
    pub label: Option<MountLabel>,
    /// Fixed container name.
    pub name: Option<String>,
    /// Restart policy.
    pub restart: RestartPolicy,
}

impl DaemonSpec {
    /// Creates a spec for `image`.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Appends container options.
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Appends an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Appends a command argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    /// Sets the container name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the restart policy.
    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    /// Returns a copy labelled for `label`.
    pub fn labeled(&self, label: MountLabel) -> Self {
        Self {
            label: Some(label),
            ..self.clone()
        }
    }

    /// Privileged FUSE container exposing `path` at `target` with shared
    /// propagation, so mounts made inside show up on the host.
    pub fn fuse(image: impl Into<String>, path: &Path, target: &str) -> Self {
        Self::new(image)
            .option("--privileged")
            .option("--mount")
            .option(format!(
                "type=bind,source={},target={},bind-propagation=shared",
                path.display(),
                target
            ))
            .option("--cap-add")
            .option("SYS_ADMIN")
    }
}

/// Narrow contract over the external process manager.
pub trait ProcessManager: Send + Sync {
    /// Lists daemons matching `filter`, including stopped ones.
    fn list(&self, filter: &DaemonFilter) -> Result<Vec<DaemonHandle>>;

    /// Starts a detached daemon and returns its handle.
    fn start(&self, spec: &DaemonSpec) -> Result<DaemonHandle>;

    /// Reports the daemon's lifecycle status.
    fn inspect(&self, handle: &DaemonHandle) -> Result<DaemonState>;

    /// Returns the daemon's captured output.
    fn logs(&self, handle: &DaemonHandle) -> Result<String>;

    /// Stops and removes the daemon.
    fn remove(&self, handle: &DaemonHandle) -> Result<()>;
}

/// Finds the daemons labelled with `path`.
pub fn find_daemons(manager: &dyn ProcessManager, path: &Path) -> Result<Vec<DaemonHandle>> {
    manager.list(&DaemonFilter::Label(MountLabel::for_path(path)))
}

/// Finds the daemon labelled with `path`, if any.
pub fn find_daemon(manager: &dyn ProcessManager, path: &Path) -> Result<Option<DaemonHandle>> {
    Ok(find_daemons(manager, path)?.into_iter().next())
}

/// Fails with [`Error::DaemonExited`] if the daemon has exited.
pub fn check_health(manager: &dyn ProcessManager, handle: &DaemonHandle) -> Result<()> {
    match manager.inspect(handle)? {
        DaemonState::Exited => Err(Error::DaemonExited {
            handle: handle.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Fetches the daemon's output for diagnostics.
pub fn fetch_logs(manager: &dyn ProcessManager, handle: &DaemonHandle) -> Result<String> {
    manager.logs(handle)
}

/// [`ProcessManager`] driving the docker command line.
pub struct DockerCli<R> {
    runner: R,
    binary: String,
}

impl<R: CommandRunner> DockerCli<R> {
    /// Uses `docker` from `PATH`.
    pub fn new(runner: R) -> Self {
        Self::with_binary(runner, "docker")
    }

    /// Uses a specific docker-compatible binary.
    pub fn with_binary(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    fn docker(&self, args: &[&str]) -> Result<crate::executor::CommandOutput> {
        self.runner.run(&self.binary, args)
    }
}

/// Builds the `docker run` argument list for `spec`.
pub fn run_args(spec: &DaemonSpec) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string()];
    if let Some(label) = &spec.label {
        args.push("-l".to_string());
        args.push(label.to_string());
    }
    if let Some(name) = &spec.name {
        args.push("--name".to_string());
        args.push(name.clone());
    }
    if spec.restart == RestartPolicy::Always {
        args.push("--restart".to_string());
        args.push("always".to_string());
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.extend(spec.options.iter().cloned());
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

fn parse_ids(stdout: &str) -> Vec<DaemonHandle> {
    stdout
        .lines()
        .map(|line| line.trim().trim_matches('"'))
        .filter(|line| !line.is_empty())
        .map(DaemonHandle::new)
        .collect()
}

impl<R: CommandRunner> ProcessManager for DockerCli<R> {
    fn list(&self, filter: &DaemonFilter) -> Result<Vec<DaemonHandle>> {
        let filter_arg = match filter {
            DaemonFilter::Label(label) => label.filter_arg(),
            DaemonFilter::Name(name) => format!("name=^/?{name}$"),
        };
        let out = self.docker(&["ps", "-a", "--filter", &filter_arg, "--format", "{{ .ID }}"])?;
        if !out.success() {
            return Err(Error::DaemonList {
                output: out.combined(),
            });
        }
        Ok(parse_ids(&out.stdout))
    }

    fn start(&self, spec: &DaemonSpec) -> Result<DaemonHandle> {
        let args = run_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.docker(&args)?;
        if !out.success() {
            return Err(Error::DaemonStart {
                output: out.combined(),
            });
        }
        parse_ids(&out.stdout)
            .pop()
            .ok_or_else(|| Error::DaemonStart {
                output: out.combined(),
            })
    }

    fn inspect(&self, handle: &DaemonHandle) -> Result<DaemonState> {
        let out = self.docker(&["inspect", handle.as_str(), "--format", "{{ .State.Status }}"])?;
        if !out.success() {
            return Err(Error::DaemonInspect {
                handle: handle.to_string(),
                output: out.combined(),
            });
        }
        Ok(DaemonState::from_status(&out.stdout))
    }

    fn logs(&self, handle: &DaemonHandle) -> Result<String> {
        Ok(self
            .docker(&["logs", handle.as_str()])?
            .checked("docker logs")?
            .combined())
    }

    fn remove(&self, handle: &DaemonHandle) -> Result<()> {
        let out = self.docker(&["rm", "--force", handle.as_str()])?;
        if !out.success() {
            return Err(Error::DaemonStop {
                handle: handle.to_string(),
                output: out.combined(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::ScriptedRunner;

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_run_args_with_label() {
        let spec = DaemonSpec::fuse("kuberlab/s3fs", Path::new("/mnt/x"), "/mnt/mountpoint")
            .env("S3User", "id")
            .arg("bucket")
            .labeled(MountLabel::for_path(Path::new("/mnt/x")));
        assert_eq!(
            run_args(&spec),
            vec![
                "run",
                "-d",
                "-l",
                "flex.mount.path=/mnt/x",
                "-e",
                "S3User=id",
                "--privileged",
                "--mount",
                "type=bind,source=/mnt/x,target=/mnt/mountpoint,bind-propagation=shared",
                "--cap-add",
                "SYS_ADMIN",
                "kuberlab/s3fs",
                "bucket",
            ]
        );
    }

    #[test]
    fn test_run_args_named_singleton() {
        let spec = DaemonSpec::new("kuberlab/pluk-downloader:latest")
            .named("pluk-downloader")
            .restart(RestartPolicy::Always)
            .option("--network=host");
        assert_eq!(
            run_args(&spec),
            vec![
                "run",
                "-d",
                "--name",
                "pluk-downloader",
                "--restart",
                "always",
                "--network=host",
                "kuberlab/pluk-downloader:latest",
            ]
        );
    }

    #[test]
    fn test_list_by_label_trims_output() {
        let runner = ScriptedRunner::new(vec![ok("c4e1f5a1af33\n")]);
        let docker = DockerCli::new(runner.clone());
        let found = find_daemon(&docker, Path::new("/mnt/x")).unwrap();
        assert_eq!(found, Some(DaemonHandle::new("c4e1f5a1af33")));
        assert_eq!(
            runner.calls()[0],
            "docker ps -a --filter label=flex.mount.path=/mnt/x --format {{ .ID }}"
        );
    }

    #[test]
    fn test_list_empty_is_none() {
        let runner = ScriptedRunner::new(vec![ok("")]);
        let docker = DockerCli::new(runner);
        assert_eq!(find_daemon(&docker, Path::new("/mnt/x")).unwrap(), None);
    }

    #[test]
    fn test_start_failure_carries_output() {
        let runner = ScriptedRunner::new(vec![CommandOutput {
            code: 125,
            stdout: String::new(),
            stderr: "Unable to find image".into(),
        }]);
        let docker = DockerCli::new(runner);
        let err = docker.start(&DaemonSpec::new("missing")).unwrap_err();
        match err {
            Error::DaemonStart { output } => assert_eq!(output, "Unable to find image"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_health() {
        let runner = ScriptedRunner::new(vec![ok("running\n"), ok("exited\n")]);
        let docker = DockerCli::new(runner);
        let handle = DaemonHandle::new("abc");
        assert!(check_health(&docker, &handle).is_ok());
        assert!(matches!(
            check_health(&docker, &handle),
            Err(Error::DaemonExited { .. })
        ));
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(DaemonState::from_status("running\n"), DaemonState::Running);
        assert_eq!(DaemonState::from_status("dead"), DaemonState::Exited);
        assert_eq!(
            DaemonState::from_status("restarting"),
            DaemonState::Other("restarting".into())
        );
    }

    #[test]
    fn test_remove_uses_force() {
        let runner = ScriptedRunner::new(vec![ok("abc\n")]);
        let docker = DockerCli::with_binary(runner.clone(), "podman");
        docker.remove(&DaemonHandle::new("abc")).unwrap();
        assert_eq!(runner.calls(), vec!["podman rm --force abc"]);
    }
}
