//! Unified error types for the flexmount-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use snafu::{ResultExt, Snafu};

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}': {source}"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {output}"))]
    CommandExit {
        command: String,
        code: i32,
        output: String,
    },

    /// Stat of a mount point or its parent failed.
    #[snafu(display("failed to get mount status of {}: {source}", path.display()))]
    MountStatus {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}: {source}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Bind mount failed.
    #[snafu(display("failed to bind {} to {}: {source}", from.display(), to.display()))]
    BindMount {
        from: PathBuf,
        to: PathBuf,
        source: Errno,
    },

    /// Unmount operation failed.
    #[snafu(display("failed to unmount {}: {source}", path.display()))]
    Unmount { path: PathBuf, source: Errno },

    /// Mount command (davfs and friends) failed.
    #[snafu(display("failed to mount {}: {message}", path.display()))]
    Mount { path: PathBuf, message: String },

    /// Listing daemons through the process manager failed.
    #[snafu(display("failed to list mount daemons: {output}"))]
    DaemonList { output: String },

    /// The daemon could not be started.
    #[snafu(display("failed to start mount daemon: {output}"))]
    DaemonStart { output: String },

    /// The daemon could not be stopped and removed.
    #[snafu(display("failed to remove mount daemon {handle}: {output}"))]
    DaemonStop { handle: String, output: String },

    /// The daemon state could not be inspected.
    #[snafu(display("failed to inspect mount daemon {handle}: {output}"))]
    DaemonInspect { handle: String, output: String },

    /// The daemon is no longer running.
    #[snafu(display("mount daemon {handle} has exited"))]
    DaemonExited { handle: String },

    /// The supervised daemon failed before the mount appeared.
    #[snafu(display("{reason}"))]
    DaemonFailed { reason: String },

    /// No mount appeared within the supervision timeout.
    #[snafu(display("failed to mount {}: timed out after {}s", path.display(), timeout.as_secs()))]
    MountTimeout { path: PathBuf, timeout: Duration },

    /// A lock file could not be acquired within the timeout.
    #[snafu(display("timed out waiting for lock {}", path.display()))]
    LockTimeout { path: PathBuf },

    /// A lock file could not be created.
    #[snafu(display("failed to create lock {}: {source}", path.display()))]
    LockCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A shared service container did not come up in time.
    #[snafu(display("timed out waiting for service container '{name}'"))]
    SingletonTimeout { name: String },

    /// The mount configuration is not valid JSON.
    #[snafu(display("failed to decode share parameters: {source}"))]
    ConfigDecode { source: serde_json::Error },

    /// The configuration does not name a backend.
    #[snafu(display("FS type to share is not defined"))]
    MissingBackend,

    /// The configured backend is not known.
    #[snafu(display("FS type '{scheme}' is not supported"))]
    UnsupportedBackend { scheme: String },

    /// A configuration value is missing.
    #[snafu(display("required parameter '{key}' is missing"))]
    MissingParameter { key: String },

    /// A configuration value is malformed.
    #[snafu(display("invalid configuration: {message}"))]
    InvalidConfig { message: String },

    /// Secret not present in the configuration.
    #[snafu(display("secret '{name}' not found"))]
    SecretMissing { name: String },

    /// Secret present but not a string.
    #[snafu(display("bad secret '{name}' value"))]
    SecretInvalid { name: String },

    /// Secret is not valid base64.
    #[snafu(display("failed to decode secret '{name}': {source}"))]
    SecretDecode {
        name: String,
        source: base64::DecodeError,
    },

    /// Bucket name violates the naming rules.
    #[snafu(display("invalid bucket name '{bucket}': {reason}"))]
    InvalidBucket { bucket: String, reason: String },

    /// URL could not be parsed.
    #[snafu(display("invalid URL '{url}': {source}"))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// HTTP transport error.
    #[snafu(display("request to {url} failed: {source}"))]
    Http {
        url: String,
        source: reqwest::Error,
    },

    /// HTTP request answered with an error status.
    #[snafu(display("{status}: {body}"))]
    HttpStatus { status: u16, body: String },

    /// No usable network interface.
    #[snafu(display("no non-loopback IPv4 address found; are you connected to the network?"))]
    NoNetwork,

    /// Enumerating network interfaces failed.
    #[snafu(display("failed to list network interfaces: {source}"))]
    Interfaces { source: Errno },
}

impl Error {
    /// Returns true when the error means the requested backend does not exist.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedBackend { .. })
    }
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for mount status queries.
    fn mount_status_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for mount point creation errors.
    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn mount_status_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountStatusSnafu { path: path.into() })
    }

    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountPointCreationSnafu { path: path.into() })
    }
}
