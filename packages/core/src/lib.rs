//! flexmount-core: Core library for the flexmount volume driver.
//!
//! This library mounts remote data sources (object storage buckets, git
//! repositories, WebDAV exports, versioned datasets, host directories) at
//! mount points handed over by a container orchestrator. Most backends run
//! their filesystem in a long-lived container, the mount daemon, which the
//! [`supervisor`] starts, watches and tears down.
//!
//! # Modules
//!
//! - [`supervisor`]: Reconcile, launch and poll one mount daemon
//! - [`daemon`]: Daemon registry over the container runtime
//! - [`label`]: The `flex.mount.path` label joining daemons to mount points
//! - [`mount`]: Mount status and bind/unmount primitives
//! - [`poll`]: Tick/timeout polling
//! - [`share`]: Backends and their registry
//! - [`singleton`]: Host-wide service containers behind a lock file
//! - [`config`]: Per-request options and secrets
//! - [`driver`] / [`protocol`]: Driver calls and their JSON replies
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use flexmount_core::{BackendRegistry, Driver, ShareContext, SupervisorConfig};
//!
//! let ctx = ShareContext::system("docker", SupervisorConfig::default());
//! let driver = Driver::new(BackendRegistry::with_defaults(), ctx);
//!
//! let reply = driver.mount(
//!     Path::new("/var/lib/kubelet/pods/x/volumes/data"),
//!     r#"{"kuberlabFS": "s3", "bucket": "datasets"}"#,
//! );
//! println!("{}", serde_json::to_string(&reply).unwrap());
//! ```

pub mod clock;
pub mod config;
pub mod daemon;
pub mod driver;
pub mod error;
pub mod executor;
pub mod label;
pub mod mount;
pub mod net;
pub mod poll;
pub mod protocol;
pub mod report;
pub mod share;
pub mod singleton;
pub mod supervisor;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::MountConfig;
pub use daemon::{DaemonHandle, DaemonSpec, DockerCli, ProcessManager};
pub use driver::Driver;
pub use error::{Error, Result};
pub use label::MountLabel;
pub use protocol::{DriverStatus, Status};
pub use share::{BackendRegistry, Share, ShareContext};
pub use supervisor::{SupervisionOutcome, Supervisor, SupervisorConfig};
