//! Versioned datasets mounted through a plukefs container.

use std::path::Path;

use super::{Share, ShareContext};
use crate::config::MountConfig;
use crate::daemon::DaemonSpec;
use crate::error::{Error, Result};
use crate::net;

/// Scheme name in the request.
pub const SCHEME: &str = "plukefs";

const IMAGE: &str = "kuberlab/plukefs:latest";
const CONTAINER_MOUNT: &str = "/mnt/mountpoint";
const DEFAULT_SERVER_PORT: u16 = 30802;
const REQUIRED: [&str; 4] = ["secret_workspace", "object_workspace", "name", "version"];

/// Resolved daemon parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlukeParams {
    pub secret_workspace: String,
    pub object_workspace: String,
    pub name: String,
    pub version: String,
    pub kind: String,
    pub server: String,
    pub secret: String,
}

impl PlukeParams {
    /// Reads the parameters, using `default_server` when `server` is absent.
    pub fn from_config(
        config: &MountConfig,
        default_server: impl FnOnce() -> Result<String>,
    ) -> Result<Self> {
        if REQUIRED.iter().any(|key| config.get(key).is_none()) {
            return Err(Error::InvalidConfig {
                message: format!("{} are required", REQUIRED.join(", ")),
            });
        }
        let server = match config.get("server") {
            Some(server) => server,
            None => default_server()?,
        };
        Ok(Self {
            secret_workspace: config.require("secret_workspace")?,
            object_workspace: config.require("object_workspace")?,
            name: config.require("name")?,
            version: config.require("version")?,
            kind: config.get("type").unwrap_or_else(|| "dataset".to_string()),
            server,
            secret: config.optional_secret("token")?.unwrap_or_default(),
        })
    }

    /// The daemon exposing this dataset at `path`.
    pub fn daemon_spec(&self, path: &Path) -> DaemonSpec {
        let options = [
            ("secret_workspace", self.secret_workspace.as_str()),
            ("object_workspace", self.object_workspace.as_str()),
            ("name", self.name.as_str()),
            ("version", self.version.as_str()),
            ("type", self.kind.as_str()),
            ("server", self.server.as_str()),
            ("secret", self.secret.as_str()),
            ("mountPoint", CONTAINER_MOUNT),
        ];
        options.iter().fold(
            DaemonSpec::fuse(IMAGE, path, CONTAINER_MOUNT).arg("plukefs"),
            |spec, (key, value)| spec.arg("-o").arg(format!("{key}={value}")),
        )
    }
}

fn default_server() -> Result<String> {
    Ok(format!("http://{}:{}", net::local_ip()?, DEFAULT_SERVER_PORT))
}

/// plukefs-backed share.
pub struct PlukeShare {
    ctx: ShareContext,
    config: MountConfig,
}

impl PlukeShare {
    /// Creates the backend; parameters are validated on mount.
    pub fn new(ctx: &ShareContext, config: MountConfig) -> Self {
        Self {
            ctx: ctx.clone(),
            config,
        }
    }
}

pub(super) fn factory(ctx: &ShareContext, config: MountConfig) -> Result<Box<dyn Share>> {
    Ok(Box::new(PlukeShare::new(ctx, config)))
}

impl Share for PlukeShare {
    fn mount(&self, path: &Path) -> Result<()> {
        let params = PlukeParams::from_config(&self.config, default_server)?;
        let spec = params.daemon_spec(path);
        self.ctx.supervisor().mount(path, &spec)?.into_result(path)
    }

    fn unmount(&self, path: &Path) -> Result<()> {
        self.ctx.supervisor().unmount(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::DaemonState;
    use crate::share::tests::fixture;

    const CONFIG: &str = r#"{
        "kuberlabFS": "plukefs",
        "secret_workspace": "ws-secret",
        "object_workspace": "kuberlab-demo",
        "name": "styles",
        "version": "1.0.0",
        "server": "http://10.0.0.2:8082",
        "kubernetes.io/secret/token": "dG9r"
    }"#;

    fn no_default_server() -> Result<String> {
        panic!("default server must not be resolved");
    }

    #[test]
    fn test_params_and_spec() {
        let config = MountConfig::parse(CONFIG).unwrap();
        let params = PlukeParams::from_config(&config, no_default_server).unwrap();
        assert_eq!(params.kind, "dataset");
        assert_eq!(params.secret, "tok");

        let spec = params.daemon_spec(Path::new("/mnt/x"));
        assert_eq!(spec.image, "kuberlab/plukefs:latest");
        assert_eq!(
            spec.command,
            vec![
                "plukefs",
                "-o",
                "secret_workspace=ws-secret",
                "-o",
                "object_workspace=kuberlab-demo",
                "-o",
                "name=styles",
                "-o",
                "version=1.0.0",
                "-o",
                "type=dataset",
                "-o",
                "server=http://10.0.0.2:8082",
                "-o",
                "secret=tok",
                "-o",
                "mountPoint=/mnt/mountpoint",
            ]
        );
    }

    #[test]
    fn test_default_server_is_used() {
        let config = MountConfig::parse(
            r#"{"secret_workspace":"a","object_workspace":"b","name":"c","version":"1"}"#,
        )
        .unwrap();
        let params =
            PlukeParams::from_config(&config, || Ok("http://192.168.0.9:30802".into())).unwrap();
        assert_eq!(params.server, "http://192.168.0.9:30802");
        assert_eq!(params.secret, "");
    }

    #[test]
    fn test_missing_required_params() {
        let config = MountConfig::parse(r#"{"name":"c","version":"1"}"#).unwrap();
        let err = PlukeParams::from_config(&config, no_default_server).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: secret_workspace, object_workspace, name, version are required"
        );
    }

    #[test]
    fn test_daemon_exit_surfaces_logs() {
        let fx = fixture();
        fx.processes.script_states(vec![DaemonState::Exited]);
        fx.processes.set_logs("plukefs: dataset styles:1.0.0 not found");
        let share = PlukeShare::new(&fx.ctx, MountConfig::parse(CONFIG).unwrap());

        let err = share.mount(Path::new("/mnt/x")).unwrap_err();
        assert_eq!(err.to_string(), "plukefs: dataset styles:1.0.0 not found");
        assert!(fx.processes.live().is_empty());
    }
}
