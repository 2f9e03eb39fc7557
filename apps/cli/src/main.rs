//! flexmount - volume driver binary.
//!
//! Called by the orchestrator as `flexmount init`, `flexmount mount <path>
//! <json>` or `flexmount unmount <path> <json>`. Each call prints one JSON
//! reply on stdout and exits non-zero on failure.

mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser, Subcommand};
use flexmount_core::{BackendRegistry, Driver, DriverStatus, ShareContext, SupervisorConfig};

/// Volume driver mounting remote data sources through daemon containers.
#[derive(Parser)]
#[command(name = "flexmount")]
#[command(about = "Volume driver for daemon-backed mounts", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter directive.
    #[arg(long, env = "FLEXMOUNT_LOG", default_value = "info", global = true)]
    log: String,

    /// Send logs to the systemd journal.
    #[arg(long, env = "FLEXMOUNT_JOURNALD", default_value_t = true, action = ArgAction::Set, global = true)]
    journald: bool,

    /// Also write logs to stderr.
    #[arg(long, env = "FLEXMOUNT_STDERR_LOG", default_value_t = false, action = ArgAction::Set, global = true)]
    stderr_log: bool,

    /// Seconds between two mount checks.
    #[arg(long, env = "FLEXMOUNT_POLL_INTERVAL_SECS", default_value_t = 2, global = true)]
    poll_interval: u64,

    /// Seconds to wait for a daemon-backed mount to appear.
    #[arg(long, env = "FLEXMOUNT_MOUNT_TIMEOUT_SECS", default_value_t = 120, global = true)]
    mount_timeout: u64,

    /// Container runtime binary.
    #[arg(long, env = "FLEXMOUNT_DOCKER", default_value = "docker", global = true)]
    docker: String,

    /// Directory holding lock files.
    #[arg(long, env = "FLEXMOUNT_LOCK_DIR", default_value = "/tmp", global = true)]
    lock_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report driver capabilities.
    Init,
    /// Mount the share described by OPTIONS at PATH.
    Mount {
        path: PathBuf,
        /// JSON object with the backend and its parameters.
        options: String,
    },
    /// Unmount the share at PATH.
    Unmount {
        path: PathBuf,
        /// JSON object with the backend and its parameters.
        options: String,
    },
    #[command(external_subcommand)]
    Other(Vec<String>),
}

impl Cli {
    fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            timeout: Duration::from_secs(self.mount_timeout),
        }
    }
}

fn reply(status: &DriverStatus) -> ExitCode {
    match serde_json::to_string(status) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode reply");
            println!(r#"{{"status":"Failure","message":"failed to encode reply"}}"#);
            return ExitCode::FAILURE;
        }
    }
    match status.exit_code() {
        0 => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

/// Reply for a call the parser rejected. `None` for help and version output.
fn parse_failure(err: &clap::Error) -> Option<DriverStatus> {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => None,
        ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand | ErrorKind::MissingSubcommand => {
            Some(DriverStatus::failure("wrong args number: no driver call given"))
        }
        _ => Some(DriverStatus::failure(error_message(err))),
    }
}

/// The rendered parse error on one line, without the usage hints.
fn error_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let message = rendered
        .lines()
        .take_while(|line| !line.starts_with("Usage:") && !line.starts_with("For more information"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    match message.strip_prefix("error: ") {
        Some(rest) => rest.to_string(),
        None if message.is_empty() => "invalid arguments".to_string(),
        None => message,
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match parse_failure(&e) {
            Some(status) => return reply(&status),
            None => e.exit(),
        },
    };

    telemetry::init(&telemetry::LogOptions {
        filter: &cli.log,
        journald: cli.journald,
        stderr: cli.stderr_log,
    });

    let ctx = ShareContext::system(&cli.docker, cli.supervisor_config()).with_lock_dir(&cli.lock_dir);
    let driver = Driver::new(BackendRegistry::with_defaults(), ctx);

    let status = match &cli.command {
        Commands::Init => driver.init(),
        Commands::Mount { path, options } => driver.mount(path, options),
        Commands::Unmount { path, options } => driver.unmount(path, options),
        Commands::Other(args) => {
            let command = args.first().map(String::as_str).unwrap_or_default();
            tracing::info!(command, "unsupported driver call");
            DriverStatus::not_supported(format!("command '{command}' is not supported"))
        }
    };
    reply(&status)
}
