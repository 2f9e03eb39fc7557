//! Log sinks for the driver binary.
//!
//! Stdout is reserved for the protocol reply. Events go to the systemd
//! journal when it is reachable, and to stderr only on request.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logging options taken from the command line or environment.
pub struct LogOptions<'a> {
    pub filter: &'a str,
    pub journald: bool,
    pub stderr: bool,
}

/// Installs the global subscriber. Safe to call once per process.
pub fn init(options: &LogOptions<'_>) {
    let env_filter = EnvFilter::try_new(options.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = options
        .stderr
        .then(|| fmt::layer().with_writer(std::io::stderr).with_ansi(false));

    let journald_layer = if options.journald {
        tracing_journald::layer()
            .ok()
            .map(|layer| layer.with_syslog_identifier("flexmount".to_string()))
    } else {
        None
    };

    // A second init in the same process keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(journald_layer)
        .try_init();
}
