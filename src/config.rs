//! Command-line parsing and run configuration.
//!
//! [`Cli`] is the raw clap surface. [`RunConfig`] is the validated,
//! read-only configuration both roles consume.

use crate::logging::LOG_LEVELS;
use crate::protocol::{MAX_PROBE_LEN, MIN_PROBE_LEN};
use clap::{ArgGroup, Parser};
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_PROBE_COUNT: usize = 50;
pub const DEFAULT_PAYLOAD_LEN: usize = 512;
pub const DEFAULT_INTERVAL_MS: u64 = 0;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Invalid configuration, detected before any socket is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Usage error: {0}")]
    Usage(String),
}

impl ConfigError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Parser, Debug, Clone)]
#[command(name = "netjitter", version)]
#[command(about = "Network latency and jitter probe (TCP or UDP echo)")]
#[command(group(ArgGroup::new("role").required(true).args(["server", "client"])))]
pub struct Cli {
    /// Run as echo server
    #[arg(short = 's', long = "server")]
    pub server: bool,

    /// Run as client against the given server address
    #[arg(short = 'c', long = "client", value_name = "SERVER")]
    pub client: Option<String>,

    /// Port to listen on or connect to
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of probes to send
    #[arg(short = 'n', long = "count", default_value_t = DEFAULT_PROBE_COUNT)]
    pub count: usize,

    /// Probe size in bytes
    #[arg(short = 'l', long = "length", default_value_t = DEFAULT_PAYLOAD_LEN)]
    pub length: usize,

    /// Use UDP instead of TCP (server: serve UDP only)
    #[arg(short = 'u', long = "udp")]
    pub udp: bool,

    /// Delay between probes in milliseconds
    #[arg(short = 'd', long = "interval-ms", default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Probes per second; overrides --interval-ms
    #[arg(short = 'r', long, value_name = "PPS")]
    pub rate: Option<u64>,

    /// How long to wait for a UDP reply before counting the probe as lost
    #[arg(long = "timeout-ms", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Unrecorded probes sent before measurement starts
    #[arg(short = 'w', long, default_value_t = 0)]
    pub warmup: usize,

    /// Write per-probe samples as CSV to this file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Server bind address
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Disable the live progress display
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error); defaults to info for
    /// the server and warn for the client
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub log_format: String,
}

impl Cli {
    /// Log level to initialise with, after applying the per-role default.
    pub fn effective_log_level(&self) -> &str {
        match &self.log_level {
            Some(level) => level.as_str(),
            None if self.server => "info",
            None => "warn",
        }
    }

    pub fn is_json_format(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => f.write_str("TCP"),
            TransportKind::Udp => f.write_str("UDP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Server { bind: String },
    Client { server: String },
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub role: Role,
    pub port: u16,
    pub probe_count: usize,
    pub payload_length: usize,
    pub transport: TransportKind,
    pub probe_interval: Duration,
    pub reply_timeout: Duration,
    pub warmup: usize,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

impl RunConfig {
    /// Client configuration with every option at its default.
    pub fn client(server: impl Into<String>, port: u16) -> Self {
        Self {
            role: Role::Client {
                server: server.into(),
            },
            port,
            probe_count: DEFAULT_PROBE_COUNT,
            payload_length: DEFAULT_PAYLOAD_LEN,
            transport: TransportKind::Tcp,
            probe_interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            reply_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            warmup: 0,
            output: None,
            quiet: true,
        }
    }

    /// Server configuration with every option at its default.
    pub fn server(bind: impl Into<String>, port: u16) -> Self {
        Self {
            role: Role::Server { bind: bind.into() },
            ..Self::client(String::new(), port)
        }
    }

    /// Builds and validates a configuration from parsed arguments.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let role = match (&cli.client, cli.server) {
            (Some(server), false) => Role::Client {
                server: server.clone(),
            },
            (None, true) => Role::Server {
                bind: cli.bind.clone(),
            },
            _ => {
                return Err(ConfigError::Usage(
                    "exactly one of -s (server) or -c <server> (client) is required".into(),
                ))
            }
        };

        if let Some(level) = &cli.log_level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::Usage(format!(
                    "log_level must be one of: {}",
                    LOG_LEVELS.join(", ")
                )));
            }
        }

        let probe_interval = match cli.rate {
            Some(0) => return Err(ConfigError::Usage("rate must be >= 1".into())),
            Some(pps) => interval_for_rate(pps),
            None => Duration::from_millis(cli.interval_ms),
        };

        let config = Self {
            role,
            port: cli.port,
            probe_count: cli.count,
            payload_length: cli.length,
            transport: if cli.udp {
                TransportKind::Udp
            } else {
                TransportKind::Tcp
            },
            probe_interval,
            reply_timeout: Duration::from_millis(cli.timeout_ms),
            warmup: cli.warmup,
            output: cli.output.clone(),
            quiet: cli.quiet,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<()> {
        debug!("Validating run configuration");

        if self.port == 0 {
            return Err(ConfigError::Usage("port must be in 1..=65535".into()));
        }

        match &self.role {
            Role::Client { server } if server.trim().is_empty() => {
                return Err(ConfigError::Usage(
                    "client mode requires a server address".into(),
                ));
            }
            Role::Server { bind } if bind.trim().is_empty() => {
                return Err(ConfigError::Usage("bind address must not be empty".into()));
            }
            _ => {}
        }

        if self.probe_count == 0 {
            return Err(ConfigError::Usage("count must be >= 1".into()));
        }

        if !(MIN_PROBE_LEN..=MAX_PROBE_LEN).contains(&self.payload_length) {
            return Err(ConfigError::Usage(format!(
                "length must be between {} and {} bytes",
                MIN_PROBE_LEN, MAX_PROBE_LEN
            )));
        }

        if self.reply_timeout.is_zero() {
            return Err(ConfigError::Usage("timeout must be > 0".into()));
        }

        debug!("Run configuration validated successfully");
        Ok(())
    }

    /// Creates the `-o` file up front so an unwritable path is reported
    /// before any socket is opened.
    pub fn prepare_output(&self) -> Result<()> {
        if let Some(path) = &self.output {
            File::create(path).map_err(|e| {
                ConfigError::Usage(format!(
                    "cannot write output file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub fn is_server(&self) -> bool {
        matches!(self.role, Role::Server { .. })
    }

    /// `host:port` string for the role's address, bracketing bare IPv6 literals.
    pub fn address(&self) -> String {
        let host = match &self.role {
            Role::Server { bind } => bind,
            Role::Client { server } => server,
        };
        join_host_port(host, self.port)
    }
}

/// Gap between probe sends for a target rate in probes per second.
fn interval_for_rate(pps: u64) -> Duration {
    Duration::from_micros(1_000_000 / pps)
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
