use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

const DEFAULT_PURGE_WAIT_SECS: u64 = 30;

/// Command-line arguments for the edgepurge binary.
#[derive(Debug, Parser)]
#[command(
    name = "edgepurge",
    version,
    about = "Edge cache purge coordinator"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "EDGEPURGE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the purge HTTP service and the deferred purge worker.
    Serve(Box<ServeArgs>),
    /// Send a single purge and print the resulting status as JSON.
    Purge(PurgeArgs),
    /// Print what the capability detector sees on this host.
    Status(StatusArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub edge: EdgeOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the deferred purge queue capacity.
    #[arg(long = "dispatch-queue-capacity", value_name = "COUNT")]
    pub dispatch_queue_capacity: Option<u64>,

    /// Override the dedup window; 0 keeps fingerprints for the process lifetime.
    #[arg(long = "dedup-ttl-seconds", value_name = "SECONDS")]
    pub dedup_ttl_seconds: Option<u64>,
}

/// Edge integration overrides shared by every command.
///
/// The site token is only read from the environment or a configuration file.
#[derive(Debug, Args, Default, Clone)]
pub struct EdgeOverrides {
    /// Override the edge site (application) id.
    #[arg(long = "edge-site-id", value_name = "ID")]
    pub site_id: Option<String>,

    /// Override the edge service base URL normally advertised by the host.
    #[arg(long = "edge-env", value_name = "URL")]
    pub edge_env: Option<String>,

    /// Log resolved purge targets and endpoint detection.
    #[arg(
        long = "edge-log-diagnostics",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_diagnostics: Option<bool>,

    /// Debug mode; disables TLS verification towards the edge service.
    #[arg(
        long = "edge-debug-mode",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub debug_mode: Option<bool>,

    /// Verify the edge service TLS certificate.
    #[arg(
        long = "edge-verify-tls",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub verify_tls: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub edge: EdgeOverrides,

    /// Page URL to purge; repeat for several. Without any, the whole site is purged.
    #[arg(long = "url", value_name = "URL", value_hint = ValueHint::Url)]
    pub urls: Vec<String>,

    /// Hand the purge to the background queue instead of calling the edge inline.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub deferred: bool,

    /// How long to wait for a deferred purge before giving up.
    #[arg(long = "wait-seconds", value_name = "SECONDS", default_value_t = DEFAULT_PURGE_WAIT_SECS)]
    pub wait_seconds: u64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub edge: EdgeOverrides,
}
