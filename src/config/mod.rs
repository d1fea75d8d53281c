//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::entities::{AppToken, MemberSite, SiteTopology};
use crate::purge::dedup::EvictionPolicy;

mod cli;

pub use cli::{CliArgs, Command, EdgeOverrides, PurgeArgs, ServeArgs, ServeOverrides, StatusArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgepurge";
const ENV_PREFIX: &str = "EDGEPURGE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8710;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DEDUP_TTL_SECS: u64 = 60;
const DEFAULT_QUEUE_CAPACITY: u64 = 256;
const DEFAULT_MAX_ATTEMPTS: u64 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub edge: EdgeSettings,
    pub hosting: HostingSettings,
    pub site: SiteTopology,
    pub dedup: DedupSettings,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Edge integration credentials and switches.
#[derive(Debug, Clone)]
pub struct EdgeSettings {
    pub site_id: Option<String>,
    pub site_token: Option<AppToken>,
    pub log_diagnostics: bool,
    pub debug_mode: bool,
    pub verify_tls: bool,
    pub require_managed_host: bool,
}

/// Overrides for the hosting signals normally read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct HostingSettings {
    pub document_root: Option<String>,
    pub edge_env: Option<String>,
    pub cf_worker: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
pub struct DedupSettings {
    pub eviction: EvictionPolicy,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub queue_capacity: NonZeroUsize,
    pub max_attempts: NonZeroU32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Purge(args)) => raw.apply_edge_overrides(&args.edge),
        Some(Command::Status(args)) => raw.apply_edge_overrides(&args.edge),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    edge: RawEdgeSettings,
    hosting: RawHostingSettings,
    site: RawSiteSettings,
    dedup: RawDedupSettings,
    dispatch: RawDispatchSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(capacity) = overrides.dispatch_queue_capacity {
            self.dispatch.queue_capacity = Some(capacity);
        }
        if let Some(ttl) = overrides.dedup_ttl_seconds {
            self.dedup.ttl_seconds = Some(ttl);
        }
        self.apply_edge_overrides(&overrides.edge);
    }

    fn apply_edge_overrides(&mut self, overrides: &EdgeOverrides) {
        if let Some(site_id) = overrides.site_id.as_ref() {
            self.edge.site_id = Some(site_id.clone());
        }
        if let Some(edge_env) = overrides.edge_env.as_ref() {
            self.hosting.edge_env = Some(edge_env.clone());
        }
        if let Some(flag) = overrides.log_diagnostics {
            self.edge.log_diagnostics = Some(flag);
        }
        if let Some(flag) = overrides.debug_mode {
            self.edge.debug_mode = Some(flag);
        }
        if let Some(flag) = overrides.verify_tls {
            self.edge.verify_tls = Some(flag);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            edge,
            hosting,
            site,
            dedup,
            dispatch,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            edge: build_edge_settings(edge),
            hosting: build_hosting_settings(hosting),
            site: build_site_topology(site)?,
            dedup: build_dedup_settings(dedup),
            dispatch: build_dispatch_settings(dispatch)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_edge_settings(edge: RawEdgeSettings) -> EdgeSettings {
    EdgeSettings {
        site_id: non_blank(edge.site_id),
        site_token: non_blank(edge.site_token).map(AppToken::new),
        log_diagnostics: edge.log_diagnostics.unwrap_or(false),
        debug_mode: edge.debug_mode.unwrap_or(false),
        verify_tls: edge.verify_tls.unwrap_or(true),
        require_managed_host: edge.require_managed_host.unwrap_or(true),
    }
}

fn build_hosting_settings(hosting: RawHostingSettings) -> HostingSettings {
    HostingSettings {
        document_root: non_blank(hosting.document_root),
        edge_env: non_blank(hosting.edge_env),
        cf_worker: hosting.cf_worker,
    }
}

fn build_site_topology(site: RawSiteSettings) -> Result<SiteTopology, LoadError> {
    let is_multisite = site.multisite.unwrap_or(false);
    let is_subdomain_install = site.subdomain_install.unwrap_or(false);

    if is_subdomain_install && !is_multisite {
        return Err(LoadError::invalid(
            "site.subdomain_install",
            "only applies to multisite networks",
        ));
    }

    let mut member_sites = Vec::with_capacity(site.sites.len() + 1);
    if let Some(home_url) = non_blank(site.home_url) {
        member_sites.push(MemberSite { id: 1, home_url });
    }
    for entry in site.sites {
        let Some(home_url) = non_blank(Some(entry.home_url)) else {
            return Err(LoadError::invalid(
                "site.sites",
                format!("site {} has an empty home_url", entry.id),
            ));
        };
        if member_sites.iter().any(|existing| existing.id == entry.id) {
            return Err(LoadError::invalid(
                "site.sites",
                format!("site id {} is listed twice", entry.id),
            ));
        }
        member_sites.push(MemberSite {
            id: entry.id,
            home_url,
        });
    }

    if !is_multisite && member_sites.len() > 1 {
        return Err(LoadError::invalid(
            "site.sites",
            "a single-site install has exactly one home url",
        ));
    }

    Ok(SiteTopology {
        is_multisite,
        is_subdomain_install,
        member_sites,
    })
}

fn build_dedup_settings(dedup: RawDedupSettings) -> DedupSettings {
    let ttl = dedup.ttl_seconds.unwrap_or(DEFAULT_DEDUP_TTL_SECS);
    DedupSettings {
        eviction: EvictionPolicy::from_ttl_seconds(ttl),
    }
}

fn build_dispatch_settings(dispatch: RawDispatchSettings) -> Result<DispatchSettings, LoadError> {
    let capacity = dispatch.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
    let queue_capacity = usize::try_from(capacity)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("dispatch.queue_capacity", "must be greater than zero"))?;

    let max_attempts = non_zero_u32(
        dispatch.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        "dispatch.max_attempts",
    )?;

    let retry_backoff =
        Duration::from_millis(dispatch.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS));

    Ok(DispatchSettings {
        queue_capacity,
        max_attempts,
        retry_backoff,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEdgeSettings {
    site_id: Option<String>,
    site_token: Option<String>,
    log_diagnostics: Option<bool>,
    debug_mode: Option<bool>,
    verify_tls: Option<bool>,
    require_managed_host: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHostingSettings {
    document_root: Option<String>,
    edge_env: Option<String>,
    cf_worker: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    multisite: Option<bool>,
    subdomain_install: Option<bool>,
    /// Primary site home URL.
    home_url: Option<String>,
    sites: Vec<RawMemberSite>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMemberSite {
    id: u64,
    home_url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDedupSettings {
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    queue_capacity: Option<u64>,
    max_attempts: Option<u64>,
    retry_backoff_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
