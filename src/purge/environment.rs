//! Hosting capability detection.
//!
//! Decides whether the edge integration is usable at all and which platform
//! flavour is serving the site. Every check reads fresh signals from the
//! injected probe; an unconfigured host is a silent "disabled" state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::domain::entities::{AppToken, EdgeEndpointConfig};
use crate::domain::types::{FlexibleStage, PlatformTag};

use super::normalize::ensure_trailing_slash;

const STAGING_ROOT_MARKER: &str = "cloudwaysstagingapps.com";
const PRODUCTION_ROOT_MARKER: &str = "cloudwaysapps.com";
const MANAGED_ROOT_MARKERS: [&str; 2] = ["cloudwaysapps", "cloudwaysstagingapps"];
const TIER_PREFIXES: [(&str, &str); 4] = [
    ("uat-", "UAT"),
    ("stg-", "STG"),
    ("dev-", "DEV"),
    ("prod-", "PROD"),
];

/// Raw hosting hints gathered from the runtime environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSignals {
    pub document_root: Option<String>,
    /// Edge microservice base URL advertised by the host.
    pub edge_env: Option<String>,
    /// Request arrived through the platform's edge worker.
    pub cf_worker: bool,
}

impl HostSignals {
    fn document_root(&self) -> &str {
        self.document_root.as_deref().unwrap_or("")
    }

    fn edge_env(&self) -> Option<&str> {
        self.edge_env
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

pub trait HostingEnvironmentProbe: Send + Sync {
    fn signals(&self) -> HostSignals;
}

/// Probe that always reports the same signals.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    signals: HostSignals,
}

impl StaticProbe {
    pub fn new(signals: HostSignals) -> Self {
        Self { signals }
    }
}

impl HostingEnvironmentProbe for StaticProbe {
    fn signals(&self) -> HostSignals {
        self.signals.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_id: String,
    pub app_token: AppToken,
}

impl Credentials {
    /// Both values must be present and non-blank.
    pub fn from_parts(app_id: Option<&str>, app_token: Option<&AppToken>) -> Option<Self> {
        let app_id = app_id.map(str::trim).filter(|id| !id.is_empty())?;
        let app_token = app_token.filter(|token| !token.is_blank())?;
        Some(Self {
            app_id: app_id.to_string(),
            app_token: app_token.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    pub log_diagnostics: bool,
    /// Require a recognised managed host in addition to credentials.
    pub require_managed_host: bool,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            log_diagnostics: false,
            require_managed_host: true,
        }
    }
}

impl From<&crate::config::EdgeSettings> for DetectorOptions {
    fn from(settings: &crate::config::EdgeSettings) -> Self {
        Self {
            log_diagnostics: settings.log_diagnostics,
            require_managed_host: settings.require_managed_host,
        }
    }
}

/// Snapshot of the detector's view, exposed to operators and the rule generator.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub enabled: bool,
    pub credentials_present: bool,
    pub managed_host: bool,
    pub platform: PlatformTag,
    pub endpoint_resolved: bool,
}

#[derive(Clone)]
pub struct EnvironmentDetector {
    probe: Arc<dyn HostingEnvironmentProbe>,
    credentials: Option<Credentials>,
    options: DetectorOptions,
}

impl EnvironmentDetector {
    pub fn new(
        probe: Arc<dyn HostingEnvironmentProbe>,
        credentials: Option<Credentials>,
        options: DetectorOptions,
    ) -> Self {
        Self {
            probe,
            credentials,
            options,
        }
    }

    pub fn from_settings(
        settings: &crate::config::EdgeSettings,
        probe: Arc<dyn HostingEnvironmentProbe>,
    ) -> Self {
        let credentials =
            Credentials::from_parts(settings.site_id.as_deref(), settings.site_token.as_ref());
        Self::new(probe, credentials, DetectorOptions::from(settings))
    }

    pub fn log_diagnostics(&self) -> bool {
        self.options.log_diagnostics
    }

    /// Credentials are configured and the host is one that exposes the edge service.
    pub fn is_integration_enabled(&self) -> bool {
        let signals = self.probe.signals();
        self.enabled_for(&signals)
    }

    pub fn classify_platform(&self) -> PlatformTag {
        let signals = self.probe.signals();
        self.platform_for(&signals)
    }

    pub fn is_managed_host(&self) -> bool {
        is_managed_host(&self.probe.signals())
    }

    /// Resolve the edge coordinates, or `None` when the integration is disabled.
    ///
    /// A returned config may still lack a base URL; the edge client reports
    /// that as an unresolved endpoint.
    pub fn resolve_endpoint(&self) -> Option<EdgeEndpointConfig> {
        let signals = self.probe.signals();
        if !self.enabled_for(&signals) {
            return None;
        }
        let credentials = self.credentials.as_ref()?;

        let platform_tag = self.platform_for(&signals);
        let base_url = match platform_tag {
            PlatformTag::FlexiblePlatform(_) | PlatformTag::AutoscalePlatform => {
                signals.edge_env().and_then(usable_edge_base)
            }
            PlatformTag::Unknown => None,
        };

        if self.options.log_diagnostics {
            info!(
                platform = platform_tag.wire_value(),
                base_url = base_url.as_deref().unwrap_or(""),
                "Edge microservice url resolved"
            );
        }

        Some(EdgeEndpointConfig {
            base_url,
            platform_tag,
            app_id: credentials.app_id.clone(),
            app_token: credentials.app_token.clone(),
        })
    }

    pub fn capability(&self) -> Capability {
        let signals = self.probe.signals();
        let enabled = self.enabled_for(&signals);
        let platform = self.platform_for(&signals);
        Capability {
            enabled,
            credentials_present: self.credentials.is_some(),
            managed_host: is_managed_host(&signals),
            platform,
            endpoint_resolved: enabled
                && !matches!(platform, PlatformTag::Unknown)
                && signals.edge_env().and_then(usable_edge_base).is_some(),
        }
    }

    fn enabled_for(&self, signals: &HostSignals) -> bool {
        if self.credentials.is_none() {
            if self.options.log_diagnostics {
                info!("Edge integration disabled: site id or site token not configured");
            }
            return false;
        }
        !self.options.require_managed_host || is_managed_host(signals)
    }

    fn platform_for(&self, signals: &HostSignals) -> PlatformTag {
        let root = signals.document_root();
        let platform = if root.contains(STAGING_ROOT_MARKER) {
            PlatformTag::FlexiblePlatform(FlexibleStage::Staging)
        } else if root.contains(PRODUCTION_ROOT_MARKER) {
            PlatformTag::FlexiblePlatform(FlexibleStage::Production)
        } else if signals.edge_env().is_some() {
            PlatformTag::AutoscalePlatform
        } else {
            PlatformTag::Unknown
        };

        if self.options.log_diagnostics {
            match platform {
                PlatformTag::FlexiblePlatform(stage) => {
                    info!(stage = ?stage, "Flexible platform detected");
                }
                PlatformTag::AutoscalePlatform => {
                    info!("Autoscale platform detected");
                    if signals.cf_worker
                        && let Some(tier) = signals.edge_env().and_then(autoscale_tier)
                    {
                        info!(tier, "Edge microservice tier detected");
                    }
                }
                PlatformTag::Unknown => {}
            }
        }

        platform
    }
}

fn is_managed_host(signals: &HostSignals) -> bool {
    let root = signals.document_root();
    MANAGED_ROOT_MARKERS
        .iter()
        .any(|marker| root.contains(marker))
        || signals.edge_env().is_some()
}

/// Edge base URL with a trailing slash, or `None` unless it is an absolute
/// http(s) URL with a host.
fn usable_edge_base(edge_env: &str) -> Option<String> {
    let parsed = Url::parse(edge_env).ok()?;
    let http = matches!(parsed.scheme(), "http" | "https");
    let has_host = parsed.host_str().is_some_and(|host| !host.is_empty());
    if !(http && has_host) {
        warn!(edge_env, "Edge microservice url is not an absolute http(s) url");
        return None;
    }
    Some(ensure_trailing_slash(edge_env))
}

/// Deployment tier encoded in the edge URL, if any.
pub fn autoscale_tier(edge_env: &str) -> Option<&'static str> {
    TIER_PREFIXES
        .iter()
        .find(|(prefix, _)| edge_env.contains(prefix))
        .map(|(_, tier)| *tier)
}
