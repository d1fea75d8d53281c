//! Records passed between the purge pipeline stages.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::types::{EndpointKind, ErrorKind, PlatformTag, PurgeMode, PurgePhase};

/// A purge ready for dispatch. `urls` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRequest {
    urls: Vec<String>,
    pub endpoint_kind: EndpointKind,
    pub mode: PurgeMode,
}

impl PurgeRequest {
    pub fn new(
        urls: Vec<String>,
        endpoint_kind: EndpointKind,
        mode: PurgeMode,
    ) -> Result<Self, DomainError> {
        if urls.is_empty() {
            return Err(DomainError::validation(
                "purge request requires at least one url",
            ));
        }
        Ok(Self {
            urls,
            endpoint_kind,
            mode,
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSite {
    pub id: u64,
    pub home_url: String,
}

/// Shape of the site network at the time of a purge call.
///
/// The first member is the primary site; a single-site install has exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteTopology {
    pub is_multisite: bool,
    pub is_subdomain_install: bool,
    pub member_sites: Vec<MemberSite>,
}

impl SiteTopology {
    pub fn single(home_url: impl Into<String>) -> Self {
        Self {
            is_multisite: false,
            is_subdomain_install: false,
            member_sites: vec![MemberSite {
                id: 1,
                home_url: home_url.into(),
            }],
        }
    }

    pub fn primary_home_url(&self) -> Option<&str> {
        self.member_sites.first().map(|site| site.home_url.as_str())
    }
}

/// Credential that must never appear in logs.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AppToken(String);

impl AppToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AppToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppToken(***)")
    }
}

/// Edge service coordinates resolved for a single purge attempt.
#[derive(Debug, Clone)]
pub struct EdgeEndpointConfig {
    /// Always ends with `/` when present.
    pub base_url: Option<String>,
    pub platform_tag: PlatformTag,
    pub app_id: String,
    pub app_token: AppToken,
}

impl EdgeEndpointConfig {
    pub fn endpoint_url(&self, kind: EndpointKind) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{base}{}", kind.endpoint_path()))
    }
}

/// Result of one dispatched purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
    pub phase: PurgePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PurgeOutcome {
    pub fn completed(status_code: u16, raw_body: Option<String>) -> Self {
        Self {
            status_code: Some(status_code),
            error_kind: None,
            raw_body,
            phase: PurgePhase::Completed,
            detail: None,
        }
    }

    pub fn failed(error_kind: ErrorKind, phase: PurgePhase, detail: impl Into<String>) -> Self {
        Self {
            status_code: None,
            error_kind: Some(error_kind),
            raw_body: None,
            phase,
            detail: Some(detail.into()),
        }
    }

    pub fn unresolved() -> Self {
        Self::failed(
            ErrorKind::EndpointUnresolved,
            PurgePhase::Unresolved,
            "edge base url could not be resolved",
        )
    }

    pub fn transport_failure(detail: impl Into<String>) -> Self {
        Self::failed(ErrorKind::TransportFailure, PurgePhase::Failed, detail)
    }

    /// True for a completed call with a 2xx status.
    pub fn is_success(&self) -> bool {
        matches!(self.status_code, Some(code) if (200..300).contains(&code))
    }

    /// Failures that should release the dedup fingerprint so callers can retry.
    pub fn is_retryable_failure(&self) -> bool {
        matches!(
            self.error_kind,
            Some(
                ErrorKind::TransportFailure
                    | ErrorKind::EndpointUnresolved
                    | ErrorKind::SchedulerUnavailable
            )
        )
    }
}
