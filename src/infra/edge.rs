//! Reqwest-backed client for the edge purge microservice.

use std::error::Error as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, REFERER};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::entities::PurgeOutcome;
use crate::domain::types::{EndpointKind, ErrorKind, PurgePhase};
use crate::purge::dispatch::EdgePurger;
use crate::purge::environment::EnvironmentDetector;

pub const EDGE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const EDGE_MAX_REDIRECTS: usize = 2;
const USER_AGENT: &str = concat!("edgepurge/", env!("CARGO_PKG_VERSION"));
const JSON: &str = "application/json";

const METRIC_EDGE_REQUEST_MS: &str = "edgepurge_edge_request_ms";
const METRIC_EDGE_RESPONSE_TOTAL: &str = "edgepurge_edge_response_total";

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("failed to build edge http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Transport policy for the edge client.
#[derive(Debug, Clone)]
pub struct EdgeClientOptions {
    pub verify_tls: bool,
    /// Debug hosts skip certificate verification.
    pub debug_mode: bool,
    /// Sent as `Referer`; usually the primary home URL.
    pub referer: Option<String>,
    pub timeout: Duration,
}

impl Default for EdgeClientOptions {
    fn default() -> Self {
        Self {
            verify_tls: true,
            debug_mode: false,
            referer: None,
            timeout: EDGE_REQUEST_TIMEOUT,
        }
    }
}

impl EdgeClientOptions {
    pub fn from_settings(edge: &crate::config::EdgeSettings, referer: Option<String>) -> Self {
        Self {
            verify_tls: edge.verify_tls,
            debug_mode: edge.debug_mode,
            referer,
            timeout: EDGE_REQUEST_TIMEOUT,
        }
    }

    pub fn effective_tls_verification(&self) -> bool {
        self.verify_tls && !self.debug_mode
    }
}

pub struct EdgeClient {
    http: reqwest::Client,
    detector: EnvironmentDetector,
    referer: Option<String>,
}

impl EdgeClient {
    pub fn new(detector: EnvironmentDetector, options: EdgeClientOptions) -> Result<Self, EdgeError> {
        let verify_tls = options.effective_tls_verification();
        if !verify_tls {
            warn!(
                debug_mode = options.debug_mode,
                verify_tls_setting = options.verify_tls,
                "TLS certificate verification disabled for edge purge requests"
            );
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(EDGE_MAX_REDIRECTS))
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;

        Ok(Self {
            http,
            detector,
            referer: options.referer,
        })
    }
}

#[async_trait]
impl EdgePurger for EdgeClient {
    #[instrument(skip(self, urls), fields(endpoint = endpoint_kind.endpoint_path(), url_count = urls.len()))]
    async fn send_purge(&self, urls: &[String], endpoint_kind: EndpointKind) -> PurgeOutcome {
        let mut phase = PhaseTracker::default();
        let diagnostics = self.detector.log_diagnostics();

        let Some(endpoint) = self.detector.resolve_endpoint() else {
            phase.enter(PurgePhase::Unresolved);
            return PurgeOutcome::failed(
                ErrorKind::Disabled,
                phase.current(),
                "edge integration is disabled",
            );
        };

        let Some(target) = endpoint.endpoint_url(endpoint_kind) else {
            phase.enter(PurgePhase::Unresolved);
            warn!("Edge microservice url is not defined");
            return PurgeOutcome::unresolved();
        };
        phase.enter(PurgePhase::Resolved);

        let platform = endpoint.platform_tag.wire_value();
        let payload = purge_body(urls, &endpoint.app_id, endpoint.app_token.expose(), platform);

        if diagnostics {
            info!(
                target_url = %target,
                urls = ?urls,
                platform,
                "Sending purge to edge microservice"
            );
        }

        let mut request = self
            .http
            .post(&target)
            .header(ACCEPT, JSON)
            .header(CONTENT_TYPE, JSON)
            .header(CONTENT_LENGTH, payload.len());
        if let Some(referer) = self.referer.as_deref() {
            request = request.header(REFERER, referer);
        }

        phase.enter(PurgePhase::Dispatched);
        let started_at = Instant::now();
        let result = request.body(payload).send().await;
        histogram!(METRIC_EDGE_REQUEST_MS, "endpoint" => endpoint_kind.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let raw_body = match response.text().await {
                    Ok(text) if !text.is_empty() => Some(text),
                    Ok(_) => None,
                    Err(err) => {
                        debug!(error = %err, "Edge response body could not be read");
                        None
                    }
                };
                phase.enter(PurgePhase::Completed);
                counter!(METRIC_EDGE_RESPONSE_TOTAL, "class" => status_class(status)).increment(1);

                if diagnostics {
                    info!(
                        status,
                        body = raw_body.as_deref().unwrap_or(""),
                        "Edge microservice response"
                    );
                }
                if !(200..300).contains(&status) {
                    warn!(status, "Edge microservice rejected purge");
                }

                PurgeOutcome::completed(status, raw_body)
            }
            Err(err) => {
                phase.enter(PurgePhase::Failed);
                counter!(METRIC_EDGE_RESPONSE_TOTAL, "class" => "transport_error").increment(1);
                let detail = describe_transport_error(&err);
                warn!(error = %err, cause = detail.as_str(), "Edge purge request failed");
                PurgeOutcome::transport_failure(detail)
            }
        }
    }
}

/// Wire body for every purge endpoint. Rendering a `Value` cannot fail.
fn purge_body(urls: &[String], app_id: &str, app_token: &str, platform: &str) -> String {
    json!({
        "urls": urls,
        "appToken": app_token,
        "appId": app_id,
        "platform": platform,
    })
    .to_string()
}

/// Walks the purge lifecycle, logging any transition that breaks the ordering.
#[derive(Debug)]
struct PhaseTracker {
    current: PurgePhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: PurgePhase::Requested,
        }
    }
}

impl PhaseTracker {
    fn enter(&mut self, next: PurgePhase) {
        match self.current.advance(next) {
            Ok(phase) => {
                debug!(from = ?self.current, to = ?phase, "Purge phase transition");
                self.current = phase;
            }
            Err(err) => warn!(error = %err, "Purge phase transition rejected"),
        }
    }

    fn current(&self) -> PurgePhase {
        self.current
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_redirect() {
        "redirect"
    } else {
        "request"
    };

    let mut detail = format!("{kind}: {err}");
    let mut source = err.source();
    while let Some(inner) = source {
        detail.push_str(": ");
        detail.push_str(&inner.to_string());
        source = inner.source();
    }
    detail
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::MockServer;
    use serde_json::json;

    use super::*;
    use crate::domain::entities::AppToken;
    use crate::purge::environment::{Credentials, DetectorOptions, HostSignals, StaticProbe};

    fn detector(edge_env: Option<String>, with_credentials: bool) -> EnvironmentDetector {
        EnvironmentDetector::new(
            Arc::new(StaticProbe::new(HostSignals {
                document_root: Some("/srv/site".to_string()),
                edge_env,
                cf_worker: false,
            })),
            with_credentials.then(|| Credentials {
                app_id: "site-7".to_string(),
                app_token: AppToken::new("tok"),
            }),
            DetectorOptions::default(),
        )
    }

    fn client(detector: EnvironmentDetector) -> EdgeClient {
        EdgeClient::new(
            detector,
            EdgeClientOptions {
                referer: Some("https://example.com/".to_string()),
                timeout: Duration::from_millis(500),
                ..Default::default()
            },
        )
        .expect("client")
    }

    #[tokio::test]
    async fn posts_json_body_to_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/purge-fpc-url")
                    .header("accept", "application/json")
                    .header("content-type", "application/json")
                    .header("referer", "https://example.com/")
                    .json_body(json!({
                        "urls": ["https://example.com/page/"],
                        "appToken": "tok",
                        "appId": "site-7",
                        "platform": "fmp"
                    }));
                then.status(200).body(r#"{"ok":true}"#);
            })
            .await;

        let client = client(detector(Some(server.base_url()), true));
        let outcome = client
            .send_purge(
                &["https://example.com/page/".to_string()],
                EndpointKind::UrlPurge,
            )
            .await;

        mock.assert_async().await;
        assert_eq!(outcome.status_code, Some(200));
        assert_eq!(outcome.raw_body.as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(outcome.phase, PurgePhase::Completed);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn non_success_status_is_returned_as_value() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST").path("/purge-fpc-domain");
                then.status(500);
            })
            .await;

        let client = client(detector(Some(server.base_url()), true));
        let outcome = client
            .send_purge(&["example.com".to_string()], EndpointKind::DomainPurge)
            .await;

        mock.assert_async().await;
        assert_eq!(outcome.status_code, Some(500));
        assert!(outcome.error_kind.is_none());
        assert!(outcome.raw_body.is_none());
    }

    #[tokio::test]
    async fn missing_base_url_is_unresolved_without_network() {
        let detector = EnvironmentDetector::new(
            Arc::new(StaticProbe::default()),
            Some(Credentials {
                app_id: "1".to_string(),
                app_token: AppToken::new("t"),
            }),
            DetectorOptions {
                log_diagnostics: true,
                require_managed_host: false,
            },
        );
        let outcome = client(detector)
            .send_purge(&["https://a.com/".to_string()], EndpointKind::UrlPurge)
            .await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::EndpointUnresolved));
        assert_eq!(outcome.phase, PurgePhase::Unresolved);
    }

    #[test]
    fn purge_body_uses_wire_field_names() {
        let body: serde_json::Value = serde_json::from_str(&purge_body(
            &["example.com".to_string()],
            "site-7",
            "tok",
            "fmp",
        ))
        .expect("json body");
        assert_eq!(
            body,
            json!({
                "urls": ["example.com"],
                "appToken": "tok",
                "appId": "site-7",
                "platform": "fmp"
            })
        );
    }

    #[test]
    fn phase_tracker_only_fails_after_dispatch() {
        let mut phase = PhaseTracker::default();
        phase.enter(PurgePhase::Resolved);
        phase.enter(PurgePhase::Failed);
        assert_eq!(phase.current(), PurgePhase::Resolved);

        phase.enter(PurgePhase::Dispatched);
        phase.enter(PurgePhase::Failed);
        assert_eq!(phase.current(), PurgePhase::Failed);
    }

    #[tokio::test]
    async fn edge_env_without_scheme_is_unresolved() {
        for edge_env in ["edge.internal", "ftp://edge.internal", "https:edge.internal"] {
            let outcome = client(detector(Some(edge_env.to_string()), true))
                .send_purge(&["https://a.com/".to_string()], EndpointKind::UrlPurge)
                .await;
            assert_eq!(
                outcome.error_kind,
                Some(ErrorKind::EndpointUnresolved),
                "edge env {edge_env}"
            );
            assert_eq!(outcome.phase, PurgePhase::Unresolved);
        }
    }

    #[tokio::test]
    async fn disabled_integration_reports_disabled() {
        let outcome = client(detector(Some("https://edge.example".to_string()), false))
            .send_purge(&["https://a.com/".to_string()], EndpointKind::UrlPurge)
            .await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::Disabled));
    }

    #[tokio::test]
    async fn slow_edge_times_out_as_transport_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/purge-fpc-url");
                then.status(200).delay(Duration::from_secs(3));
            })
            .await;

        let outcome = client(detector(Some(server.base_url()), true))
            .send_purge(&["https://a.com/".to_string()], EndpointKind::UrlPurge)
            .await;

        assert_eq!(outcome.error_kind, Some(ErrorKind::TransportFailure));
        assert_eq!(outcome.phase, PurgePhase::Failed);
        assert!(outcome.status_code.is_none());
        assert!(outcome.detail.as_deref().is_some_and(|d| d.starts_with("timeout")));
    }

    #[test]
    fn debug_mode_disables_tls_verification() {
        let options = EdgeClientOptions {
            debug_mode: true,
            ..Default::default()
        };
        assert!(!options.effective_tls_verification());
        assert!(EdgeClientOptions::default().effective_tls_verification());
        let explicit_off = EdgeClientOptions {
            verify_tls: false,
            ..Default::default()
        };
        assert!(!explicit_off.effective_tls_verification());
    }
}
