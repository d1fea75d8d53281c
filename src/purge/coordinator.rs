//! Purge coordinator.
//!
//! Runs one purge through the pipeline: capability gate, topology resolution,
//! normalization, dedup, dispatch. Every failure comes back as a
//! [`PurgeStatus`] value.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::entities::{PurgeOutcome, PurgeRequest};
use crate::domain::types::{ErrorKind, PurgeMode};

use super::dedup::{FingerprintStore, PurgeFingerprint};
use super::dispatch::{DispatchResult, Dispatcher};
use super::environment::EnvironmentDetector;
use super::queue::JobId;
use super::topology::{PurgeScope, SiteRegistry, resolve};
use super::trigger::PurgeTrigger;

const METRIC_PURGE_TOTAL: &str = "edgepurge_purge_total";
const METRIC_DEDUP_HIT_TOTAL: &str = "edgepurge_dedup_hit_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No valid URL survived normalization.
    InvalidInput,
    /// The same target set was already purged.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PurgeStatus {
    Disabled,
    Skipped(SkipReason),
    Scheduled(JobId),
    Completed(PurgeOutcome),
}

impl PurgeStatus {
    fn metric_label(&self) -> &'static str {
        match self {
            PurgeStatus::Disabled => "disabled",
            PurgeStatus::Skipped(SkipReason::InvalidInput) => "invalid_input",
            PurgeStatus::Skipped(SkipReason::Duplicate) => "duplicate",
            PurgeStatus::Scheduled(_) => "scheduled",
            PurgeStatus::Completed(outcome) => match outcome.error_kind {
                None => "completed",
                Some(kind) => kind.as_str(),
            },
        }
    }
}

#[derive(Clone)]
pub struct PurgeCoordinator {
    detector: EnvironmentDetector,
    registry: Arc<dyn SiteRegistry>,
    dedup: Arc<dyn FingerprintStore>,
    dispatcher: Dispatcher,
}

impl PurgeCoordinator {
    pub fn new(
        detector: EnvironmentDetector,
        registry: Arc<dyn SiteRegistry>,
        dedup: Arc<dyn FingerprintStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            detector,
            registry,
            dedup,
            dispatcher,
        }
    }

    pub fn detector(&self) -> &EnvironmentDetector {
        &self.detector
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[instrument(skip(self), fields(kind = trigger.label()))]
    pub async fn handle(&self, trigger: PurgeTrigger) -> PurgeStatus {
        self.run(trigger.scope(), trigger.mode()).await
    }

    /// Purge an explicit list of page URLs.
    #[instrument(skip(self, urls), fields(url_count = urls.len()))]
    pub async fn purge_urls(&self, urls: Vec<String>, mode: PurgeMode) -> PurgeStatus {
        self.run(PurgeScope::Urls(urls), mode).await
    }

    /// Purge every site of the network.
    #[instrument(skip(self))]
    pub async fn purge_site(&self, mode: PurgeMode) -> PurgeStatus {
        self.run(PurgeScope::WholeSite, mode).await
    }

    async fn run(&self, scope: PurgeScope, mode: PurgeMode) -> PurgeStatus {
        let status = self.execute(scope, mode).await;
        counter!(METRIC_PURGE_TOTAL, "outcome" => status.metric_label()).increment(1);
        status
    }

    async fn execute(&self, scope: PurgeScope, mode: PurgeMode) -> PurgeStatus {
        if !self.detector.is_integration_enabled() {
            debug!("Edge integration disabled; purge skipped");
            return PurgeStatus::Disabled;
        }

        let topology = self.registry.topology();
        let Some(targets) = resolve(&scope, &topology) else {
            info!("No valid purge targets after normalization");
            return PurgeStatus::Skipped(SkipReason::InvalidInput);
        };

        let fingerprint = PurgeFingerprint::compute(targets.endpoint_kind, &targets.urls);
        if self.dedup.has_been_processed(&fingerprint) {
            counter!(METRIC_DEDUP_HIT_TOTAL).increment(1);
            debug!(fingerprint = %fingerprint, "Purge already processed; skipping");
            return PurgeStatus::Skipped(SkipReason::Duplicate);
        }

        if self.detector.log_diagnostics() {
            info!(
                endpoint = targets.endpoint_kind.endpoint_path(),
                urls = ?targets.urls,
                "Resolved purge targets"
            );
        }

        let request = match PurgeRequest::new(targets.urls, targets.endpoint_kind, mode) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "Resolved purge request rejected");
                return PurgeStatus::Skipped(SkipReason::InvalidInput);
            }
        };

        self.dedup.mark_processed(fingerprint.clone());

        match self.dispatcher.dispatch(request, Some(fingerprint.clone())).await {
            DispatchResult::Scheduled(job_id) => {
                info!(job_id = %job_id, "Purge scheduled");
                PurgeStatus::Scheduled(job_id)
            }
            DispatchResult::Completed(outcome) => {
                if outcome.is_retryable_failure() {
                    self.dedup.forget(&fingerprint);
                }
                log_outcome(&outcome);
                PurgeStatus::Completed(outcome)
            }
        }
    }
}

fn log_outcome(outcome: &PurgeOutcome) {
    match (outcome.status_code, outcome.error_kind) {
        (Some(status), _) if outcome.is_success() => info!(status, "Purge completed"),
        (Some(status), _) => warn!(status, "Edge service rejected purge"),
        (None, Some(ErrorKind::EndpointUnresolved)) => {
            warn!("Purge failed: edge endpoint could not be resolved")
        }
        (None, kind) => warn!(
            error_kind = kind.map(ErrorKind::as_str),
            detail = outcome.detail.as_deref(),
            "Purge failed"
        ),
    }
}
