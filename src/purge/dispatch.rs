//! Dispatch policy: run a purge inline or hand it to the deferred queue.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::entities::{PurgeOutcome, PurgeRequest};
use crate::domain::types::{EndpointKind, ErrorKind, PurgeMode, PurgePhase};

use super::dedup::PurgeFingerprint;
use super::queue::{JobId, PurgeQueue};

/// Transport seam towards the edge microservice.
#[async_trait]
pub trait EdgePurger: Send + Sync {
    /// Send one purge. Never fails: every failure is reported in the outcome.
    async fn send_purge(&self, urls: &[String], endpoint_kind: EndpointKind) -> PurgeOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Scheduled(JobId),
    Completed(PurgeOutcome),
}

#[derive(Clone)]
pub struct Dispatcher {
    purger: Arc<dyn EdgePurger>,
    queue: Option<PurgeQueue>,
}

impl Dispatcher {
    pub fn new(purger: Arc<dyn EdgePurger>, queue: Option<PurgeQueue>) -> Self {
        Self { purger, queue }
    }

    pub fn queue(&self) -> Option<&PurgeQueue> {
        self.queue.as_ref()
    }

    pub async fn dispatch(
        &self,
        request: PurgeRequest,
        fingerprint: Option<PurgeFingerprint>,
    ) -> DispatchResult {
        match request.mode {
            PurgeMode::Immediate => DispatchResult::Completed(
                self.purger
                    .send_purge(request.urls(), request.endpoint_kind)
                    .await,
            ),
            PurgeMode::Deferred => self.schedule(request, fingerprint),
        }
    }

    fn schedule(
        &self,
        request: PurgeRequest,
        fingerprint: Option<PurgeFingerprint>,
    ) -> DispatchResult {
        let Some(queue) = &self.queue else {
            warn!("Deferred purge requested but no queue worker is running");
            return DispatchResult::Completed(scheduler_unavailable("no purge queue configured"));
        };

        match queue.submit(request, fingerprint) {
            Ok(job_id) => DispatchResult::Scheduled(job_id),
            Err(err) => {
                warn!(error = %err, "Deferred purge could not be scheduled");
                DispatchResult::Completed(scheduler_unavailable(err.to_string()))
            }
        }
    }
}

fn scheduler_unavailable(detail: impl Into<String>) -> PurgeOutcome {
    PurgeOutcome::failed(ErrorKind::SchedulerUnavailable, PurgePhase::Requested, detail)
}
