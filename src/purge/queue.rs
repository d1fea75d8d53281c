//! Deferred purge execution.
//!
//! A bounded in-process work queue drained by a single worker task. Transport
//! failures are retried up to the configured attempt budget; every job's
//! progress is recorded in the [`JobRegistry`] so callers can observe
//! completion.

use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::entities::{PurgeOutcome, PurgeRequest};
use crate::domain::types::{EndpointKind, ErrorKind, JobState};

use super::dedup::{FingerprintStore, PurgeFingerprint};
use super::dispatch::EdgePurger;

const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_REGISTRY_LIMIT: usize = 1024;

const METRIC_QUEUE_DEPTH: &str = "edgepurge_queue_depth";
const METRIC_JOB_TOTAL: &str = "edgepurge_job_total";

pub type JobId = Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("purge queue is full")]
    Full,
    #[error("purge queue worker is not running")]
    Closed,
    #[error("job `{0}` not found")]
    UnknownJob(JobId),
    #[error("job `{id}` did not finish within {timeout:?}")]
    Timeout { id: JobId, timeout: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    pub capacity: NonZeroUsize,
    pub max_attempts: NonZeroU32,
    pub retry_backoff: Duration,
    /// Finished job records kept for inspection.
    pub registry_limit: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(DEFAULT_QUEUE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            max_attempts: NonZeroU32::new(DEFAULT_MAX_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            registry_limit: DEFAULT_REGISTRY_LIMIT,
        }
    }
}

impl From<&crate::config::DispatchSettings> for QueueOptions {
    fn from(settings: &crate::config::DispatchSettings) -> Self {
        Self {
            capacity: settings.queue_capacity,
            max_attempts: settings.max_attempts,
            retry_backoff: settings.retry_backoff,
            registry_limit: DEFAULT_REGISTRY_LIMIT,
        }
    }
}

#[derive(Debug)]
struct PurgeJob {
    id: JobId,
    request: PurgeRequest,
    fingerprint: Option<PurgeFingerprint>,
}

/// Inspectable snapshot of a deferred purge.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub endpoint_kind: EndpointKind,
    pub url_count: usize,
    pub state: JobState,
    pub attempts: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PurgeOutcome>,
}

pub struct JobRegistry {
    jobs: DashMap<JobId, JobRecord>,
    /// Bumped every time a job reaches a final state.
    finished: watch::Sender<u64>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self {
            jobs: DashMap::new(),
            finished: watch::channel(0).0,
        }
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.finished.subscribe()
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn insert(&self, record: JobRecord) {
        self.jobs.insert(record.id, record);
    }

    fn remove(&self, id: &JobId) {
        self.jobs.remove(id);
    }

    fn mark_running(&self, id: &JobId, attempt: u32) {
        if let Some(mut record) = self.jobs.get_mut(id) {
            record.state = JobState::Running { attempt };
            record.attempts = attempt;
        }
    }

    fn finish(&self, id: &JobId, outcome: PurgeOutcome) {
        if let Some(mut record) = self.jobs.get_mut(id) {
            record.state = match (outcome.status_code, outcome.error_kind) {
                (Some(status_code), _) if outcome.is_success() => {
                    JobState::Succeeded { status_code }
                }
                (Some(status_code), _) => JobState::Rejected { status_code },
                (None, Some(error_kind)) => JobState::Failed { error_kind },
                (None, None) => JobState::Failed {
                    error_kind: ErrorKind::TransportFailure,
                },
            };
            record.finished_at = Some(OffsetDateTime::now_utc());
            record.outcome = Some(outcome);
        }
        self.finished.send_modify(|count| *count += 1);
    }

    /// Drop the oldest finished records once the registry exceeds `limit`.
    fn prune(&self, limit: usize) {
        let excess = self.jobs.len().saturating_sub(limit);
        if excess == 0 {
            return;
        }

        let mut finished: Vec<(JobId, OffsetDateTime)> = self
            .jobs
            .iter()
            .filter_map(|entry| entry.finished_at.map(|at| (entry.id, at)))
            .collect();
        finished.sort_by_key(|(_, at)| *at);
        for (id, _) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
    }
}

/// Submission handle for deferred purges.
#[derive(Clone)]
pub struct PurgeQueue {
    sender: mpsc::Sender<PurgeJob>,
    registry: Arc<JobRegistry>,
}

impl PurgeQueue {
    /// Spawn the worker task and return the submission handle with it.
    pub fn start(
        purger: Arc<dyn EdgePurger>,
        dedup: Option<Arc<dyn FingerprintStore>>,
        options: QueueOptions,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(options.capacity.get());
        let registry = Arc::new(JobRegistry::new());
        let worker = QueueWorker {
            receiver,
            purger,
            dedup,
            registry: registry.clone(),
            options,
        };
        let handle = tokio::spawn(worker.run());
        (Self { sender, registry }, handle)
    }

    /// Enqueue a purge without waiting for it to run.
    pub fn submit(
        &self,
        request: PurgeRequest,
        fingerprint: Option<PurgeFingerprint>,
    ) -> Result<JobId, QueueError> {
        let id = Uuid::new_v4();
        self.registry.insert(JobRecord {
            id,
            endpoint_kind: request.endpoint_kind,
            url_count: request.urls().len(),
            state: JobState::Queued,
            attempts: 0,
            enqueued_at: OffsetDateTime::now_utc(),
            finished_at: None,
            outcome: None,
        });

        let job = PurgeJob {
            id,
            request,
            fingerprint,
        };
        if let Err(err) = self.sender.try_send(job) {
            self.registry.remove(&id);
            counter!(METRIC_JOB_TOTAL, "result" => "rejected").increment(1);
            return Err(match err {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            });
        }

        gauge!(METRIC_QUEUE_DEPTH).set(self.depth() as f64);
        info!(job_id = %id, "Purge job enqueued");
        Ok(id)
    }

    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn job(&self, id: &JobId) -> Option<JobRecord> {
        self.registry.get(id)
    }

    /// Wait until the job finishes or `timeout` elapses.
    pub async fn wait_for(&self, id: JobId, timeout: Duration) -> Result<JobRecord, QueueError> {
        let deadline = Instant::now() + timeout;
        // Subscribe before reading so a completion between the two is not missed.
        let mut finished = self.registry.subscribe();
        loop {
            let record = self.registry.get(&id).ok_or(QueueError::UnknownJob(id))?;
            if record.state.is_finished() {
                return Ok(record);
            }
            match timeout_at(deadline, finished.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(QueueError::Closed),
                Err(_) => return Err(QueueError::Timeout { id, timeout }),
            }
        }
    }
}

struct QueueWorker {
    receiver: mpsc::Receiver<PurgeJob>,
    purger: Arc<dyn EdgePurger>,
    dedup: Option<Arc<dyn FingerprintStore>>,
    registry: Arc<JobRegistry>,
    options: QueueOptions,
}

impl QueueWorker {
    async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            gauge!(METRIC_QUEUE_DEPTH).set(self.receiver.len() as f64);
            self.process(job).await;
        }
        debug!("Purge queue closed; worker exiting");
    }

    async fn process(&self, job: PurgeJob) {
        let max_attempts = self.options.max_attempts.get();
        let mut attempt = 0;

        let outcome = loop {
            attempt += 1;
            self.registry.mark_running(&job.id, attempt);

            let outcome = self
                .purger
                .send_purge(job.request.urls(), job.request.endpoint_kind)
                .await;

            let transport_failed = outcome.error_kind == Some(ErrorKind::TransportFailure);
            if !transport_failed || attempt >= max_attempts {
                break outcome;
            }

            warn!(
                job_id = %job.id,
                attempt,
                max_attempts,
                "Deferred purge failed; retrying"
            );
            sleep(self.options.retry_backoff * attempt).await;
        };

        if outcome.is_retryable_failure()
            && let (Some(dedup), Some(fingerprint)) = (&self.dedup, &job.fingerprint)
        {
            dedup.forget(fingerprint);
        }

        let result = match outcome.status_code {
            Some(_) if outcome.is_success() => "succeeded",
            Some(_) => "non_2xx",
            None => "failed",
        };
        counter!(METRIC_JOB_TOTAL, "result" => result).increment(1);
        info!(
            job_id = %job.id,
            attempts = attempt,
            status = outcome.status_code,
            error_kind = outcome.error_kind.map(ErrorKind::as_str),
            "Deferred purge finished"
        );

        self.registry.finish(&job.id, outcome);
        self.registry.prune(self.options.registry_limit);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::types::PurgeMode;
    use crate::purge::dedup::{EvictionPolicy, InMemoryFingerprintStore};

    /// Fails with a transport error until `failures` attempts have been made.
    struct FlakyPurger {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl EdgePurger for FlakyPurger {
        async fn send_purge(&self, _urls: &[String], _kind: EndpointKind) -> PurgeOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                PurgeOutcome::transport_failure("connect: refused")
            } else {
                PurgeOutcome::completed(200, None)
            }
        }
    }

    /// Answers every purge with the same status after `delay`.
    struct FixedPurger {
        status: u16,
        delay: Duration,
    }

    #[async_trait]
    impl EdgePurger for FixedPurger {
        async fn send_purge(&self, _urls: &[String], _kind: EndpointKind) -> PurgeOutcome {
            sleep(self.delay).await;
            PurgeOutcome::completed(self.status, None)
        }
    }

    fn request() -> PurgeRequest {
        PurgeRequest::new(
            vec!["https://example.com/".to_string()],
            EndpointKind::UrlPurge,
            PurgeMode::Deferred,
        )
        .expect("request")
    }

    fn options(max_attempts: u32) -> QueueOptions {
        QueueOptions {
            max_attempts: NonZeroU32::new(max_attempts).expect("non-zero"),
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deferred_job_completes_and_is_observable() {
        let purger = Arc::new(FlakyPurger {
            calls: AtomicUsize::new(0),
            failures: 0,
        });
        let (queue, _worker) = PurgeQueue::start(purger.clone(), None, options(3));

        let id = queue.submit(request(), None).expect("submit");
        let record = queue
            .wait_for(id, Duration::from_secs(2))
            .await
            .expect("finished");

        assert_eq!(record.state, JobState::Succeeded { status_code: 200 });
        assert_eq!(record.attempts, 1);
        assert!(record.finished_at.is_some());
        assert_eq!(purger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failures_are_retried_within_budget() {
        let purger = Arc::new(FlakyPurger {
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let (queue, _worker) = PurgeQueue::start(purger.clone(), None, options(3));

        let id = queue.submit(request(), None).expect("submit");
        let record = queue
            .wait_for(id, Duration::from_secs(2))
            .await
            .expect("finished");

        assert_eq!(record.state, JobState::Succeeded { status_code: 200 });
        assert_eq!(record.attempts, 3);
        assert_eq!(purger.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_release_fingerprint() {
        let purger = Arc::new(FlakyPurger {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
        });
        let store = Arc::new(InMemoryFingerprintStore::new(EvictionPolicy::None));
        let fingerprint =
            PurgeFingerprint::compute(EndpointKind::UrlPurge, request().urls());
        store.mark_processed(fingerprint.clone());

        let (queue, _worker) = PurgeQueue::start(purger.clone(), Some(store.clone()), options(2));
        let id = queue
            .submit(request(), Some(fingerprint.clone()))
            .expect("submit");
        let record = queue
            .wait_for(id, Duration::from_secs(2))
            .await
            .expect("finished");

        assert_eq!(
            record.state,
            JobState::Failed {
                error_kind: ErrorKind::TransportFailure
            }
        );
        assert_eq!(purger.calls.load(Ordering::SeqCst), 2);
        assert!(!store.has_been_processed(&fingerprint));
    }

    #[tokio::test]
    async fn non_success_response_is_recorded_as_rejected() {
        let purger = Arc::new(FixedPurger {
            status: 500,
            delay: Duration::ZERO,
        });
        let (queue, _worker) = PurgeQueue::start(purger, None, options(3));

        let id = queue.submit(request(), None).expect("submit");
        let record = queue
            .wait_for(id, Duration::from_secs(2))
            .await
            .expect("finished");

        assert_eq!(record.state, JobState::Rejected { status_code: 500 });
        assert_eq!(record.state.as_str(), "rejected");
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn wait_for_wakes_on_completion_and_times_out_otherwise() {
        let purger = Arc::new(FixedPurger {
            status: 200,
            delay: Duration::from_millis(300),
        });
        let (queue, _worker) = PurgeQueue::start(purger, None, options(1));

        let id = queue.submit(request(), None).expect("submit");
        let err = queue
            .wait_for(id, Duration::from_millis(20))
            .await
            .expect_err("still running");
        assert!(matches!(err, QueueError::Timeout { .. }));

        let record = queue
            .wait_for(id, Duration::from_secs(2))
            .await
            .expect("finished");
        assert_eq!(record.state, JobState::Succeeded { status_code: 200 });
    }

    #[tokio::test]
    async fn closed_worker_rejects_submissions() {
        let purger = Arc::new(FlakyPurger {
            calls: AtomicUsize::new(0),
            failures: 0,
        });
        let (queue, worker) = PurgeQueue::start(purger, None, options(1));
        worker.abort();
        let _ = worker.await;

        let err = queue.submit(request(), None).expect_err("closed");
        assert!(matches!(err, QueueError::Closed));
        assert!(queue.registry().is_empty());
    }

    #[tokio::test]
    async fn waiting_for_unknown_job_fails() {
        let purger = Arc::new(FlakyPurger {
            calls: AtomicUsize::new(0),
            failures: 0,
        });
        let (queue, _worker) = PurgeQueue::start(purger, None, options(1));
        let err = queue
            .wait_for(Uuid::new_v4(), Duration::from_millis(10))
            .await
            .expect_err("unknown");
        assert!(matches!(err, QueueError::UnknownJob(_)));
    }

    #[test]
    fn prune_drops_oldest_finished_records() {
        let registry = JobRegistry::new();
        let base = OffsetDateTime::now_utc();
        for offset in 0..3 {
            let id = Uuid::new_v4();
            registry.insert(JobRecord {
                id,
                endpoint_kind: EndpointKind::UrlPurge,
                url_count: 1,
                state: JobState::Succeeded { status_code: 200 },
                attempts: 1,
                enqueued_at: base,
                finished_at: Some(base + time::Duration::seconds(offset)),
                outcome: None,
            });
        }
        registry.prune(2);
        assert_eq!(registry.len(), 2);
    }
}
