use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "edgepurge_purge_total",
            Unit::Count,
            "Purge requests handled by the coordinator, labelled by outcome."
        );
        describe_counter!(
            "edgepurge_dedup_hit_total",
            Unit::Count,
            "Purges suppressed because the same target set was already sent."
        );
        describe_counter!(
            "edgepurge_edge_response_total",
            Unit::Count,
            "Edge microservice responses, labelled by status class."
        );
        describe_histogram!(
            "edgepurge_edge_request_ms",
            Unit::Milliseconds,
            "Edge microservice round-trip latency in milliseconds."
        );
        describe_gauge!(
            "edgepurge_queue_depth",
            Unit::Count,
            "Deferred purges waiting for the worker."
        );
        describe_counter!(
            "edgepurge_job_total",
            Unit::Count,
            "Deferred purge jobs, labelled by result."
        );
    });
}
