use std::{process, sync::Arc, time::Duration};

use edgepurge::{
    application::error::AppError,
    config::{self, PurgeArgs, Settings},
    domain::types::PurgeMode,
    infra::{
        edge::{EdgeClient, EdgeClientOptions},
        error::InfraError,
        hosting::ProcessEnvProbe,
        http::{self, ApiState},
        telemetry,
    },
    purge::{
        Dispatcher, EdgePurger, EnvironmentDetector, InMemoryFingerprintStore, PurgeCoordinator,
        PurgeQueue, PurgeStatus, QueueOptions, StaticSiteRegistry,
    },
};
use tokio::{signal, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(args) => run_purge(settings, args).await,
        config::Command::Status(_) => run_status(settings),
    }
}

/// Everything a command needs to run purges.
struct Runtime {
    coordinator: Arc<PurgeCoordinator>,
    queue: Option<PurgeQueue>,
    worker: Option<JoinHandle<()>>,
}

impl Runtime {
    async fn shutdown(self, grace: Duration) {
        let Runtime {
            coordinator,
            queue,
            worker,
        } = self;
        // The worker exits once every sender is gone.
        drop(queue);
        drop(coordinator);

        if let Some(worker) = worker
            && tokio::time::timeout(grace, worker).await.is_err()
        {
            warn!("Purge queue did not drain before the shutdown deadline");
        }
    }
}

fn build_detector(settings: &Settings) -> EnvironmentDetector {
    let probe = Arc::new(ProcessEnvProbe::new(settings.hosting.clone()));
    EnvironmentDetector::from_settings(&settings.edge, probe)
}

fn build_runtime(settings: &Settings, with_queue: bool) -> Result<Runtime, AppError> {
    let detector = build_detector(settings);
    let referer = settings.site.primary_home_url().map(str::to_string);
    let edge = EdgeClient::new(
        detector.clone(),
        EdgeClientOptions::from_settings(&settings.edge, referer),
    )
    .map_err(InfraError::from)?;
    let purger: Arc<dyn EdgePurger> = Arc::new(edge);
    let store = Arc::new(InMemoryFingerprintStore::new(settings.dedup.eviction));

    let (queue, worker) = if with_queue {
        let (queue, worker) = PurgeQueue::start(
            purger.clone(),
            Some(store.clone()),
            QueueOptions::from(&settings.dispatch),
        );
        (Some(queue), Some(worker))
    } else {
        (None, None)
    };

    let coordinator = PurgeCoordinator::new(
        detector,
        Arc::new(StaticSiteRegistry::new(settings.site.clone())),
        store,
        Dispatcher::new(purger, queue.clone()),
    );

    Ok(Runtime {
        coordinator: Arc::new(coordinator),
        queue,
        worker,
    })
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let runtime = build_runtime(&settings, true)?;
    log_capability(&runtime.coordinator.detector().capability());

    let router = http::build_api_router(ApiState::new(runtime.coordinator.clone()));
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.addr, "Purge service listening");

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    runtime.shutdown(settings.server.graceful_shutdown).await;
    served
}

async fn run_purge(settings: Settings, args: PurgeArgs) -> Result<(), AppError> {
    let mode = if args.deferred {
        PurgeMode::Deferred
    } else {
        PurgeMode::Immediate
    };
    let runtime = build_runtime(&settings, args.deferred)?;

    let status = if args.urls.is_empty() {
        runtime.coordinator.purge_site(mode).await
    } else {
        runtime.coordinator.purge_urls(args.urls, mode).await
    };
    print_json(&status)?;

    if let (PurgeStatus::Scheduled(job_id), Some(queue)) = (&status, runtime.queue.as_ref()) {
        let record = queue
            .wait_for(*job_id, Duration::from_secs(args.wait_seconds))
            .await
            .map_err(|err| AppError::unexpected(err.to_string()))?;
        print_json(&record)?;
    }

    runtime.shutdown(settings.server.graceful_shutdown).await;
    Ok(())
}

fn run_status(settings: Settings) -> Result<(), AppError> {
    let capability = build_detector(&settings).capability();
    print_json(&capability)
}

fn log_capability(capability: &edgepurge::purge::Capability) {
    if capability.enabled {
        info!(
            platform = capability.platform.wire_value(),
            endpoint_resolved = capability.endpoint_resolved,
            "Edge purge integration enabled"
        );
    } else {
        info!(
            credentials_present = capability.credentials_present,
            managed_host = capability.managed_host,
            "Edge purge integration disabled"
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
