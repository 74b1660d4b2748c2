use crate::cli::ServeArgs;
use crate::infra::{seed_demo, AppState};
use crate::routes::with_pool_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use interpreter_pool::assignment::{AssignmentService, InMemoryBookingStore};
use interpreter_pool::config::AppConfig;
use interpreter_pool::error::AppError;
use interpreter_pool::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryBookingStore::new());
    let service = Arc::new(AssignmentService::new(Arc::clone(&store), &config.pool));
    if args.seed_demo {
        let admitted = seed_demo(&service, &store, Utc::now())?;
        info!(bookings = admitted.len(), "demo roster seeded");
    }

    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn(
        Arc::clone(service.scheduler()).run(config.pool.tick(), cancel.child_token()),
    );

    let app = with_pool_routes(Arc::clone(&service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        mode = config.pool.policy_mode.label(),
        "interpreter pool service ready"
    );

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "could not listen for shutdown signal");
            }
            readiness_flag.store(false, Ordering::Release);
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Err(err) = scheduler.await {
        warn!(error = %err, "pool scheduler task ended abnormally");
    }
    info!("interpreter pool service stopped");
    Ok(())
}
