use crate::cli::ServeArgs;
use crate::demo::seed_demo_poll;
use crate::infra::{AppState, Backends};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use nexus_polls::config::AppConfig;
use nexus_polls::error::AppError;
use nexus_polls::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

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

    let backends = Backends::in_memory(&config.auth);
    if args.seed {
        let poll = seed_demo_poll(&backends.polls, None)?;
        info!(poll_id = %poll.id, "seeded sample poll");
    }

    let app = with_operational_routes(backends.polls, backends.users, backends.tokens)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "poll service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
