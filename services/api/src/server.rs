use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use stewardship::compliance::{ComplianceService, InMemoryOffsetRepository};
use stewardship::config::AppConfig;
use stewardship::dataset::Dataset;
use stewardship::error::AppError;
use stewardship::telemetry;
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

    let (dataset, import) = Dataset::load_dir(&config.data.dir)?;
    for issue in &import.issues {
        warn!(file = issue.file, line = issue.line, message = %issue.message, "import issue");
    }
    info!(
        communities = import.communities,
        sites = import.sites,
        adjacency_pairs = import.adjacency_pairs,
        rules = import.rules,
        dir = %config.data.dir.display(),
        "dataset loaded"
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        import: Arc::new(import),
    };

    let repository = Arc::new(InMemoryOffsetRepository::new());
    let service = Arc::new(
        ComplianceService::new(Arc::new(dataset), repository)
            .with_default_year(config.data.program_year),
    );

    let app = with_operational_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        program_year = config.data.program_year,
        "stewardship compliance service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
