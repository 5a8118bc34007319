use crate::cli::ServeArgs;
use crate::infra::{build_catalog, build_verifier, AppState, SeedFile};
use crate::routes::with_recruitment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use enrollments::config::AppConfig;
use enrollments::error::AppError;
use enrollments::telemetry;
use enrollments::workflows::recruitment::{RecruitmentService, RecruitmentStores, ServiceSettings};
use std::sync::atomic::Ordering;
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
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = build_catalog(&config.recruitment)?;
    let (stores, _memory) = RecruitmentStores::in_memory(&config.storage, &catalog)?;

    let seed = match &config.storage.seed_path {
        Some(path) => SeedFile::load(path)?,
        None => SeedFile::default(),
    };
    seed.apply(&stores).await?;

    let verifier = build_verifier(&config.auth, &seed.tokens);
    let settings = ServiceSettings::from_config(&config.storage, &config.recruitment);
    let service = Arc::new(RecruitmentService::new(
        Arc::new(verifier),
        Arc::new(stores),
        Arc::new(catalog),
        settings,
    ));

    let app = with_recruitment_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, tables = %config.storage.table_prefix, "enrollment service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
