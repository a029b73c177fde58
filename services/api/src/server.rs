use crate::cli::ServeArgs;
use crate::demo::{demo_catalog, demo_profiles, demo_venues};
use crate::infra::{AppState, StaticLocationSource, StaticProfileSource};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dealmap::catalog::{
    spawn_refresh, CatalogHandle, CatalogSource, JsonFileCatalogSource, StaticCatalogSource,
};
use dealmap::config::AppConfig;
use dealmap::error::AppError;
use dealmap::recommend::{Collaborators, InMemoryUsageTracker, RecommendationService};
use dealmap::telemetry;
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
    if let Some(path) = args.catalog.take() {
        config.catalog.path = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let source: Arc<dyn CatalogSource> = match &config.catalog.path {
        Some(path) => Arc::new(JsonFileCatalogSource::new(path)),
        None => Arc::new(StaticCatalogSource::new(demo_catalog()?)),
    };
    let catalog = Arc::new(CatalogHandle::new());
    let snapshot = catalog.refresh_from(source.as_ref())?;
    info!(
        source = %source.describe(),
        catalog_version = snapshot.version(),
        "catalog loaded"
    );

    let _refresh = config.catalog.refresh_interval.map(|every| {
        info!(every_secs = every.as_secs(), "catalog refresh scheduled");
        spawn_refresh(catalog.clone(), source.clone(), every)
    });

    let collaborators = Collaborators::new(
        Arc::new(StaticLocationSource::new(demo_venues())),
        Arc::new(StaticProfileSource::new(demo_profiles())),
    );
    let service = Arc::new(
        RecommendationService::new(
            catalog,
            Arc::new(InMemoryUsageTracker::new()),
            config.recommendation.clone(),
        )
        .with_collaborators(collaborators),
    );

    let app = with_service_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "dealmap recommendation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
