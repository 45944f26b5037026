use crate::cli::ServeArgs;
use crate::infra::{open_store, AppState};
use crate::routes::with_analytics_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use funnel_analytics::analytics::FunnelAnalyticsService;
use funnel_analytics::config::AppConfig;
use funnel_analytics::error::AppError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut config: AppConfig, mut args: ServeArgs) -> Result<(), AppError> {
    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_store(&config.database, args.database.take())?;
    let default_model = config.analytics.default_model;
    let analytics_service = Arc::new(FunnelAnalyticsService::new(
        Arc::new(store),
        config.analytics.clone(),
    ));

    let app = with_analytics_routes(analytics_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        model = default_model.as_str(),
        "funnel analytics service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
