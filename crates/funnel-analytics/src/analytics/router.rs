use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::attribution::AttributionModel;
use super::domain::DateWindow;
use super::service::{as_of_for, AnalyticsError, FunnelAnalyticsService};
use crate::store::FunnelRepository;

/// Default lookback for funnel views.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;
/// Revenue views look further back so long sales cycles are credited.
pub const REVENUE_WINDOW_DAYS: u32 = 90;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub model: Option<String>,
}

impl WindowQuery {
    pub fn window(&self, today: NaiveDate, default_days: u32) -> Result<DateWindow, AnalyticsError> {
        let end = self.end_date.unwrap_or(today);
        match self.start_date {
            Some(start) => Ok(DateWindow::new(start, end)?),
            None => Ok(DateWindow::trailing(end, default_days)),
        }
    }

    pub fn model(&self, fallback: AttributionModel) -> Result<AttributionModel, AnalyticsError> {
        match self.model.as_deref() {
            Some(token) => Ok(token.parse::<AttributionModel>()?),
            None => Ok(fallback),
        }
    }
}

/// Router builder exposing the read-only funnel dashboard endpoints.
pub fn analytics_router<R>(service: Arc<FunnelAnalyticsService<R>>) -> Router
where
    R: FunnelRepository + 'static,
{
    Router::new()
        .route("/api/v1/funnel/overview", get(overview_handler::<R>))
        .route("/api/v1/funnel/stages", get(stages_handler::<R>))
        .route("/api/v1/funnel/sources", get(sources_handler::<R>))
        .route("/api/v1/funnel/bottlenecks", get(bottlenecks_handler::<R>))
        .route("/api/v1/funnel/attribution", get(attribution_handler::<R>))
        .route("/api/v1/funnel/trends", get(trends_handler::<R>))
        .route("/api/v1/funnel/insights", get(insights_handler::<R>))
        .route("/api/v1/funnel/dashboard", get(dashboard_handler::<R>))
        .with_state(service)
}

fn respond<T: Serialize>(result: Result<T, AnalyticsError>) -> Response {
    match result {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) if error.is_client_error() => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(other) => {
            warn!(error = %other, "funnel view failed");
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

/// Repository reads are synchronous, so views run on the blocking pool.
async fn run_view<R, T, F>(service: Arc<FunnelAnalyticsService<R>>, view: F) -> Response
where
    R: FunnelRepository + 'static,
    T: Serialize + Send + 'static,
    F: FnOnce(&FunnelAnalyticsService<R>) -> Result<T, AnalyticsError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || view(&service)).await {
        Ok(result) => respond(result),
        Err(join_error) => {
            warn!(error = %join_error, "funnel view task aborted");
            let payload = json!({
                "error": "funnel view task aborted",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) async fn overview_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let window = query.window(today(), DEFAULT_WINDOW_DAYS)?;
        service.overview(window, as_of_for(&window, Utc::now()))
    })
    .await
}

pub(crate) async fn stages_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let window = query.window(today(), DEFAULT_WINDOW_DAYS)?;
        service.funnel_breakdown(window)
    })
    .await
}

pub(crate) async fn sources_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let window = query.window(today(), REVENUE_WINDOW_DAYS)?;
        service.source_performance(window)
    })
    .await
}

pub(crate) async fn bottlenecks_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let window = query.window(today(), DEFAULT_WINDOW_DAYS)?;
        service.bottlenecks(window, as_of_for(&window, Utc::now()))
    })
    .await
}

pub(crate) async fn attribution_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let model = query.model(service.default_model())?;
        let window = query.window(today(), REVENUE_WINDOW_DAYS)?;
        service.attribution(window, model)
    })
    .await
}

pub(crate) async fn trends_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let window = query.window(today(), REVENUE_WINDOW_DAYS)?;
        service.trends(window)
    })
    .await
}

pub(crate) async fn insights_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let window = query.window(today(), DEFAULT_WINDOW_DAYS)?;
        service.insights(window, as_of_for(&window, Utc::now()))
    })
    .await
}

pub(crate) async fn dashboard_handler<R>(
    State(service): State<Arc<FunnelAnalyticsService<R>>>,
    Query(query): Query<WindowQuery>,
) -> Response
where
    R: FunnelRepository + 'static,
{
    run_view(service, move |service| {
        let model = query.model(service.default_model())?;
        let window = query.window(today(), DEFAULT_WINDOW_DAYS)?;
        service.dashboard(window, model, as_of_for(&window, Utc::now()))
    })
    .await
}
