use chrono::{NaiveDate, Utc};
use funnel_analytics::analytics::domain::DateWindow;
use funnel_analytics::analytics::AnalyticsError;
use funnel_analytics::config::DatabaseConfig;
use funnel_analytics::error::AppError;
use funnel_analytics::store::SqliteFunnelStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Opens the configured database, or an empty in-memory one when none is set.
pub(crate) fn open_store(
    config: &DatabaseConfig,
    override_path: Option<PathBuf>,
) -> Result<SqliteFunnelStore, AppError> {
    match override_path.or_else(|| config.path.clone()) {
        Some(path) => Ok(SqliteFunnelStore::open(path)?),
        None => {
            warn!("FUNNEL_DATABASE_PATH not set; using an empty in-memory database");
            Ok(SqliteFunnelStore::open_in_memory()?)
        }
    }
}

/// Window ending on `end_date` (default today), reaching back `default_days`
/// unless `start_date` is given.
pub(crate) fn resolve_window(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    default_days: u32,
) -> Result<DateWindow, AppError> {
    let end = end_date.unwrap_or_else(|| Utc::now().date_naive());
    match start_date {
        Some(start) => DateWindow::new(start, end)
            .map_err(|err| AppError::Analytics(AnalyticsError::Domain(err))),
        None => Ok(DateWindow::trailing(end, default_days)),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date(" 2025-02-28 ").expect("valid"),
            NaiveDate::from_ymd_opt(2025, 2, 28).expect("valid date")
        );
        let error = parse_date("2025-02-30").expect_err("invalid day");
        assert!(error.contains("2025-02-30"));
    }

    #[test]
    fn resolve_window_rejects_inverted_range() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date");
        let end = NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid date");
        assert!(resolve_window(Some(start), Some(end), 30).is_err());

        let window = resolve_window(None, Some(end), 30).expect("trailing window");
        assert_eq!(window.end, end);
        assert_eq!(window.days(), 30);
    }
}
