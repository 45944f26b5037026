mod insights;
mod summary;
pub mod views;

pub use insights::InsightThresholds;
pub use summary::{overview_metrics, week_start, weekly_trends, OverviewMetrics, TrendPoint, TrendSeries};

pub(crate) use insights::{generate_insights, InsightInputs};
