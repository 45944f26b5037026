//! Sales funnel analytics: stage aggregation, bottleneck detection, revenue
//! attribution, source ROI, and the dashboard views assembled from them.

pub mod aggregator;
pub mod attribution;
pub mod bottleneck;
pub mod domain;
pub mod export;
pub mod report;
pub mod router;
pub mod service;
pub mod sources;

#[cfg(test)]
mod tests;

pub use aggregator::{aggregate_funnel, classify_exit, ExitKind, FunnelAggregate, StageAggregate};
pub use attribution::{
    AttributedSource, AttributionBreakdown, AttributionEngine, AttributionError, AttributionModel,
    AttributionSettings, ContractAttribution, SourceAttribution,
};
pub use bottleneck::{
    BottleneckConfig, BottleneckDetector, BottleneckFinding, BottleneckReason, BottleneckReport,
    Severity, StuckGroup, StuckProspect,
};
pub use domain::{
    DateWindow, DomainError, FunnelStage, LeadSource, Prospect, SourceCategory, StageCatalog,
    StageKind,
};
pub use export::{write_report, ExportError, ReportKind};
pub use report::views::{DashboardView, Insight, InsightCategory, InsightPriority, OverviewView};
pub use report::{InsightThresholds, OverviewMetrics, TrendPoint, TrendSeries};
pub use router::{analytics_router, WindowQuery};
pub use service::{as_of_for, AnalyticsError, FunnelAnalyticsService};
pub use sources::{Roi, SourcePerformance};
