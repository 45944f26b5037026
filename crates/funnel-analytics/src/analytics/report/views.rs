use super::super::aggregator::FunnelAggregate;
use super::super::attribution::{AttributionBreakdown, AttributionModel};
use super::super::bottleneck::{BottleneckReport, Severity};
use super::super::domain::DateWindow;
use super::super::sources::SourcePerformance;
use super::summary::{OverviewMetrics, TrendSeries};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InsightPriority {
    High,
    Medium,
    Low,
}

impl InsightPriority {
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Bottleneck,
    Cost,
    Conversion,
    Concentration,
    Scaling,
    Velocity,
    Pipeline,
    DealSize,
    Monitoring,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightMetric {
    pub name: &'static str,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub priority: InsightPriority,
    pub category: InsightCategory,
    pub title: String,
    pub message: String,
    pub metric: InsightMetric,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn from_report(report: &BottleneckReport) -> Self {
        Self {
            high: report.count_by_severity(Severity::High),
            medium: report.count_by_severity(Severity::Medium),
            low: report.count_by_severity(Severity::Low),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceHighlight {
    pub source_name: String,
    pub attributed_revenue: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewView {
    pub is_empty: bool,
    pub metrics: OverviewMetrics,
    pub bottlenecks: SeverityCounts,
    pub prospects_stuck: usize,
    pub top_sources: Vec<SourceHighlight>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub window: DateWindow,
    pub model: AttributionModel,
    pub is_empty: bool,
    pub overview: OverviewMetrics,
    pub funnel: FunnelAggregate,
    pub sources: Vec<SourcePerformance>,
    pub bottlenecks: BottleneckReport,
    pub attribution: AttributionBreakdown,
    pub trends: TrendSeries,
    pub insights: Vec<Insight>,
}

pub(crate) fn source_highlights(rows: &[SourcePerformance], limit: usize) -> Vec<SourceHighlight> {
    let mut by_revenue: Vec<&SourcePerformance> = rows.iter().collect();
    by_revenue.sort_by(|a, b| {
        b.attributed_revenue
            .total_cmp(&a.attributed_revenue)
            .then(a.source_id.cmp(&b.source_id))
    });
    by_revenue
        .into_iter()
        .take(limit)
        .map(|row| SourceHighlight {
            source_name: row.source_name.clone(),
            attributed_revenue: row.attributed_revenue,
            conversion_rate: row.conversion_rate,
        })
        .collect()
}
