//! CSV rendering of dashboard tables.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde::Serialize;

use super::aggregator::FunnelAggregate;
use super::attribution::{AttributedSource, AttributionBreakdown};
use super::bottleneck::BottleneckReport;
use super::report::views::DashboardView;
use super::sources::SourcePerformance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Sources,
    Stages,
    Bottlenecks,
    Attribution,
    Trends,
}

impl ReportKind {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Sources,
            Self::Stages,
            Self::Bottlenecks,
            Self::Attribution,
            Self::Trends,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sources => "sources",
            Self::Stages => "stages",
            Self::Bottlenecks => "bottlenecks",
            Self::Attribution => "attribution",
            Self::Trends => "trends",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().to_ascii_lowercase();
        Self::ordered()
            .into_iter()
            .find(|kind| kind.as_str() == token)
            .ok_or_else(|| ExportError::UnknownReport(value.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown report '{0}' (expected sources, stages, bottlenecks, attribution or trends)")]
    UnknownReport(String),
}

#[derive(Debug, Serialize)]
struct SourceRow<'a> {
    source_id: i64,
    source_name: &'a str,
    category: &'static str,
    lead_count: usize,
    contracts_count: usize,
    attributed_revenue: f64,
    total_cost: f64,
    roi_percent: Option<f64>,
    revenue_per_lead: f64,
    conversion_rate: f64,
    cost_per_acquisition: Option<f64>,
    payback_period_months: Option<f64>,
}

#[derive(Debug, Serialize)]
struct StageRow<'a> {
    stage_order: u32,
    stage_name: &'a str,
    kind: &'static str,
    prospects_entered: usize,
    prospects_exited: usize,
    prospects_converted: usize,
    prospects_dropped: usize,
    open_entries: usize,
    avg_duration_days: Option<f64>,
    expected_duration_days: f64,
    stage_conversion_rate: f64,
    funnel_conversion_rate: f64,
}

#[derive(Debug, Serialize)]
struct BottleneckRow<'a> {
    stage_order: u32,
    stage_name: &'a str,
    severity: &'static str,
    score: f64,
    reasons: String,
    avg_duration_days: Option<f64>,
    expected_duration_days: f64,
    conversion_rate: f64,
    prospects_entered: usize,
    prospects_stuck: usize,
}

#[derive(Debug, Serialize)]
struct AttributionRow<'a> {
    model: &'static str,
    source_id: Option<i64>,
    source_name: &'a str,
    attributed_revenue: f64,
    attributed_mrr: f64,
    contracts_credited: usize,
    avg_deal_size: f64,
    avg_sales_cycle_days: Option<f64>,
    revenue_percentage: f64,
}

/// Writes one table of `view` as CSV with a header row. Returns the number
/// of data rows written.
pub fn write_report<W: Write>(kind: ReportKind, view: &DashboardView, writer: W) -> Result<usize, ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let rows = match kind {
        ReportKind::Sources => write_sources(&mut csv_writer, &view.sources)?,
        ReportKind::Stages => write_stages(&mut csv_writer, &view.funnel)?,
        ReportKind::Bottlenecks => write_bottlenecks(&mut csv_writer, &view.bottlenecks)?,
        ReportKind::Attribution => write_attribution(&mut csv_writer, &view.attribution)?,
        ReportKind::Trends => {
            for week in &view.trends.weeks {
                csv_writer.serialize(week)?;
            }
            view.trends.weeks.len()
        }
    };
    csv_writer.flush()?;
    Ok(rows)
}

fn write_sources<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    rows: &[SourcePerformance],
) -> Result<usize, ExportError> {
    for row in rows {
        csv_writer.serialize(SourceRow {
            source_id: row.source_id.0,
            source_name: &row.source_name,
            category: row.category.as_str(),
            lead_count: row.lead_count,
            contracts_count: row.contracts_count,
            attributed_revenue: row.attributed_revenue,
            total_cost: row.total_cost,
            roi_percent: row.roi.percent(),
            revenue_per_lead: row.revenue_per_lead,
            conversion_rate: row.conversion_rate,
            cost_per_acquisition: row.cost_per_acquisition,
            payback_period_months: row.payback_period_months,
        })?;
    }
    Ok(rows.len())
}

fn write_stages<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    funnel: &FunnelAggregate,
) -> Result<usize, ExportError> {
    for stage in &funnel.stages {
        csv_writer.serialize(StageRow {
            stage_order: stage.stage_order,
            stage_name: &stage.stage_name,
            kind: stage.kind.as_str(),
            prospects_entered: stage.prospects_entered,
            prospects_exited: stage.prospects_exited,
            prospects_converted: stage.prospects_converted,
            prospects_dropped: stage.prospects_dropped,
            open_entries: stage.open_entries,
            avg_duration_days: stage.avg_duration_days,
            expected_duration_days: stage.expected_duration_days,
            stage_conversion_rate: stage.stage_conversion_rate,
            funnel_conversion_rate: stage.funnel_conversion_rate,
        })?;
    }
    Ok(funnel.stages.len())
}

fn write_bottlenecks<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    report: &BottleneckReport,
) -> Result<usize, ExportError> {
    for finding in &report.findings {
        let reasons: Vec<&str> = finding.reasons.iter().map(|reason| reason.as_str()).collect();
        csv_writer.serialize(BottleneckRow {
            stage_order: finding.stage_order,
            stage_name: &finding.stage_name,
            severity: finding.severity.label(),
            score: finding.score,
            reasons: reasons.join(";"),
            avg_duration_days: finding.avg_duration_days,
            expected_duration_days: finding.expected_duration_days,
            conversion_rate: finding.conversion_rate,
            prospects_entered: finding.prospects_entered,
            prospects_stuck: finding.prospects_stuck,
        })?;
    }
    Ok(report.findings.len())
}

fn write_attribution<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    breakdown: &AttributionBreakdown,
) -> Result<usize, ExportError> {
    for row in &breakdown.sources {
        let source_id = match row.source {
            AttributedSource::Source(id) => Some(id.0),
            AttributedSource::Unattributed => None,
        };
        csv_writer.serialize(AttributionRow {
            model: breakdown.model.as_str(),
            source_id,
            source_name: &row.source_name,
            attributed_revenue: row.attributed_revenue,
            attributed_mrr: row.attributed_mrr,
            contracts_credited: row.contracts_credited,
            avg_deal_size: row.avg_deal_size,
            avg_sales_cycle_days: row.avg_sales_cycle_days,
            revenue_percentage: row.revenue_percentage,
        })?;
    }
    Ok(breakdown.sources.len())
}
