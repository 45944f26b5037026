use super::super::attribution::{AttributedSource, AttributionBreakdown};
use super::super::bottleneck::{BottleneckReport, Severity};
use super::super::sources::{Roi, SourcePerformance};
use super::summary::OverviewMetrics;
use super::views::{Insight, InsightCategory, InsightMetric, InsightPriority};
use serde::{Deserialize, Serialize};

/// Rule thresholds; every value is a percentage, a day count or a currency amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightThresholds {
    pub critical_conversion_percent: f64,
    pub concentration_percent: f64,
    pub scale_roi_percent: f64,
    pub poor_roi_percent: f64,
    pub long_cycle_days: f64,
    pub small_deal_size: f64,
    pub strong_conversion_percent: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            critical_conversion_percent: 5.0,
            concentration_percent: 60.0,
            scale_roi_percent: 200.0,
            poor_roi_percent: 50.0,
            long_cycle_days: 70.0,
            small_deal_size: 40_000.0,
            strong_conversion_percent: 12.0,
        }
    }
}

pub(crate) struct InsightInputs<'a> {
    pub overview: &'a OverviewMetrics,
    pub bottlenecks: &'a BottleneckReport,
    pub sources: &'a [SourcePerformance],
    pub attribution: &'a AttributionBreakdown,
    pub stuck_multiplier: f64,
}

fn insight(
    priority: InsightPriority,
    category: InsightCategory,
    title: String,
    message: String,
    metric: &'static str,
    value: f64,
) -> Insight {
    Insight {
        priority,
        category,
        title,
        message,
        metric: InsightMetric { name: metric, value },
    }
}

pub(crate) fn generate_insights(inputs: &InsightInputs<'_>, thresholds: &InsightThresholds) -> Vec<Insight> {
    use InsightCategory::*;
    use InsightPriority::{High, Low, Medium};

    let overview = inputs.overview;
    let mut insights = Vec::new();

    for finding in inputs
        .bottlenecks
        .findings
        .iter()
        .filter(|finding| finding.severity == Severity::High)
    {
        let action = finding
            .recommendations
            .first()
            .copied()
            .unwrap_or("needs immediate attention");
        insights.push(insight(
            High,
            Bottleneck,
            format!("Critical bottleneck: {}", finding.stage_name),
            format!(
                "{:.1}% of prospects convert out of {}. {}.",
                finding.conversion_rate, finding.stage_name, action
            ),
            "stage_conversion_rate",
            finding.conversion_rate,
        ));
    }

    for row in inputs.sources {
        if let Roi::Defined(roi) = row.roi {
            if roi < 0.0 {
                insights.push(insight(
                    High,
                    Cost,
                    format!("{} is losing money", row.source_name),
                    format!(
                        "{} cost {:.0} and returned {:.0}. Pause or rework it.",
                        row.source_name, row.total_cost, row.attributed_revenue
                    ),
                    "roi_percent",
                    roi,
                ));
            }
        }
    }

    if !overview.is_empty() && overview.overall_conversion_rate < thresholds.critical_conversion_percent {
        insights.push(insight(
            High,
            Conversion,
            "Overall conversion is critically low".to_string(),
            format!(
                "Only {:.1}% of leads become contracts. Tighten lead qualification and the sales process.",
                overview.overall_conversion_rate
            ),
            "overall_conversion_rate",
            overview.overall_conversion_rate,
        ));
    }

    let top_source = inputs
        .attribution
        .sources
        .iter()
        .find(|row| row.source != AttributedSource::Unattributed);
    if let Some(top) = top_source {
        if top.revenue_percentage > thresholds.concentration_percent {
            insights.push(insight(
                High,
                Concentration,
                "Revenue depends on a single source".to_string(),
                format!(
                    "{} accounts for {:.1}% of attributed revenue. Diversify lead generation.",
                    top.source_name, top.revenue_percentage
                ),
                "revenue_share_percent",
                top.revenue_percentage,
            ));
        }
    }

    for row in inputs.sources {
        match row.roi {
            Roi::Defined(roi) if roi > thresholds.scale_roi_percent => insights.push(insight(
                Medium,
                Scaling,
                format!("Scale {}", row.source_name),
                format!("{} returns {:.0}% ROI. Increase investment.", row.source_name, roi),
                "roi_percent",
                roi,
            )),
            Roi::Undefined if row.attributed_revenue > 0.0 => insights.push(insight(
                Medium,
                Scaling,
                format!("Grow {}", row.source_name),
                format!(
                    "{} produced {:.0} in revenue at no lead cost. Look for ways to grow it.",
                    row.source_name, row.attributed_revenue
                ),
                "attributed_revenue",
                row.attributed_revenue,
            )),
            _ => {}
        }
    }

    for row in inputs.sources {
        if let Roi::Defined(roi) = row.roi {
            if (0.0..thresholds.poor_roi_percent).contains(&roi) {
                insights.push(insight(
                    Medium,
                    Cost,
                    format!("{} barely pays back", row.source_name),
                    format!(
                        "{} returns {:.0}% ROI. Optimise targeting or cost per lead.",
                        row.source_name, roi
                    ),
                    "roi_percent",
                    roi,
                ));
            }
        }
    }

    for finding in inputs
        .bottlenecks
        .findings
        .iter()
        .filter(|finding| finding.severity != Severity::High)
    {
        insights.push(insight(
            Medium,
            Bottleneck,
            format!("Slowdown at {}", finding.stage_name),
            format!(
                "{} is flagged ({}).",
                finding.stage_name,
                finding
                    .reasons
                    .iter()
                    .map(|reason| reason.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            "bottleneck_score",
            finding.score,
        ));
    }

    if let Some(cycle) = overview.avg_sales_cycle_days {
        if cycle > thresholds.long_cycle_days {
            insights.push(insight(
                Medium,
                Velocity,
                "Sales cycle is long".to_string(),
                format!(
                    "Deals take {:.0} days on average to close. Create urgency and simplify decisions.",
                    cycle
                ),
                "avg_sales_cycle_days",
                cycle,
            ));
        }
    }

    let stuck = inputs.bottlenecks.total_stuck();
    if stuck > 0 {
        insights.push(insight(
            Medium,
            Pipeline,
            "Prospects are stalled".to_string(),
            format!(
                "{stuck} prospects have waited more than {} times the expected time in their stage. Run a re-engagement pass.",
                inputs.stuck_multiplier
            ),
            "prospects_stuck",
            stuck as f64,
        ));
    }

    if overview.contracts_signed > 0 && overview.avg_deal_size < thresholds.small_deal_size {
        insights.push(insight(
            Medium,
            DealSize,
            "Deal size is small".to_string(),
            format!(
                "Average deal is {:.0}. Consider packaging or upselling.",
                overview.avg_deal_size
            ),
            "avg_deal_size",
            overview.avg_deal_size,
        ));
    }

    if overview.overall_conversion_rate > thresholds.strong_conversion_percent {
        insights.push(insight(
            Low,
            Conversion,
            "Conversion is healthy".to_string(),
            format!(
                "{:.1}% of leads convert. Keep the current qualification bar.",
                overview.overall_conversion_rate
            ),
            "overall_conversion_rate",
            overview.overall_conversion_rate,
        ));
    }

    if insights.is_empty() || overview.is_empty() {
        let unattributed = inputs
            .attribution
            .sources
            .iter()
            .find(|row| row.source == AttributedSource::Unattributed)
            .map(|row| row.revenue_percentage)
            .unwrap_or(0.0);
        let message = if overview.is_empty() {
            "No leads were created in this window. Widen the window or check data capture.".to_string()
        } else {
            "No issues found. Keep monitoring weekly.".to_string()
        };
        insights.push(insight(
            Low,
            Monitoring,
            "Nothing to act on".to_string(),
            message,
            "unattributed_revenue_percent",
            unattributed,
        ));
    }

    insights.sort_by_key(|insight| insight.priority);
    insights
}
