use super::attribution::AttributionBreakdown;
use super::domain::{LeadSource, SourceCategory, SourceId};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Return on investment; undefined when the source costs nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "percent", rename_all = "snake_case")]
pub enum Roi {
    Defined(f64),
    Undefined,
}

impl Roi {
    pub fn compute(revenue: f64, cost: f64) -> Self {
        if cost > 0.0 {
            Self::Defined((revenue - cost) / cost * 100.0)
        } else {
            Self::Undefined
        }
    }

    pub fn percent(self) -> Option<f64> {
        match self {
            Self::Defined(percent) => Some(percent),
            Self::Undefined => None,
        }
    }
}

/// Raw per-source inputs for one window.
#[derive(Debug, Clone)]
pub struct SourceInput<'a> {
    pub source: &'a LeadSource,
    pub lead_count: usize,
    pub contracts_count: usize,
    pub attributed_revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourcePerformance {
    pub source_id: SourceId,
    pub source_name: String,
    pub category: SourceCategory,
    pub cost_per_lead: f64,
    pub lead_count: usize,
    pub contracts_count: usize,
    pub attributed_revenue: f64,
    pub total_cost: f64,
    pub roi: Roi,
    pub revenue_per_lead: f64,
    pub conversion_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_acquisition: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payback_period_months: Option<f64>,
}

pub fn compute_performance(input: &SourceInput<'_>) -> SourcePerformance {
    let source = input.source;
    let leads = input.lead_count as f64;
    let total_cost = leads * source.cost_per_lead;

    let (revenue_per_lead, conversion_rate) = if input.lead_count == 0 {
        (0.0, 0.0)
    } else {
        (
            input.attributed_revenue / leads,
            input.contracts_count as f64 / leads * 100.0,
        )
    };
    let cost_per_acquisition =
        (input.contracts_count > 0).then(|| total_cost / input.contracts_count as f64);
    let payback_period_months =
        (revenue_per_lead > 0.0).then(|| source.cost_per_lead / (revenue_per_lead / 12.0));

    SourcePerformance {
        source_id: source.id,
        source_name: source.name.clone(),
        category: source.category,
        cost_per_lead: source.cost_per_lead,
        lead_count: input.lead_count,
        contracts_count: input.contracts_count,
        attributed_revenue: input.attributed_revenue,
        total_cost,
        roi: Roi::compute(input.attributed_revenue, total_cost),
        revenue_per_lead,
        conversion_rate,
        cost_per_acquisition,
        payback_period_months,
    }
}

/// Defined ROI first (highest first), then undefined ROI by revenue; ties by id.
pub fn rank_sources(mut rows: Vec<SourcePerformance>) -> Vec<SourcePerformance> {
    rows.sort_by(compare_performance);
    rows
}

fn compare_performance(a: &SourcePerformance, b: &SourcePerformance) -> Ordering {
    let tier = match (a.roi, b.roi) {
        (Roi::Defined(left), Roi::Defined(right)) => right.total_cmp(&left),
        (Roi::Defined(_), Roi::Undefined) => Ordering::Less,
        (Roi::Undefined, Roi::Defined(_)) => Ordering::Greater,
        (Roi::Undefined, Roi::Undefined) => b.attributed_revenue.total_cmp(&a.attributed_revenue),
    };
    tier.then(a.source_id.cmp(&b.source_id))
}

/// Ranked performance table for `sources`, fed by lead counts and the
/// attribution breakdown of the same window.
pub fn source_performance(
    sources: &[LeadSource],
    leads_by_source: &HashMap<SourceId, usize>,
    breakdown: &AttributionBreakdown,
) -> Vec<SourcePerformance> {
    let rows = sources
        .iter()
        .map(|source| {
            let credited = breakdown.source(source.id);
            compute_performance(&SourceInput {
                source,
                lead_count: leads_by_source.get(&source.id).copied().unwrap_or(0),
                contracts_count: credited.map(|row| row.contracts_credited).unwrap_or(0),
                attributed_revenue: credited.map(|row| row.attributed_revenue).unwrap_or(0.0),
            })
        })
        .collect();

    rank_sources(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: i64, cost_per_lead: f64) -> LeadSource {
        LeadSource {
            id: SourceId(id),
            name: format!("Source {id}"),
            category: SourceCategory::Website,
            attribution_window_days: 90,
            cost_per_lead,
            is_active: true,
        }
    }

    fn perf(source: &LeadSource, leads: usize, contracts: usize, revenue: f64) -> SourcePerformance {
        compute_performance(&SourceInput {
            source,
            lead_count: leads,
            contracts_count: contracts,
            attributed_revenue: revenue,
        })
    }

    #[test]
    fn roi_is_undefined_without_cost() {
        assert_eq!(Roi::compute(1_000.0, 0.0), Roi::Undefined);
        assert_eq!(Roi::compute(300.0, 100.0), Roi::Defined(200.0));
        assert_eq!(Roi::compute(50.0, 100.0).percent(), Some(-50.0));
    }

    #[test]
    fn derives_cost_and_payback_metrics() {
        let paid = source(1, 100.0);
        let row = perf(&paid, 10, 2, 6_000.0);

        assert!((row.total_cost - 1_000.0).abs() < f64::EPSILON);
        assert_eq!(row.roi, Roi::Defined(500.0));
        assert!((row.revenue_per_lead - 600.0).abs() < f64::EPSILON);
        assert!((row.conversion_rate - 20.0).abs() < f64::EPSILON);
        assert_eq!(row.cost_per_acquisition, Some(500.0));
        assert_eq!(row.payback_period_months, Some(2.0));
    }

    #[test]
    fn zero_leads_produce_zero_rates_and_no_ratios() {
        let paid = source(1, 100.0);
        let row = perf(&paid, 0, 0, 0.0);

        assert_eq!(row.revenue_per_lead, 0.0);
        assert_eq!(row.conversion_rate, 0.0);
        assert_eq!(row.cost_per_acquisition, None);
        assert_eq!(row.payback_period_months, None);
        assert_eq!(row.roi, Roi::Undefined);
    }

    #[test]
    fn ranking_puts_defined_roi_before_undefined() {
        let a = source(1, 0.0);
        let b = source(2, 100.0);
        let c = source(3, 100.0);
        let d = source(4, 0.0);

        let ranked = rank_sources(vec![
            perf(&a, 5, 1, 5_000.0),
            perf(&b, 10, 1, 1_500.0),
            perf(&c, 10, 2, 4_000.0),
            perf(&d, 5, 2, 9_000.0),
        ]);

        let ids: Vec<i64> = ranked.iter().map(|row| row.source_id.0).collect();
        assert_eq!(ids, vec![3, 2, 4, 1]);
    }

    #[test]
    fn roi_serializes_as_tagged_value() {
        let json = serde_json::to_value(Roi::Defined(12.5)).expect("serializes");
        assert_eq!(json["status"], "defined");
        assert_eq!(json["percent"], 12.5);
        let json = serde_json::to_value(Roi::Undefined).expect("serializes");
        assert_eq!(json["status"], "undefined");
    }
}
