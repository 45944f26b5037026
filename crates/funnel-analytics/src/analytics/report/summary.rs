use super::super::aggregator::percentage;
use super::super::domain::{
    days_between, CallStatus, Contract, DateWindow, DiscoveryCall, LeadSource, Proposal,
    Prospect, ProspectId, SourceId,
};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Headline funnel metrics for the cohort of prospects created in a window.
#[derive(Debug, Clone, Serialize)]
pub struct OverviewMetrics {
    pub window: DateWindow,
    pub total_leads: usize,
    pub discovery_calls_scheduled: usize,
    pub discovery_calls_completed: usize,
    pub proposals_sent: usize,
    pub contracts_signed: usize,
    pub total_revenue: f64,
    pub avg_deal_size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_sales_cycle_days: Option<f64>,
    pub lead_to_discovery_rate: f64,
    pub discovery_to_proposal_rate: f64,
    pub proposal_to_contract_rate: f64,
    pub overall_conversion_rate: f64,
    pub total_acquisition_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_acquisition: Option<f64>,
}

impl OverviewMetrics {
    pub fn is_empty(&self) -> bool {
        self.total_leads == 0
    }
}

pub fn overview_metrics(
    window: &DateWindow,
    prospects: &[Prospect],
    sources: &[LeadSource],
    calls: &[DiscoveryCall],
    proposals: &[Proposal],
    contracts: &[Contract],
) -> OverviewMetrics {
    let cohort: HashMap<ProspectId, &Prospect> = prospects
        .iter()
        .filter(|prospect| window.contains(prospect.created_at))
        .map(|prospect| (prospect.id, prospect))
        .collect();
    let in_cohort = |id: &ProspectId| cohort.contains_key(id);

    let scheduled: HashSet<ProspectId> = calls
        .iter()
        .map(|call| call.prospect_id)
        .filter(in_cohort)
        .collect();
    let completed: HashSet<ProspectId> = calls
        .iter()
        .filter(|call| call.status == CallStatus::Completed)
        .map(|call| call.prospect_id)
        .filter(in_cohort)
        .collect();
    let proposed: HashSet<ProspectId> = proposals
        .iter()
        .filter(|proposal| proposal.status.was_sent())
        .map(|proposal| proposal.prospect_id)
        .filter(in_cohort)
        .collect();

    let signed: Vec<&Contract> = contracts
        .iter()
        .filter(|contract| contract.status.bears_revenue() && in_cohort(&contract.prospect_id))
        .collect();
    let signed_prospects: HashSet<ProspectId> =
        signed.iter().map(|contract| contract.prospect_id).collect();

    let total_revenue: f64 = signed.iter().map(|contract| contract.contract_value).sum();
    let avg_deal_size = if signed.is_empty() {
        0.0
    } else {
        total_revenue / signed.len() as f64
    };
    let cycles: Vec<f64> = signed
        .iter()
        .filter_map(|contract| {
            let prospect = cohort.get(&contract.prospect_id)?;
            Some(days_between(prospect.created_at, contract.signed_at))
        })
        .collect();
    let avg_sales_cycle_days =
        (!cycles.is_empty()).then(|| cycles.iter().sum::<f64>() / cycles.len() as f64);

    let cost_per_lead: HashMap<SourceId, f64> = sources
        .iter()
        .map(|source| (source.id, source.cost_per_lead))
        .collect();
    let total_acquisition_cost: f64 = cohort
        .values()
        .filter_map(|prospect| prospect.lead_source_id)
        .filter_map(|source_id| cost_per_lead.get(&source_id))
        .sum();

    let total_leads = cohort.len();
    let contracts_signed = signed_prospects.len();

    OverviewMetrics {
        window: *window,
        total_leads,
        discovery_calls_scheduled: scheduled.len(),
        discovery_calls_completed: completed.len(),
        proposals_sent: proposed.len(),
        contracts_signed,
        total_revenue,
        avg_deal_size,
        avg_sales_cycle_days,
        lead_to_discovery_rate: percentage(scheduled.len(), total_leads),
        discovery_to_proposal_rate: percentage(proposed.len(), completed.len()),
        proposal_to_contract_rate: percentage(contracts_signed, proposed.len()),
        overall_conversion_rate: percentage(contracts_signed, total_leads),
        total_acquisition_cost,
        cost_per_acquisition: (contracts_signed > 0)
            .then(|| total_acquisition_cost / contracts_signed as f64),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub week_start: NaiveDate,
    pub leads: usize,
    pub contracts: usize,
    pub revenue: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSeries {
    pub window: DateWindow,
    pub weeks: Vec<TrendPoint>,
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Weekly lead cohorts (weeks start on Monday), zero-filled across the window.
pub fn weekly_trends(window: &DateWindow, prospects: &[Prospect], contracts: &[Contract]) -> TrendSeries {
    let mut buckets: BTreeMap<NaiveDate, (HashSet<ProspectId>, HashSet<ProspectId>, f64)> =
        BTreeMap::new();

    let mut week = week_start(window.start);
    while week <= window.end {
        buckets.insert(week, Default::default());
        week += Duration::days(7);
    }

    let mut cohort_week: HashMap<ProspectId, NaiveDate> = HashMap::new();
    for prospect in prospects.iter().filter(|p| window.contains(p.created_at)) {
        let week = week_start(prospect.created_at.date_naive());
        cohort_week.insert(prospect.id, week);
        buckets.entry(week).or_default().0.insert(prospect.id);
    }

    for contract in contracts.iter().filter(|c| c.status.bears_revenue()) {
        if let Some(week) = cohort_week.get(&contract.prospect_id) {
            let bucket = buckets.entry(*week).or_default();
            bucket.1.insert(contract.prospect_id);
            bucket.2 += contract.contract_value;
        }
    }

    let weeks = buckets
        .into_iter()
        .map(|(week_start, (leads, converted, revenue))| TrendPoint {
            week_start,
            leads: leads.len(),
            contracts: converted.len(),
            revenue,
            conversion_rate: percentage(converted.len(), leads.len()),
        })
        .collect();

    TrendSeries {
        window: *window,
        weeks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::domain::{
        ContractId, ContractStatus, ProposalId, ProposalStatus, SourceCategory,
    };
    use chrono::{DateTime, TimeZone, Utc};

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, 10, 0, 0).unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 23).unwrap(),
        )
        .unwrap()
    }

    fn prospect(id: i64, created: DateTime<Utc>) -> Prospect {
        Prospect {
            id: ProspectId(id),
            first_name: "Pat".to_string(),
            last_name: format!("Lead{id}"),
            email: format!("lead{id}@example.com"),
            company_name: None,
            lead_source_id: Some(SourceId(1)),
            lead_score: 50,
            created_at: created,
            is_active: true,
        }
    }

    fn contract(id: i64, prospect: i64, value: f64, signed: DateTime<Utc>) -> Contract {
        Contract {
            id: ContractId(id),
            prospect_id: ProspectId(prospect),
            proposal_id: None,
            contract_value: value,
            monthly_recurring_revenue: value / 12.0,
            start_date: signed.date_naive(),
            status: ContractStatus::Active,
            signed_at: signed,
        }
    }

    #[test]
    fn overview_counts_cohort_progress() {
        let prospects = vec![
            prospect(1, at(3, 3)),
            prospect(2, at(3, 4)),
            prospect(3, at(3, 10)),
            prospect(4, at(3, 11)),
            prospect(5, at(2, 1)),
        ];
        let sources = vec![LeadSource {
            id: SourceId(1),
            name: "Website".to_string(),
            category: SourceCategory::Website,
            attribution_window_days: 30,
            cost_per_lead: 50.0,
            is_active: true,
        }];
        let call = |prospect: i64, status: CallStatus| DiscoveryCall {
            id: prospect,
            prospect_id: ProspectId(prospect),
            scheduled_at: at(3, 12),
            completed_at: None,
            status,
        };
        let calls = vec![
            call(1, CallStatus::Completed),
            call(2, CallStatus::Completed),
            call(3, CallStatus::NoShow),
            call(5, CallStatus::Completed),
        ];
        let proposal = |prospect: i64, status: ProposalStatus| Proposal {
            id: ProposalId(prospect),
            prospect_id: ProspectId(prospect),
            amount: 10_000.0,
            proposal_date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            status,
            sent_at: None,
        };
        let proposals = vec![
            proposal(1, ProposalStatus::Accepted),
            proposal(2, ProposalStatus::Draft),
        ];
        let contracts = vec![
            contract(1, 1, 12_000.0, at(3, 13)),
            contract(2, 5, 99_000.0, at(3, 14)),
        ];

        let overview =
            overview_metrics(&window(), &prospects, &sources, &calls, &proposals, &contracts);

        assert_eq!(overview.total_leads, 4);
        assert_eq!(overview.discovery_calls_scheduled, 3);
        assert_eq!(overview.discovery_calls_completed, 2);
        assert_eq!(overview.proposals_sent, 1);
        assert_eq!(overview.contracts_signed, 1);
        assert!((overview.total_revenue - 12_000.0).abs() < f64::EPSILON);
        assert_eq!(overview.avg_sales_cycle_days, Some(10.0));
        assert!((overview.overall_conversion_rate - 25.0).abs() < f64::EPSILON);
        assert!((overview.discovery_to_proposal_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(overview.cost_per_acquisition, Some(200.0));
    }

    #[test]
    fn empty_window_is_flagged_not_failed() {
        let overview = overview_metrics(&window(), &[], &[], &[], &[], &[]);
        assert!(overview.is_empty());
        assert_eq!(overview.overall_conversion_rate, 0.0);
        assert_eq!(overview.cost_per_acquisition, None);
    }

    #[test]
    fn weeks_start_on_monday_and_are_zero_filled() {
        assert_eq!(
            week_start(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()),
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
        );

        let prospects = vec![prospect(1, at(3, 4)), prospect(2, at(3, 5)), prospect(3, at(3, 20))];
        let contracts = vec![contract(1, 2, 5_000.0, at(4, 2))];
        let trends = weekly_trends(&window(), &prospects, &contracts);

        let counts: Vec<(usize, usize)> =
            trends.weeks.iter().map(|w| (w.leads, w.contracts)).collect();
        assert_eq!(counts, vec![(2, 1), (0, 0), (1, 0)]);
        assert!((trends.weeks[0].conversion_rate - 50.0).abs() < f64::EPSILON);
        assert!((trends.weeks[0].revenue - 5_000.0).abs() < f64::EPSILON);
    }
}
