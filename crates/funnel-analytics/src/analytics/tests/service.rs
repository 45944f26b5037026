use super::common::*;

use crate::analytics::attribution::AttributedSource;
use crate::analytics::domain::{DateWindow, SourceId, StageId};
use crate::analytics::report::views::{InsightCategory, InsightPriority};
use crate::analytics::{as_of_for, AnalyticsError, AttributionModel, Roi};
use crate::store::RepositoryError;

#[test]
fn referral_source_reports_undefined_roi_and_revenue_per_lead() {
    let service = build_service(seeded_store());

    let rows = service.source_performance(quarter()).expect("sources computed");
    let referral = rows
        .iter()
        .find(|row| row.source_id == SourceId(1))
        .expect("referral row");

    assert_eq!(referral.lead_count, 5);
    assert_eq!(referral.contracts_count, 2);
    assert!((referral.attributed_revenue - 100_000.0).abs() < 1e-6);
    assert_eq!(referral.roi, Roi::Undefined);
    assert!((referral.revenue_per_lead - 20_000.0).abs() < 1e-6);
    assert!((referral.conversion_rate - 40.0).abs() < 1e-9);
    assert_eq!(referral.cost_per_acquisition, Some(0.0));
}

#[test]
fn sources_rank_defined_roi_before_free_channels() {
    let service = build_service(seeded_store());

    let rows = service.source_performance(quarter()).expect("sources computed");
    let order: Vec<i64> = rows.iter().map(|row| row.source_id.0).collect();

    assert_eq!(order, vec![2, 1, 3]);
    assert!(matches!(rows[0].roi, Roi::Defined(roi) if (roi - 2_400.0).abs() < 1e-6));
}

#[test]
fn linear_attribution_splits_multi_touch_contract() {
    let service = build_service(seeded_store());

    let breakdown = service
        .attribution(quarter(), AttributionModel::Linear)
        .expect("attribution computed");

    assert_eq!(breakdown.contracts_attributed, 3);
    assert!((breakdown.total_revenue - 130_000.0).abs() < 1e-6);
    let linkedin = breakdown.source(SourceId(2)).expect("linkedin credited");
    let website = breakdown.source(SourceId(3)).expect("website credited");
    assert_eq!(linkedin.attributed_cents, 1_500_000);
    assert_eq!(website.attributed_cents, 1_500_000);
    assert_eq!(breakdown.sources[0].source, AttributedSource::Source(SourceId(1)));
}

#[test]
fn first_touch_credits_originating_source_only() {
    let service = build_service(seeded_store());

    let breakdown = service
        .attribution(quarter(), AttributionModel::FirstTouch)
        .expect("attribution computed");

    assert!(breakdown.source(SourceId(3)).is_none());
    let linkedin = breakdown.source(SourceId(2)).expect("linkedin credited");
    assert!((linkedin.attributed_revenue - 30_000.0).abs() < 1e-6);
}

#[test]
fn funnel_breakdown_counts_stage_transitions() {
    let service = build_service(seeded_store());

    let funnel = service.funnel_breakdown(quarter()).expect("funnel computed");
    let lead = funnel.stage(StageId(1)).expect("lead stage");
    let scheduled = funnel.stage(StageId(2)).expect("scheduled stage");

    assert_eq!(funnel.total_prospects, 9);
    assert_eq!(lead.prospects_entered, 9);
    assert_eq!(lead.prospects_converted, 4);
    assert_eq!(lead.prospects_dropped, 2);
    assert_eq!(lead.open_entries, 3);
    assert_eq!(scheduled.prospects_entered, 3);
    assert_eq!(scheduled.prospects_converted, 2);
    assert_eq!(scheduled.avg_duration_days, Some(4.0));
}

#[test]
fn bottlenecks_flag_slow_stage_and_stuck_prospects() {
    let service = build_service(seeded_store());

    let report = service
        .bottlenecks(quarter(), quarter_close())
        .expect("bottlenecks computed");

    let scheduled = report
        .findings
        .iter()
        .find(|finding| finding.stage_id == StageId(2))
        .expect("discovery scheduling flagged");
    assert_eq!(scheduled.duration_overrun_ratio, Some(4.0 / 3.0));
    assert_eq!(scheduled.prospects_stuck, 1);

    assert!(report
        .findings
        .iter()
        .all(|finding| finding.stage_id != StageId(7) && finding.stage_id != StageId(8)));
    assert_eq!(report.total_stuck(), 4);
}

#[test]
fn overview_summarizes_cohort() {
    let service = build_service(seeded_store());

    let overview = service
        .overview(quarter(), quarter_close())
        .expect("overview computed");

    assert!(!overview.is_empty);
    assert_eq!(overview.metrics.total_leads, 9);
    assert_eq!(overview.metrics.contracts_signed, 3);
    assert!((overview.metrics.total_revenue - 130_000.0).abs() < 1e-6);
    assert!((overview.metrics.total_acquisition_cost - 600.0).abs() < 1e-6);
    assert_eq!(overview.metrics.cost_per_acquisition, Some(200.0));
    assert_eq!(overview.prospects_stuck, 4);
    assert_eq!(overview.top_sources[0].source_name, "Client Referrals");
    assert_eq!(overview.top_sources.len(), 3);
}

#[test]
fn trends_zero_fill_quarter_weeks() {
    let service = build_service(seeded_store());

    let trends = service.trends(quarter()).expect("trends computed");

    assert!(trends.weeks.len() >= 13);
    let leads: usize = trends.weeks.iter().map(|week| week.leads).sum();
    assert_eq!(leads, 9);
    assert!(trends.weeks.iter().any(|week| week.leads == 0));
}

#[test]
fn dashboard_flags_revenue_concentration() {
    let service = build_service(seeded_store());

    let dashboard = service
        .dashboard(quarter(), AttributionModel::Linear, quarter_close())
        .expect("dashboard computed");

    assert!(!dashboard.is_empty);
    assert_eq!(dashboard.model, AttributionModel::Linear);
    let concentration = dashboard
        .insights
        .iter()
        .find(|insight| insight.category == InsightCategory::Concentration)
        .expect("concentration insight");
    assert_eq!(concentration.priority, InsightPriority::High);
    assert!(dashboard
        .insights
        .windows(2)
        .all(|pair| pair[0].priority <= pair[1].priority));
}

#[test]
fn empty_window_yields_monitoring_insight() {
    let service = build_service(seeded_store());
    let window = DateWindow::new(date(2024, 6, 1), date(2024, 6, 30)).expect("valid window");

    let dashboard = service
        .dashboard(window, AttributionModel::PositionBased, at(2024, 6, 30))
        .expect("dashboard computed");

    assert!(dashboard.is_empty);
    assert!(dashboard.funnel.stages.iter().all(|stage| stage.prospects_entered == 0));
    assert!(dashboard.attribution.is_empty());
    assert!(dashboard
        .insights
        .iter()
        .any(|insight| insight.category == InsightCategory::Monitoring));
}

#[test]
fn repository_failure_is_not_a_client_error() {
    let service = build_service(UnavailableRepository);

    let error = service
        .funnel_breakdown(quarter())
        .expect_err("repository offline");

    assert!(matches!(
        error,
        AnalyticsError::Repository(RepositoryError::Unavailable(_))
    ));
    assert!(!error.is_client_error());
}

#[test]
fn as_of_stops_at_closed_window() {
    let window = quarter();

    assert_eq!(as_of_for(&window, at(2025, 6, 1)), at(2025, 4, 1) - chrono::Duration::hours(12));
    assert_eq!(as_of_for(&window, at(2025, 2, 1)), at(2025, 2, 1));
}
