//! Revenue attribution behaviour exercised through the public engine API.

mod common {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use funnel_analytics::analytics::domain::{
        Contract, ContractId, ContractStatus, LeadSource, ProspectId, SourceCategory, SourceId,
        Touchpoint,
    };

    pub fn signed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    pub fn sources() -> Vec<LeadSource> {
        [
            (1, "LinkedIn", SourceCategory::Linkedin),
            (2, "Referral", SourceCategory::Referral),
            (3, "Webinar", SourceCategory::Event),
            (4, "Website", SourceCategory::Website),
        ]
        .into_iter()
        .map(|(id, name, category)| LeadSource {
            id: SourceId(id),
            name: name.to_string(),
            category,
            attribution_window_days: 120,
            cost_per_lead: 25.0,
            is_active: true,
        })
        .collect()
    }

    pub fn contract(value: f64) -> Contract {
        Contract {
            id: ContractId(7),
            prospect_id: ProspectId(1),
            proposal_id: None,
            contract_value: value,
            monthly_recurring_revenue: value / 12.0,
            start_date: signed_at().date_naive(),
            status: ContractStatus::Active,
            signed_at: signed_at(),
        }
    }

    /// Touch `days_before` the signing date.
    pub fn touch(source: i64, days_before: i64) -> Touchpoint {
        Touchpoint {
            prospect_id: ProspectId(1),
            source_id: Some(SourceId(source)),
            touched_at: signed_at() - Duration::days(days_before),
        }
    }

    pub fn journey() -> Vec<Touchpoint> {
        vec![
            touch(1, 60),
            touch(3, 41),
            touch(2, 30),
            touch(3, 12),
            touch(4, 2),
        ]
    }
}

use common::*;
use funnel_analytics::analytics::domain::SourceId;
use funnel_analytics::analytics::{
    attribution::decay_weight, AttributedSource, AttributionEngine, AttributionError,
    AttributionModel, AttributionSettings,
};

fn engine() -> AttributionEngine {
    AttributionEngine::new(AttributionSettings::default(), &sources())
}

#[test]
fn every_model_allocates_the_full_contract_value() {
    let engine = engine();
    for value in [99_999.99, 12_345.67, 0.03, 250_000.0] {
        for model in AttributionModel::ordered() {
            let attribution = engine
                .attribute(&contract(value), &journey(), model)
                .expect("attributable");
            let expected = (value * 100.0).round() as i64;
            assert_eq!(
                attribution.total_cents(),
                expected,
                "{model} leaked cents on {value}"
            );
            assert!(attribution
                .allocations
                .iter()
                .all(|allocation| allocation.amount_cents >= 0));
        }
    }
}

#[test]
fn first_and_last_touch_ignore_input_order() {
    let engine = engine();
    let mut reversed = journey();
    reversed.reverse();

    for model in [AttributionModel::FirstTouch, AttributionModel::LastTouch] {
        let forward = engine
            .attribute(&contract(50_000.0), &journey(), model)
            .expect("attributable");
        let backward = engine
            .attribute(&contract(50_000.0), &reversed, model)
            .expect("attributable");
        assert_eq!(forward.allocations, backward.allocations);
        assert_eq!(forward.allocations.len(), 1);
    }

    let first = engine
        .attribute(&contract(50_000.0), &reversed, AttributionModel::FirstTouch)
        .expect("attributable");
    assert_eq!(first.cents_for(AttributedSource::Source(SourceId(1))), 5_000_000);
    let last = engine
        .attribute(&contract(50_000.0), &reversed, AttributionModel::LastTouch)
        .expect("attributable");
    assert_eq!(last.cents_for(AttributedSource::Source(SourceId(4))), 5_000_000);
}

#[test]
fn linear_splits_equally_across_distinct_sources() {
    let attribution = engine()
        .attribute(&contract(100_000.0), &journey(), AttributionModel::Linear)
        .expect("attributable");

    assert_eq!(attribution.allocations.len(), 4);
    for allocation in &attribution.allocations {
        assert_eq!(allocation.amount_cents, 2_500_000);
    }
}

#[test]
fn time_decay_favours_recent_touches() {
    assert!((decay_weight(0.0, 7.0) - 1.0).abs() < 1e-12);
    assert!((decay_weight(7.0, 7.0) - 0.5).abs() < 1e-12);
    assert!(decay_weight(3.0, 7.0) > decay_weight(10.0, 7.0));

    let attribution = engine()
        .attribute(&contract(80_000.0), &journey(), AttributionModel::TimeDecay)
        .expect("attributable");
    let website = attribution.cents_for(AttributedSource::Source(SourceId(4)));
    let linkedin = attribution.cents_for(AttributedSource::Source(SourceId(1)));
    assert!(website > linkedin);
}

#[test]
fn position_based_gives_single_touch_everything() {
    let attribution = engine()
        .attribute(
            &contract(42_000.0),
            &[touch(2, 5)],
            AttributionModel::PositionBased,
        )
        .expect("attributable");

    assert_eq!(attribution.allocations.len(), 1);
    assert_eq!(attribution.allocations[0].weight, 1.0);
    assert_eq!(attribution.cents_for(AttributedSource::Source(SourceId(2))), 4_200_000);
}

#[test]
fn position_based_weights_first_and_last_touch() {
    let attribution = engine()
        .attribute(&contract(100_000.0), &journey(), AttributionModel::PositionBased)
        .expect("attributable");

    assert_eq!(attribution.cents_for(AttributedSource::Source(SourceId(1))), 4_000_000);
    assert_eq!(attribution.cents_for(AttributedSource::Source(SourceId(4))), 4_000_000);
    // Two middle webinar touches and one referral share the remaining 20%.
    assert_eq!(attribution.cents_for(AttributedSource::Source(SourceId(3))), 1_333_333);
    assert_eq!(attribution.cents_for(AttributedSource::Source(SourceId(2))), 666_667);
}

#[test]
fn missing_touches_fall_back_to_unattributed() {
    let engine = engine();

    let error = engine
        .attribute(&contract(10_000.0), &[], AttributionModel::Linear)
        .expect_err("nothing to credit");
    assert!(matches!(error, AttributionError::NoTouchpoints(_)));

    let fallback = engine
        .attribute_or_unattributed(&contract(10_000.0), &[], AttributionModel::Linear)
        .expect("fallback allocation");
    assert!(fallback.is_unattributed());
    assert_eq!(fallback.cents_for(AttributedSource::Unattributed), 1_000_000);
}

#[test]
fn unknown_model_name_is_rejected() {
    let error = "w_shaped"
        .parse::<AttributionModel>()
        .expect_err("not a model");
    assert_eq!(error, AttributionError::InvalidModel("w_shaped".to_string()));
    assert_eq!(
        "Time_Decay".parse::<AttributionModel>().expect("case insensitive"),
        AttributionModel::TimeDecay
    );
}
