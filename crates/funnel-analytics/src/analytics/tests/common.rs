use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::analytics::domain::{
    Contract, ContractId, ContractStatus, DateWindow, FunnelStage, JourneyEntry, LeadSource,
    Prospect, ProspectId, SourceCategory, SourceId, StageId, Touchpoint,
};
use crate::analytics::{analytics_router, FunnelAnalyticsService};
use crate::config::AnalyticsConfig;
use crate::store::{
    ContractFilter, FunnelRepository, InMemoryFunnelStore, JourneyFilter, ProspectFilter,
    RepositoryError,
};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn quarter() -> DateWindow {
    DateWindow::new(date(2025, 1, 1), date(2025, 3, 31)).expect("valid window")
}

pub(super) fn quarter_close() -> DateTime<Utc> {
    at(2025, 3, 31)
}

pub(super) fn source(id: i64, name: &str, category: SourceCategory, cost_per_lead: f64) -> LeadSource {
    LeadSource {
        id: SourceId(id),
        name: name.to_string(),
        category,
        attribution_window_days: 90,
        cost_per_lead,
        is_active: true,
    }
}

pub(super) fn prospect(id: i64, source: i64, created_at: DateTime<Utc>) -> Prospect {
    Prospect {
        id: ProspectId(id),
        first_name: format!("Prospect{id}"),
        last_name: "Example".to_string(),
        email: format!("prospect{id}@example.com"),
        company_name: None,
        lead_source_id: Some(SourceId(source)),
        lead_score: 50,
        created_at,
        is_active: true,
    }
}

pub(super) fn entry(
    id: i64,
    prospect: i64,
    stage: i64,
    entered_at: DateTime<Utc>,
    exited_at: Option<DateTime<Utc>>,
) -> JourneyEntry {
    JourneyEntry {
        id,
        prospect_id: ProspectId(prospect),
        stage_id: StageId(stage),
        entered_at,
        exited_at,
    }
}

pub(super) fn contract(id: i64, prospect: i64, value: f64, signed_at: DateTime<Utc>) -> Contract {
    Contract {
        id: ContractId(id),
        prospect_id: ProspectId(prospect),
        proposal_id: None,
        contract_value: value,
        monthly_recurring_revenue: value / 12.0,
        start_date: signed_at.date_naive(),
        status: ContractStatus::Active,
        signed_at,
    }
}

/// Referral, LinkedIn and website sources with nine Q1 2025 leads and three
/// signed contracts worth 130k in total.
pub(super) fn seeded_store() -> InMemoryFunnelStore {
    let store = InMemoryFunnelStore::new();
    store
        .add_source(source(1, "Client Referrals", SourceCategory::Referral, 0.0))
        .expect("source stored");
    store
        .add_source(source(2, "LinkedIn Outreach", SourceCategory::Linkedin, 150.0))
        .expect("source stored");
    store
        .add_source(source(3, "Company Website", SourceCategory::Website, 40.0))
        .expect("source stored");

    let mut entry_id = 0;
    let mut next_entry = || {
        entry_id += 1;
        entry_id
    };

    for id in 1..=5 {
        let created = at(2025, 1, 5 + id as u32);
        store.add_prospect(prospect(id, 1, created)).expect("prospect stored");
        if id <= 3 {
            let qualified = at(2025, 1, 6 + id as u32);
            store
                .add_journey_entry(entry(next_entry(), id, 1, created, Some(qualified)))
                .expect("entry stored");
            let scheduled_exit = (id <= 2).then(|| at(2025, 1, 10 + id as u32));
            store
                .add_journey_entry(entry(next_entry(), id, 2, qualified, scheduled_exit))
                .expect("entry stored");
            if let Some(won_at) = scheduled_exit {
                store
                    .add_journey_entry(entry(next_entry(), id, 7, won_at, None))
                    .expect("entry stored");
            }
        } else {
            let lost_at = at(2025, 1, 7 + id as u32);
            store
                .add_journey_entry(entry(next_entry(), id, 1, created, Some(lost_at)))
                .expect("entry stored");
            store
                .add_journey_entry(entry(next_entry(), id, 8, lost_at, None))
                .expect("entry stored");
        }
    }

    for id in 6..=9 {
        let created = at(2025, 1, 15);
        store.add_prospect(prospect(id, 2, created)).expect("prospect stored");
        let exited = (id == 6).then(|| at(2025, 1, 16));
        store
            .add_journey_entry(entry(next_entry(), id, 1, created, exited))
            .expect("entry stored");
        if let Some(won_at) = exited {
            store
                .add_journey_entry(entry(next_entry(), id, 7, won_at, None))
                .expect("entry stored");
        }
    }

    store
        .add_contract(contract(1, 1, 60_000.0, at(2025, 2, 20)))
        .expect("contract stored");
    store
        .add_contract(contract(2, 2, 40_000.0, at(2025, 3, 5)))
        .expect("contract stored");
    store
        .add_contract(contract(3, 6, 30_000.0, at(2025, 3, 10)))
        .expect("contract stored");
    store
        .add_touchpoint(Touchpoint {
            prospect_id: ProspectId(6),
            source_id: Some(SourceId(3)),
            touched_at: at(2025, 2, 1),
        })
        .expect("touch stored");

    store
}

pub(super) fn build_service<R>(repository: R) -> Arc<FunnelAnalyticsService<R>>
where
    R: FunnelRepository + 'static,
{
    Arc::new(FunnelAnalyticsService::new(
        Arc::new(repository),
        AnalyticsConfig::default(),
    ))
}

pub(super) fn seeded_router() -> axum::Router {
    analytics_router(build_service(seeded_store()))
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body collected");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status, "unexpected status");
}

pub(super) struct UnavailableRepository;

impl UnavailableRepository {
    fn failure<T>() -> Result<T, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl FunnelRepository for UnavailableRepository {
    fn lead_sources(&self, _active_only: bool) -> Result<Vec<LeadSource>, RepositoryError> {
        Self::failure()
    }

    fn prospects(&self, _filter: &ProspectFilter) -> Result<Vec<Prospect>, RepositoryError> {
        Self::failure()
    }

    fn stages(&self) -> Result<Vec<FunnelStage>, RepositoryError> {
        Self::failure()
    }

    fn journey_entries(&self, _filter: &JourneyFilter) -> Result<Vec<JourneyEntry>, RepositoryError> {
        Self::failure()
    }

    fn discovery_calls(
        &self,
        _prospects: &[ProspectId],
    ) -> Result<Vec<crate::analytics::domain::DiscoveryCall>, RepositoryError> {
        Self::failure()
    }

    fn proposals(
        &self,
        _prospects: &[ProspectId],
    ) -> Result<Vec<crate::analytics::domain::Proposal>, RepositoryError> {
        Self::failure()
    }

    fn contracts(&self, _filter: &ContractFilter) -> Result<Vec<Contract>, RepositoryError> {
        Self::failure()
    }

    fn touchpoints(&self, _prospects: &[ProspectId]) -> Result<Vec<Touchpoint>, RepositoryError> {
        Self::failure()
    }
}
