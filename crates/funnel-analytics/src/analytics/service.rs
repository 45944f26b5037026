use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{debug, info};

use super::aggregator::{aggregate_funnel, FunnelAggregate};
use super::attribution::{AttributionBreakdown, AttributionEngine, AttributionError, AttributionModel};
use super::bottleneck::{BottleneckDetector, BottleneckReport};
use super::domain::{
    Contract, DateWindow, DiscoveryCall, DomainError, JourneyEntry, LeadSource, Proposal,
    Prospect, ProspectId, SourceId, StageCatalog, Touchpoint,
};
use super::report::views::{
    source_highlights, DashboardView, Insight, OverviewView, SeverityCounts,
};
use super::report::{
    generate_insights, overview_metrics, weekly_trends, InsightInputs, OverviewMetrics, TrendSeries,
};
use super::sources::{source_performance, SourcePerformance};
use crate::config::AnalyticsConfig;
use crate::store::{ContractFilter, FunnelRepository, JourneyFilter, ProspectFilter, RepositoryError};

const TOP_SOURCE_LIMIT: usize = 5;

/// Immutable records backing one request.
struct FunnelSnapshot {
    window: DateWindow,
    catalog: StageCatalog,
    sources: Vec<LeadSource>,
    /// Prospects created inside the window.
    cohort: Vec<Prospect>,
    /// Full history of every prospect active in the window.
    journey: Vec<JourneyEntry>,
    calls: Vec<DiscoveryCall>,
    proposals: Vec<Proposal>,
    /// Contracts signed in the window plus every contract of the cohort.
    contracts: Vec<Contract>,
    /// Originating touch followed by recorded touches, per contracted prospect.
    touches: HashMap<ProspectId, Vec<Touchpoint>>,
}

impl FunnelSnapshot {
    fn contracts_signed_in_window(&self) -> Vec<Contract> {
        self.contracts
            .iter()
            .filter(|contract| self.window.contains(contract.signed_at))
            .cloned()
            .collect()
    }

    fn leads_by_source(&self) -> HashMap<SourceId, usize> {
        let mut counts = HashMap::new();
        for source_id in self.cohort.iter().filter_map(|prospect| prospect.lead_source_id) {
            *counts.entry(source_id).or_insert(0) += 1;
        }
        counts
    }
}

/// Service assembling dashboard views from repository snapshots.
pub struct FunnelAnalyticsService<R> {
    repository: Arc<R>,
    config: AnalyticsConfig,
}

impl<R> FunnelAnalyticsService<R>
where
    R: FunnelRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: AnalyticsConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn default_model(&self) -> AttributionModel {
        self.config.default_model
    }

    fn load_snapshot(&self, window: DateWindow) -> Result<FunnelSnapshot, AnalyticsError> {
        let repository = &self.repository;
        let catalog = StageCatalog::new(repository.stages()?)?;
        let sources = repository.lead_sources(false)?;
        let cohort = repository.prospects(&ProspectFilter::created_within(window))?;
        let cohort_ids: Vec<ProspectId> = cohort.iter().map(|prospect| prospect.id).collect();

        let active: BTreeSet<ProspectId> = repository
            .journey_entries(&JourneyFilter::overlapping(window))?
            .into_iter()
            .map(|entry| entry.prospect_id)
            .collect();
        let journey = repository.journey_entries(&JourneyFilter::prospects(active.into_iter().collect()))?;

        let calls = repository.discovery_calls(&cohort_ids)?;
        let proposals = repository.proposals(&cohort_ids)?;

        let mut contracts: BTreeMap<_, Contract> = BTreeMap::new();
        let signed = repository.contracts(&ContractFilter {
            signed_within: Some(window),
            prospects: None,
        })?;
        let attributed_ids: BTreeSet<ProspectId> =
            signed.iter().map(|contract| contract.prospect_id).collect();
        let cohort_contracts = repository.contracts(&ContractFilter {
            signed_within: None,
            prospects: Some(cohort_ids.clone()),
        })?;
        for contract in signed.into_iter().chain(cohort_contracts) {
            contracts.insert(contract.id, contract);
        }

        let touches = self.touch_histories(&cohort, attributed_ids)?;

        debug!(
            start = %window.start,
            end = %window.end,
            prospects = cohort.len(),
            journey_entries = journey.len(),
            contracts = contracts.len(),
            "loaded funnel snapshot"
        );

        Ok(FunnelSnapshot {
            window,
            catalog,
            sources,
            cohort,
            journey,
            calls,
            proposals,
            contracts: contracts.into_values().collect(),
            touches,
        })
    }

    fn touch_histories(
        &self,
        cohort: &[Prospect],
        prospect_ids: BTreeSet<ProspectId>,
    ) -> Result<HashMap<ProspectId, Vec<Touchpoint>>, AnalyticsError> {
        let known: HashMap<ProspectId, &Prospect> =
            cohort.iter().map(|prospect| (prospect.id, prospect)).collect();
        let missing: Vec<ProspectId> = prospect_ids
            .iter()
            .filter(|id| !known.contains_key(id))
            .copied()
            .collect();
        let fetched = if missing.is_empty() {
            Vec::new()
        } else {
            self.repository.prospects(&ProspectFilter::ids(missing))?
        };

        let ids: Vec<ProspectId> = prospect_ids.into_iter().collect();
        let mut histories: HashMap<ProspectId, Vec<Touchpoint>> = HashMap::new();
        for prospect in known
            .values()
            .copied()
            .chain(fetched.iter())
            .filter(|prospect| ids.contains(&prospect.id))
        {
            histories.entry(prospect.id).or_default().push(Touchpoint {
                prospect_id: prospect.id,
                source_id: prospect.lead_source_id,
                touched_at: prospect.created_at,
            });
        }
        for touch in self.repository.touchpoints(&ids)? {
            histories.entry(touch.prospect_id).or_default().push(touch);
        }
        Ok(histories)
    }

    fn aggregate(&self, snapshot: &FunnelSnapshot) -> FunnelAggregate {
        aggregate_funnel(&snapshot.window, &snapshot.catalog, &snapshot.journey)
    }

    fn detect(&self, snapshot: &FunnelSnapshot, aggregate: &FunnelAggregate, as_of: DateTime<Utc>) -> BottleneckReport {
        BottleneckDetector::new(self.config.bottleneck.clone()).detect(
            aggregate,
            &snapshot.catalog,
            &snapshot.journey,
            as_of,
        )
    }

    fn attribute(&self, snapshot: &FunnelSnapshot, model: AttributionModel) -> AttributionBreakdown {
        AttributionEngine::new(self.config.attribution.clone(), &snapshot.sources).breakdown(
            &snapshot.contracts_signed_in_window(),
            &snapshot.touches,
            model,
        )
    }

    fn rank_sources(&self, snapshot: &FunnelSnapshot, breakdown: &AttributionBreakdown) -> Vec<SourcePerformance> {
        source_performance(&snapshot.sources, &snapshot.leads_by_source(), breakdown)
    }

    fn summarize(&self, snapshot: &FunnelSnapshot) -> OverviewMetrics {
        overview_metrics(
            &snapshot.window,
            &snapshot.cohort,
            &snapshot.sources,
            &snapshot.calls,
            &snapshot.proposals,
            &snapshot.contracts,
        )
    }

    /// Headline metrics with bottleneck counts and the top sources by revenue.
    pub fn overview(&self, window: DateWindow, as_of: DateTime<Utc>) -> Result<OverviewView, AnalyticsError> {
        let snapshot = self.load_snapshot(window)?;
        let metrics = self.summarize(&snapshot);
        let bottlenecks = self.detect(&snapshot, &self.aggregate(&snapshot), as_of);
        let breakdown = self.attribute(&snapshot, self.config.default_model);
        let sources = self.rank_sources(&snapshot, &breakdown);

        Ok(OverviewView {
            is_empty: metrics.is_empty(),
            metrics,
            bottlenecks: SeverityCounts::from_report(&bottlenecks),
            prospects_stuck: bottlenecks.total_stuck(),
            top_sources: source_highlights(&sources, TOP_SOURCE_LIMIT),
        })
    }

    pub fn funnel_breakdown(&self, window: DateWindow) -> Result<FunnelAggregate, AnalyticsError> {
        let snapshot = self.load_snapshot(window)?;
        Ok(self.aggregate(&snapshot))
    }

    /// Ranked source table, credited with the configured default model.
    pub fn source_performance(&self, window: DateWindow) -> Result<Vec<SourcePerformance>, AnalyticsError> {
        let snapshot = self.load_snapshot(window)?;
        let breakdown = self.attribute(&snapshot, self.config.default_model);
        Ok(self.rank_sources(&snapshot, &breakdown))
    }

    pub fn bottlenecks(&self, window: DateWindow, as_of: DateTime<Utc>) -> Result<BottleneckReport, AnalyticsError> {
        let snapshot = self.load_snapshot(window)?;
        let aggregate = self.aggregate(&snapshot);
        Ok(self.detect(&snapshot, &aggregate, as_of))
    }

    pub fn attribution(
        &self,
        window: DateWindow,
        model: AttributionModel,
    ) -> Result<AttributionBreakdown, AnalyticsError> {
        let snapshot = self.load_snapshot(window)?;
        Ok(self.attribute(&snapshot, model))
    }

    pub fn trends(&self, window: DateWindow) -> Result<TrendSeries, AnalyticsError> {
        let snapshot = self.load_snapshot(window)?;
        Ok(weekly_trends(&snapshot.window, &snapshot.cohort, &snapshot.contracts))
    }

    pub fn insights(&self, window: DateWindow, as_of: DateTime<Utc>) -> Result<Vec<Insight>, AnalyticsError> {
        Ok(self.dashboard(window, self.config.default_model, as_of)?.insights)
    }

    /// Every view computed from a single snapshot.
    pub fn dashboard(
        &self,
        window: DateWindow,
        model: AttributionModel,
        as_of: DateTime<Utc>,
    ) -> Result<DashboardView, AnalyticsError> {
        let snapshot = self.load_snapshot(window)?;
        let overview = self.summarize(&snapshot);
        let funnel = self.aggregate(&snapshot);
        let bottlenecks = self.detect(&snapshot, &funnel, as_of);
        let attribution = self.attribute(&snapshot, model);
        let sources = self.rank_sources(&snapshot, &attribution);
        let trends = weekly_trends(&snapshot.window, &snapshot.cohort, &snapshot.contracts);
        let insights = generate_insights(
            &InsightInputs {
                overview: &overview,
                bottlenecks: &bottlenecks,
                sources: &sources,
                attribution: &attribution,
                stuck_multiplier: self.config.bottleneck.stuck_multiplier,
            },
            &self.config.insights,
        );

        info!(
            start = %window.start,
            end = %window.end,
            model = model.as_str(),
            findings = bottlenecks.findings.len(),
            insights = insights.len(),
            "dashboard assembled"
        );

        Ok(DashboardView {
            window,
            model,
            is_empty: overview.is_empty() && funnel.is_empty(),
            overview,
            funnel,
            sources,
            bottlenecks,
            attribution,
            trends,
            insights,
        })
    }
}

/// Reference instant for stuck detection: now, or the end of a window that
/// already closed.
pub fn as_of_for(window: &DateWindow, now: DateTime<Utc>) -> DateTime<Utc> {
    let window_close = (window.end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
    now.min(window_close)
}

/// Error raised by the analytics service.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Attribution(#[from] AttributionError),
}

impl AnalyticsError {
    /// Whether the caller supplied the bad input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalyticsError::Attribution(AttributionError::InvalidModel(_))
                | AnalyticsError::Domain(DomainError::InvalidWindow { .. })
                | AnalyticsError::Domain(DomainError::UnknownToken { .. })
        )
    }
}
