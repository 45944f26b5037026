use super::{ContractFilter, FunnelRepository, JourneyFilter, ProspectFilter, RepositoryError};
use crate::analytics::domain::{
    Contract, DiscoveryCall, FunnelStage, JourneyEntry, LeadSource, Proposal, Prospect,
    ProspectId, StageCatalog, Touchpoint,
};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct FunnelRecords {
    sources: Vec<LeadSource>,
    prospects: Vec<Prospect>,
    stages: Vec<FunnelStage>,
    journey: Vec<JourneyEntry>,
    calls: Vec<DiscoveryCall>,
    proposals: Vec<Proposal>,
    contracts: Vec<Contract>,
    touches: Vec<Touchpoint>,
}

/// Vector-backed repository for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFunnelStore {
    records: Arc<Mutex<FunnelRecords>>,
}

impl InMemoryFunnelStore {
    /// Empty store preloaded with the standard stage catalog.
    pub fn new() -> Self {
        Self::with_stages(StageCatalog::standard().stages().to_vec())
    }

    pub fn with_stages(stages: Vec<FunnelStage>) -> Self {
        let store = Self::default();
        if let Ok(mut records) = store.records.lock() {
            records.stages = stages;
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, FunnelRecords>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("in-memory store mutex poisoned".to_string()))
    }

    pub fn add_source(&self, source: LeadSource) -> Result<(), RepositoryError> {
        self.lock()?.sources.push(source);
        Ok(())
    }

    pub fn add_prospect(&self, prospect: Prospect) -> Result<(), RepositoryError> {
        self.lock()?.prospects.push(prospect);
        Ok(())
    }

    pub fn add_journey_entry(&self, entry: JourneyEntry) -> Result<(), RepositoryError> {
        self.lock()?.journey.push(entry);
        Ok(())
    }

    pub fn add_discovery_call(&self, call: DiscoveryCall) -> Result<(), RepositoryError> {
        self.lock()?.calls.push(call);
        Ok(())
    }

    pub fn add_proposal(&self, proposal: Proposal) -> Result<(), RepositoryError> {
        self.lock()?.proposals.push(proposal);
        Ok(())
    }

    pub fn add_contract(&self, contract: Contract) -> Result<(), RepositoryError> {
        self.lock()?.contracts.push(contract);
        Ok(())
    }

    pub fn add_touchpoint(&self, touch: Touchpoint) -> Result<(), RepositoryError> {
        self.lock()?.touches.push(touch);
        Ok(())
    }
}

impl FunnelRepository for InMemoryFunnelStore {
    fn lead_sources(&self, active_only: bool) -> Result<Vec<LeadSource>, RepositoryError> {
        let records = self.lock()?;
        Ok(records
            .sources
            .iter()
            .filter(|source| !active_only || source.is_active)
            .cloned()
            .collect())
    }

    fn prospects(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>, RepositoryError> {
        let records = self.lock()?;
        Ok(records
            .prospects
            .iter()
            .filter(|prospect| filter.matches(prospect))
            .cloned()
            .collect())
    }

    fn stages(&self) -> Result<Vec<FunnelStage>, RepositoryError> {
        Ok(self.lock()?.stages.clone())
    }

    fn journey_entries(&self, filter: &JourneyFilter) -> Result<Vec<JourneyEntry>, RepositoryError> {
        let records = self.lock()?;
        Ok(records
            .journey
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    fn discovery_calls(&self, prospects: &[ProspectId]) -> Result<Vec<DiscoveryCall>, RepositoryError> {
        let records = self.lock()?;
        Ok(records
            .calls
            .iter()
            .filter(|call| prospects.contains(&call.prospect_id))
            .cloned()
            .collect())
    }

    fn proposals(&self, prospects: &[ProspectId]) -> Result<Vec<Proposal>, RepositoryError> {
        let records = self.lock()?;
        Ok(records
            .proposals
            .iter()
            .filter(|proposal| prospects.contains(&proposal.prospect_id))
            .cloned()
            .collect())
    }

    fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, RepositoryError> {
        let records = self.lock()?;
        Ok(records
            .contracts
            .iter()
            .filter(|contract| filter.matches(contract))
            .cloned()
            .collect())
    }

    fn touchpoints(&self, prospects: &[ProspectId]) -> Result<Vec<Touchpoint>, RepositoryError> {
        let records = self.lock()?;
        Ok(records
            .touches
            .iter()
            .filter(|touch| prospects.contains(&touch.prospect_id))
            .cloned()
            .collect())
    }
}
