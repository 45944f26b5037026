mod memory;
mod sqlite;

pub use memory::InMemoryFunnelStore;
pub use sqlite::SqliteFunnelStore;

use crate::analytics::domain::{
    Contract, DateWindow, DiscoveryCall, FunnelStage, JourneyEntry, LeadSource, Proposal,
    Prospect, ProspectId, Touchpoint,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProspectFilter {
    /// Prospects whose `created_at` date falls inside the window.
    pub created_within: Option<DateWindow>,
    pub ids: Option<Vec<ProspectId>>,
}

impl ProspectFilter {
    pub fn created_within(window: DateWindow) -> Self {
        Self {
            created_within: Some(window),
            ..Self::default()
        }
    }

    pub fn ids(ids: Vec<ProspectId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn matches(&self, prospect: &Prospect) -> bool {
        self.created_within
            .map(|window| window.contains(prospect.created_at))
            .unwrap_or(true)
            && self
                .ids
                .as_ref()
                .map(|ids| ids.contains(&prospect.id))
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JourneyFilter {
    /// Entries overlapping the window.
    pub overlapping: Option<DateWindow>,
    pub prospects: Option<Vec<ProspectId>>,
}

impl JourneyFilter {
    pub fn overlapping(window: DateWindow) -> Self {
        Self {
            overlapping: Some(window),
            ..Self::default()
        }
    }

    pub fn prospects(ids: Vec<ProspectId>) -> Self {
        Self {
            prospects: Some(ids),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &JourneyEntry) -> bool {
        self.overlapping
            .map(|window| entry.overlaps(&window))
            .unwrap_or(true)
            && self
                .prospects
                .as_ref()
                .map(|ids| ids.contains(&entry.prospect_id))
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractFilter {
    pub signed_within: Option<DateWindow>,
    pub prospects: Option<Vec<ProspectId>>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.signed_within
            .map(|window| window.contains(contract.signed_at))
            .unwrap_or(true)
            && self
                .prospects
                .as_ref()
                .map(|ids| ids.contains(&contract.prospect_id))
                .unwrap_or(true)
    }
}

/// Read-only access to the funnel's relational records.
pub trait FunnelRepository: Send + Sync {
    fn lead_sources(&self, active_only: bool) -> Result<Vec<LeadSource>, RepositoryError>;
    fn prospects(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>, RepositoryError>;
    fn stages(&self) -> Result<Vec<FunnelStage>, RepositoryError>;
    fn journey_entries(&self, filter: &JourneyFilter) -> Result<Vec<JourneyEntry>, RepositoryError>;
    fn discovery_calls(&self, prospects: &[ProspectId]) -> Result<Vec<DiscoveryCall>, RepositoryError>;
    fn proposals(&self, prospects: &[ProspectId]) -> Result<Vec<Proposal>, RepositoryError>;
    fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, RepositoryError>;
    /// Touches beyond each prospect's originating source.
    fn touchpoints(&self, prospects: &[ProspectId]) -> Result<Vec<Touchpoint>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt {table} row {id}: {reason}")]
    Corrupt {
        table: &'static str,
        id: i64,
        reason: String,
    },
}
