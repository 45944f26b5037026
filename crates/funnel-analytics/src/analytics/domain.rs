use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProspectId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(pub i64);

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Linkedin,
    Referral,
    ColdOutreach,
    Website,
    SocialMedia,
    Event,
    Other,
}

impl SourceCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Referral => "referral",
            Self::ColdOutreach => "cold_outreach",
            Self::Website => "website",
            Self::SocialMedia => "social_media",
            Self::Event => "event",
            Self::Other => "other",
        }
    }
}

impl FromStr for SourceCategory {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Self::Linkedin),
            "referral" => Ok(Self::Referral),
            "cold_outreach" => Ok(Self::ColdOutreach),
            "website" => Ok(Self::Website),
            "social_media" => Ok(Self::SocialMedia),
            "event" => Ok(Self::Event),
            "other" => Ok(Self::Other),
            other => Err(DomainError::UnknownToken {
                kind: "source category",
                token: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSource {
    pub id: SourceId,
    pub name: String,
    pub category: SourceCategory,
    pub attribution_window_days: u32,
    pub cost_per_lead: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: ProspectId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company_name: Option<String>,
    pub lead_source_id: Option<SourceId>,
    pub lead_score: i32,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Terminal behaviour of a funnel stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Open,
    Won,
    Lost,
}

impl StageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl FromStr for StageKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            other => Err(DomainError::UnknownToken {
                kind: "stage kind",
                token: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub id: StageId,
    pub name: String,
    pub order: u32,
    pub expected_duration_days: f64,
    pub description: String,
    pub kind: StageKind,
}

/// Ordered, validated set of funnel stages.
#[derive(Debug, Clone, Serialize)]
pub struct StageCatalog {
    stages: Vec<FunnelStage>,
}

impl StageCatalog {
    /// Stage orders must be unique and contiguous from 1, with a single Lost
    /// stage holding the highest order.
    pub fn new(mut stages: Vec<FunnelStage>) -> Result<Self, DomainError> {
        if stages.is_empty() {
            return Err(DomainError::InvalidCatalog(
                "at least one stage is required".to_string(),
            ));
        }

        stages.sort_by_key(|stage| stage.order);
        for (index, stage) in stages.iter().enumerate() {
            let expected = index as u32 + 1;
            if stage.order != expected {
                return Err(DomainError::InvalidCatalog(format!(
                    "stage '{}' has order {} but {} was expected",
                    stage.name, stage.order, expected
                )));
            }
        }

        let lost: Vec<&FunnelStage> = stages
            .iter()
            .filter(|stage| stage.kind == StageKind::Lost)
            .collect();
        match lost.as_slice() {
            [only] if only.order == stages.len() as u32 => {}
            [only] => {
                return Err(DomainError::InvalidCatalog(format!(
                    "lost stage '{}' must be the last stage",
                    only.name
                )))
            }
            _ => {
                return Err(DomainError::InvalidCatalog(format!(
                    "exactly one lost stage is required, found {}",
                    lost.len()
                )))
            }
        }

        Ok(Self { stages })
    }

    pub fn standard() -> Self {
        let definitions = [
            ("Lead Generated", 1.0, "Initial lead capture and qualification", StageKind::Open),
            ("Discovery Call Scheduled", 3.0, "Prospect agrees to discovery call", StageKind::Open),
            ("Discovery Call Completed", 1.0, "Discovery call conducted and next steps defined", StageKind::Open),
            ("Proposal Sent", 7.0, "Formal proposal sent to prospect", StageKind::Open),
            ("Proposal Under Review", 14.0, "Prospect reviewing proposal and making decision", StageKind::Open),
            ("Contract Negotiation", 7.0, "Terms and pricing being negotiated", StageKind::Open),
            ("Contract Signed", 1.0, "Deal closed and contract executed", StageKind::Won),
            ("Lost/Disqualified", 0.0, "Prospect dropped out or was disqualified", StageKind::Lost),
        ];

        let stages = definitions
            .into_iter()
            .enumerate()
            .map(|(index, (name, expected, description, kind))| FunnelStage {
                id: StageId(index as i64 + 1),
                name: name.to_string(),
                order: index as u32 + 1,
                expected_duration_days: expected,
                description: description.to_string(),
                kind,
            })
            .collect();

        Self { stages }
    }

    pub fn stages(&self) -> &[FunnelStage] {
        &self.stages
    }

    pub fn get(&self, id: StageId) -> Option<&FunnelStage> {
        self.stages.iter().find(|stage| stage.id == id)
    }

    pub fn first(&self) -> &FunnelStage {
        &self.stages[0]
    }

    pub fn lost(&self) -> &FunnelStage {
        &self.stages[self.stages.len() - 1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyEntry {
    pub id: i64,
    pub prospect_id: ProspectId,
    pub stage_id: StageId,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
}

impl JourneyEntry {
    /// Fractional days spent in the stage; `None` while the entry is open.
    pub fn duration_days(&self) -> Option<f64> {
        self.exited_at
            .map(|exited| days_between(self.entered_at, exited))
    }

    pub fn overlaps(&self, window: &DateWindow) -> bool {
        let entered = self.entered_at.date_naive();
        let still_active = self
            .exited_at
            .map(|exited| exited.date_naive() >= window.start)
            .unwrap_or(true);
        entered <= window.end && still_active
    }
}

/// Each prospect's current stage entry. A prospect should hold at most one
/// open entry; when several are open the latest one is current.
pub fn current_open_entries(entries: &[JourneyEntry]) -> HashMap<ProspectId, &JourneyEntry> {
    let mut current: HashMap<ProspectId, &JourneyEntry> = HashMap::new();
    for entry in entries.iter().filter(|entry| entry.exited_at.is_none()) {
        current
            .entry(entry.prospect_id)
            .and_modify(|held| {
                if (entry.entered_at, entry.id) > (held.entered_at, held.id) {
                    *held = entry;
                }
            })
            .or_insert(entry);
    }
    current
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Scheduled,
    Completed,
    NoShow,
    Cancelled,
    Rescheduled,
}

impl CallStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
            Self::Cancelled => "cancelled",
            Self::Rescheduled => "rescheduled",
        }
    }
}

impl FromStr for CallStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "no_show" => Ok(Self::NoShow),
            "cancelled" => Ok(Self::Cancelled),
            "rescheduled" => Ok(Self::Rescheduled),
            other => Err(DomainError::UnknownToken {
                kind: "call status",
                token: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryCall {
    pub id: i64,
    pub prospect_id: ProspectId,
    pub scheduled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CallStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Viewed,
    UnderReview,
    Accepted,
    Rejected,
    Expired,
}

impl ProposalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Viewed => "viewed",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    /// Drafts never reached the prospect.
    pub const fn was_sent(self) -> bool {
        !matches!(self, Self::Draft)
    }
}

impl FromStr for ProposalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "viewed" => Ok(Self::Viewed),
            "under_review" => Ok(Self::UnderReview),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(DomainError::UnknownToken {
                kind: "proposal status",
                token: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub prospect_id: ProspectId,
    pub amount: f64,
    pub proposal_date: NaiveDate,
    pub status: ProposalStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Completed,
    Cancelled,
    Paused,
}

impl ContractStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Paused => "paused",
        }
    }

    pub const fn bears_revenue(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl FromStr for ContractStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "paused" => Ok(Self::Paused),
            other => Err(DomainError::UnknownToken {
                kind: "contract status",
                token: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub prospect_id: ProspectId,
    pub proposal_id: Option<ProposalId>,
    pub contract_value: f64,
    pub monthly_recurring_revenue: f64,
    pub start_date: NaiveDate,
    pub status: ContractStatus,
    pub signed_at: DateTime<Utc>,
}

/// Interaction between a prospect and a lead source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    pub prospect_id: ProspectId,
    pub source_id: Option<SourceId>,
    pub touched_at: DateTime<Utc>,
}

/// Inclusive calendar window used to bound every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window of `days` calendar days ending on (and including) `end`.
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let start = end - chrono::Duration::days(i64::from(days.max(1)) - 1);
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let date = at.date_naive();
        date >= self.start && date <= self.end
    }

    /// Inclusive day count.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

pub(crate) fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    UnknownToken { kind: &'static str, token: String },
    InvalidCatalog(String),
    InvalidWindow { start: NaiveDate, end: NaiveDate },
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::UnknownToken { kind, token } => {
                write!(f, "unknown {} '{}'", kind, token)
            }
            DomainError::InvalidCatalog(reason) => write!(f, "invalid stage catalog: {}", reason),
            DomainError::InvalidWindow { start, end } => {
                write!(f, "window end {} precedes start {}", end, start)
            }
        }
    }
}

impl std::error::Error for DomainError {}
