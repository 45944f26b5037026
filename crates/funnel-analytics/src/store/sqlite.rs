use super::{ContractFilter, FunnelRepository, JourneyFilter, ProspectFilter, RepositoryError};
use crate::analytics::domain::{
    CallStatus, Contract, ContractId, ContractStatus, DateWindow, DiscoveryCall, FunnelStage,
    JourneyEntry, LeadSource, Proposal, ProposalId, ProposalStatus, Prospect, ProspectId,
    SourceCategory, SourceId, StageCatalog, StageId, StageKind, Touchpoint,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lead_sources (
    source_id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL,
    source_category TEXT NOT NULL CHECK(source_category IN ('linkedin', 'referral', 'cold_outreach', 'website', 'social_media', 'event', 'other')),
    attribution_window_days INTEGER NOT NULL DEFAULT 30,
    cost_per_lead REAL NOT NULL DEFAULT 0.00,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    is_active BOOLEAN NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS prospects (
    prospect_id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    company_name TEXT,
    lead_source_id INTEGER REFERENCES lead_sources(source_id),
    lead_score INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    is_active BOOLEAN NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS funnel_stages (
    stage_id INTEGER PRIMARY KEY AUTOINCREMENT,
    stage_name TEXT NOT NULL,
    stage_order INTEGER NOT NULL UNIQUE,
    stage_description TEXT NOT NULL DEFAULT '',
    expected_duration_days REAL NOT NULL DEFAULT 7,
    stage_kind TEXT NOT NULL DEFAULT 'open' CHECK(stage_kind IN ('open', 'won', 'lost'))
);

CREATE TABLE IF NOT EXISTS prospect_journey (
    journey_id INTEGER PRIMARY KEY AUTOINCREMENT,
    prospect_id INTEGER NOT NULL REFERENCES prospects(prospect_id),
    stage_id INTEGER NOT NULL REFERENCES funnel_stages(stage_id),
    entered_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    exited_at TIMESTAMP NULL
);

CREATE TABLE IF NOT EXISTS discovery_calls (
    call_id INTEGER PRIMARY KEY AUTOINCREMENT,
    prospect_id INTEGER NOT NULL REFERENCES prospects(prospect_id),
    scheduled_at TIMESTAMP NOT NULL,
    completed_at TIMESTAMP NULL,
    call_status TEXT NOT NULL DEFAULT 'scheduled'
);

CREATE TABLE IF NOT EXISTS proposals (
    proposal_id INTEGER PRIMARY KEY AUTOINCREMENT,
    prospect_id INTEGER NOT NULL REFERENCES prospects(prospect_id),
    proposal_amount REAL NOT NULL,
    proposal_date DATE NOT NULL,
    proposal_status TEXT NOT NULL DEFAULT 'draft',
    proposal_sent_at TIMESTAMP NULL
);

CREATE TABLE IF NOT EXISTS contracts (
    contract_id INTEGER PRIMARY KEY AUTOINCREMENT,
    prospect_id INTEGER NOT NULL REFERENCES prospects(prospect_id),
    proposal_id INTEGER REFERENCES proposals(proposal_id),
    contract_value REAL NOT NULL,
    monthly_recurring_revenue REAL NOT NULL DEFAULT 0.00,
    contract_start_date DATE NOT NULL,
    contract_status TEXT NOT NULL DEFAULT 'active',
    signed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS lead_touches (
    touch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    prospect_id INTEGER NOT NULL REFERENCES prospects(prospect_id),
    source_id INTEGER REFERENCES lead_sources(source_id),
    touched_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prospects_created_at ON prospects(created_at);
CREATE INDEX IF NOT EXISTS idx_journey_prospect ON prospect_journey(prospect_id, entered_at);
CREATE INDEX IF NOT EXISTS idx_contracts_signed_at ON contracts(signed_at);
CREATE INDEX IF NOT EXISTS idx_touches_prospect ON lead_touches(prospect_id);
"#;

/// SQLite-backed repository. Reads skip and log rows that fail to decode.
pub struct SqliteFunnelStore {
    conn: Mutex<Connection>,
}

impl SqliteFunnelStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened funnel database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.seed_standard_stages()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sqlite connection mutex poisoned".to_string()))
    }

    /// Installs the standard catalog when no stages are defined yet.
    fn seed_standard_stages(&self) -> Result<(), RepositoryError> {
        let existing: i64 = {
            let conn = self.lock()?;
            conn.query_row("SELECT COUNT(*) FROM funnel_stages", [], |row| row.get(0))?
        };
        if existing == 0 {
            for stage in StageCatalog::standard().stages() {
                self.insert_stage(stage)?;
            }
        }
        Ok(())
    }

    pub fn insert_stage(&self, stage: &FunnelStage) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO funnel_stages (stage_id, stage_name, stage_order, stage_description, expected_duration_days, stage_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stage.id.0,
                stage.name,
                stage.order,
                stage.description,
                stage.expected_duration_days,
                stage.kind.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn insert_lead_source(&self, source: &LeadSource) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO lead_sources (source_id, source_name, source_category, attribution_window_days, cost_per_lead, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                source.id.0,
                source.name,
                source.category.as_str(),
                source.attribution_window_days,
                source.cost_per_lead,
                source.is_active
            ],
        )?;
        Ok(())
    }

    pub fn insert_prospect(&self, prospect: &Prospect) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO prospects (prospect_id, first_name, last_name, email, company_name, lead_source_id, lead_score, created_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                prospect.id.0,
                prospect.first_name,
                prospect.last_name,
                prospect.email,
                prospect.company_name,
                prospect.lead_source_id.map(|id| id.0),
                prospect.lead_score,
                timestamp(prospect.created_at),
                prospect.is_active
            ],
        )?;
        Ok(())
    }

    pub fn insert_journey_entry(&self, entry: &JourneyEntry) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO prospect_journey (journey_id, prospect_id, stage_id, entered_at, exited_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id,
                entry.prospect_id.0,
                entry.stage_id.0,
                timestamp(entry.entered_at),
                entry.exited_at.map(timestamp)
            ],
        )?;
        Ok(())
    }

    pub fn insert_discovery_call(&self, call: &DiscoveryCall) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO discovery_calls (call_id, prospect_id, scheduled_at, completed_at, call_status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                call.id,
                call.prospect_id.0,
                timestamp(call.scheduled_at),
                call.completed_at.map(timestamp),
                call.status.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn insert_proposal(&self, proposal: &Proposal) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO proposals (proposal_id, prospect_id, proposal_amount, proposal_date, proposal_status, proposal_sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                proposal.id.0,
                proposal.prospect_id.0,
                proposal.amount,
                date(proposal.proposal_date),
                proposal.status.as_str(),
                proposal.sent_at.map(timestamp)
            ],
        )?;
        Ok(())
    }

    pub fn insert_contract(&self, contract: &Contract) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO contracts (contract_id, prospect_id, proposal_id, contract_value, monthly_recurring_revenue, contract_start_date, contract_status, signed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                contract.id.0,
                contract.prospect_id.0,
                contract.proposal_id.map(|id| id.0),
                contract.contract_value,
                contract.monthly_recurring_revenue,
                date(contract.start_date),
                contract.status.as_str(),
                timestamp(contract.signed_at)
            ],
        )?;
        Ok(())
    }

    pub fn insert_touchpoint(&self, touch: &Touchpoint) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO lead_touches (prospect_id, source_id, touched_at) VALUES (?1, ?2, ?3)",
            params![
                touch.prospect_id.0,
                touch.source_id.map(|id| id.0),
                timestamp(touch.touched_at)
            ],
        )?;
        Ok(())
    }

    /// Closes the prospect's open entry and opens one for `stage`.
    pub fn record_transition(
        &self,
        prospect: ProspectId,
        stage: StageId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE prospect_journey SET exited_at = ?1 WHERE prospect_id = ?2 AND exited_at IS NULL",
            params![timestamp(at), prospect.0],
        )?;
        tx.execute(
            "INSERT INTO prospect_journey (prospect_id, stage_id, entered_at) VALUES (?1, ?2, ?3)",
            params![prospect.0, stage.0, timestamp(at)],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Accumulates WHERE clauses and their bound values.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Conditions {
    fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.values.extend(values);
    }

    fn window(&mut self, column: &str, window: &DateWindow) {
        self.push(
            format!("date({column}) BETWEEN ? AND ?"),
            [Value::Text(date(window.start)), Value::Text(date(window.end))],
        );
    }

    /// Binds the whole id set as one JSON array so large windows stay under
    /// SQLite's bound-parameter limit.
    fn ids(&mut self, column: &str, ids: &[ProspectId]) {
        let list = ids
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.push(
            format!("{column} IN (SELECT value FROM json_each(?))"),
            [Value::Text(format!("[{list}]"))],
        );
    }

    fn sql(&self, select: &str, order_by: &str) -> String {
        if self.clauses.is_empty() {
            format!("{select} ORDER BY {order_by}")
        } else {
            format!(
                "{select} WHERE {} ORDER BY {order_by}",
                self.clauses.join(" AND ")
            )
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn date(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|err| format!("invalid timestamp '{raw}': {err}"))
}

fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, String> {
    raw.as_deref().map(parse_timestamp).transpose()
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| format!("invalid date '{raw}': {err}"))
}

fn keep_decoded<T>(table: &'static str, id: i64, decoded: Result<T, String>) -> Option<T> {
    match decoded {
        Ok(value) => Some(value),
        Err(reason) => {
            warn!(table, id, %reason, "skipping corrupt row");
            None
        }
    }
}

impl FunnelRepository for SqliteFunnelStore {
    fn lead_sources(&self, active_only: bool) -> Result<Vec<LeadSource>, RepositoryError> {
        let conn = self.lock()?;
        let mut conditions = Conditions::default();
        if active_only {
            conditions.push("is_active = 1", []);
        }
        let sql = conditions.sql(
            "SELECT source_id, source_name, source_category, attribution_window_days, cost_per_lead, is_active FROM lead_sources",
            "source_id",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(conditions.values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, name, category, window, cost, active)| {
                let decoded = category
                    .parse::<SourceCategory>()
                    .map_err(|err| format!("{err}"))
                    .and_then(|category| {
                        let window = u32::try_from(window)
                            .map_err(|_| format!("negative attribution window {window}"))?;
                        Ok(LeadSource {
                            id: SourceId(id),
                            name,
                            category,
                            attribution_window_days: window,
                            cost_per_lead: cost,
                            is_active: active,
                        })
                    });
                keep_decoded("lead_sources", id, decoded)
            })
            .collect())
    }

    fn prospects(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>, RepositoryError> {
        if matches!(&filter.ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut conditions = Conditions::default();
        if let Some(window) = &filter.created_within {
            conditions.window("created_at", window);
        }
        if let Some(ids) = &filter.ids {
            conditions.ids("prospect_id", ids);
        }
        let sql = conditions.sql(
            "SELECT prospect_id, first_name, last_name, email, company_name, lead_source_id, lead_score, created_at, is_active FROM prospects",
            "prospect_id",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(conditions.values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, i32>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, bool>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(
                |(id, first_name, last_name, email, company_name, source, score, created, active)| {
                    let decoded = parse_timestamp(&created).map(|created_at| Prospect {
                        id: ProspectId(id),
                        first_name,
                        last_name,
                        email,
                        company_name,
                        lead_source_id: source.map(SourceId),
                        lead_score: score,
                        created_at,
                        is_active: active,
                    });
                    keep_decoded("prospects", id, decoded)
                },
            )
            .collect())
    }

    fn stages(&self) -> Result<Vec<FunnelStage>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT stage_id, stage_name, stage_order, stage_description, expected_duration_days, stage_kind
             FROM funnel_stages ORDER BY stage_order",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // A broken stage row invalidates the whole catalog.
        rows.into_iter()
            .map(|(id, name, order, description, expected, kind)| -> Result<FunnelStage, RepositoryError> {
                let kind = kind.parse::<StageKind>().map_err(|err| RepositoryError::Corrupt {
                    table: "funnel_stages",
                    id,
                    reason: format!("{err}"),
                })?;
                Ok(FunnelStage {
                    id: StageId(id),
                    name,
                    order,
                    expected_duration_days: expected,
                    description,
                    kind,
                })
            })
            .collect()
    }

    fn journey_entries(&self, filter: &JourneyFilter) -> Result<Vec<JourneyEntry>, RepositoryError> {
        if matches!(&filter.prospects, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut conditions = Conditions::default();
        if let Some(window) = &filter.overlapping {
            conditions.push(
                "date(entered_at) <= ? AND (exited_at IS NULL OR date(exited_at) >= ?)",
                [Value::Text(date(window.end)), Value::Text(date(window.start))],
            );
        }
        if let Some(ids) = &filter.prospects {
            conditions.ids("prospect_id", ids);
        }
        let sql = conditions.sql(
            "SELECT journey_id, prospect_id, stage_id, entered_at, exited_at FROM prospect_journey",
            "prospect_id, entered_at, journey_id",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(conditions.values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, prospect, stage, entered, exited)| {
                let decoded = parse_timestamp(&entered).and_then(|entered_at| {
                    Ok(JourneyEntry {
                        id,
                        prospect_id: ProspectId(prospect),
                        stage_id: StageId(stage),
                        entered_at,
                        exited_at: parse_optional_timestamp(exited)?,
                    })
                });
                keep_decoded("prospect_journey", id, decoded)
            })
            .collect())
    }

    fn discovery_calls(&self, prospects: &[ProspectId]) -> Result<Vec<DiscoveryCall>, RepositoryError> {
        if prospects.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut conditions = Conditions::default();
        conditions.ids("prospect_id", prospects);
        let sql = conditions.sql(
            "SELECT call_id, prospect_id, scheduled_at, completed_at, call_status FROM discovery_calls",
            "call_id",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(conditions.values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, prospect, scheduled, completed, status)| {
                let decoded = (|| -> Result<DiscoveryCall, String> {
                    Ok(DiscoveryCall {
                        id,
                        prospect_id: ProspectId(prospect),
                        scheduled_at: parse_timestamp(&scheduled)?,
                        completed_at: parse_optional_timestamp(completed)?,
                        status: status.parse::<CallStatus>().map_err(|err| format!("{err}"))?,
                    })
                })();
                keep_decoded("discovery_calls", id, decoded)
            })
            .collect())
    }

    fn proposals(&self, prospects: &[ProspectId]) -> Result<Vec<Proposal>, RepositoryError> {
        if prospects.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut conditions = Conditions::default();
        conditions.ids("prospect_id", prospects);
        let sql = conditions.sql(
            "SELECT proposal_id, prospect_id, proposal_amount, proposal_date, proposal_status, proposal_sent_at FROM proposals",
            "proposal_id",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(conditions.values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, prospect, amount, proposed_on, status, sent)| {
                let decoded = (|| -> Result<Proposal, String> {
                    Ok(Proposal {
                        id: ProposalId(id),
                        prospect_id: ProspectId(prospect),
                        amount,
                        proposal_date: parse_date(&proposed_on)?,
                        status: status.parse::<ProposalStatus>().map_err(|err| format!("{err}"))?,
                        sent_at: parse_optional_timestamp(sent)?,
                    })
                })();
                keep_decoded("proposals", id, decoded)
            })
            .collect())
    }

    fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, RepositoryError> {
        if matches!(&filter.prospects, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut conditions = Conditions::default();
        if let Some(window) = &filter.signed_within {
            conditions.window("signed_at", window);
        }
        if let Some(ids) = &filter.prospects {
            conditions.ids("prospect_id", ids);
        }
        let sql = conditions.sql(
            "SELECT contract_id, prospect_id, proposal_id, contract_value, monthly_recurring_revenue, contract_start_date, contract_status, signed_at FROM contracts",
            "contract_id",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(conditions.values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, prospect, proposal, value, mrr, start, status, signed)| {
                let decoded = (|| -> Result<Contract, String> {
                    Ok(Contract {
                        id: ContractId(id),
                        prospect_id: ProspectId(prospect),
                        proposal_id: proposal.map(ProposalId),
                        contract_value: value,
                        monthly_recurring_revenue: mrr,
                        start_date: parse_date(&start)?,
                        status: status.parse::<ContractStatus>().map_err(|err| format!("{err}"))?,
                        signed_at: parse_timestamp(&signed)?,
                    })
                })();
                keep_decoded("contracts", id, decoded)
            })
            .collect())
    }

    fn touchpoints(&self, prospects: &[ProspectId]) -> Result<Vec<Touchpoint>, RepositoryError> {
        if prospects.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut conditions = Conditions::default();
        conditions.ids("prospect_id", prospects);
        let sql = conditions.sql(
            "SELECT touch_id, prospect_id, source_id, touched_at FROM lead_touches",
            "touched_at, touch_id",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(conditions.values.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, prospect, source, touched)| {
                let decoded = parse_timestamp(&touched).map(|touched_at| Touchpoint {
                    prospect_id: ProspectId(prospect),
                    source_id: source.map(SourceId),
                    touched_at,
                });
                keep_decoded("lead_touches", id, decoded)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, day, 8, 30, 0).unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            NaiveDate::from_ymd_opt(2025, 5, 20).unwrap(),
        )
        .unwrap()
    }

    fn prospect(id: i64, created: DateTime<Utc>) -> Prospect {
        Prospect {
            id: ProspectId(id),
            first_name: "Sam".to_string(),
            last_name: format!("Doe{id}"),
            email: format!("sam{id}@example.com"),
            company_name: Some("Acme".to_string()),
            lead_source_id: Some(SourceId(1)),
            lead_score: 40,
            created_at: created,
            is_active: true,
        }
    }

    fn seeded_store() -> SqliteFunnelStore {
        let store = SqliteFunnelStore::open_in_memory().expect("in-memory store");
        store
            .insert_lead_source(&LeadSource {
                id: SourceId(1),
                name: "LinkedIn Outreach".to_string(),
                category: SourceCategory::Linkedin,
                attribution_window_days: 30,
                cost_per_lead: 25.0,
                is_active: true,
            })
            .expect("source inserted");
        store.insert_prospect(&prospect(1, at(5))).expect("prospect 1");
        store.insert_prospect(&prospect(2, at(12))).expect("prospect 2");
        store.insert_prospect(&prospect(3, at(19))).expect("prospect 3");
        store
    }

    #[test]
    fn schema_seeds_the_standard_catalog() {
        let store = SqliteFunnelStore::open_in_memory().expect("in-memory store");
        let stages = store.stages().expect("stages load");
        assert_eq!(stages.len(), 8);
        assert!(StageCatalog::new(stages).is_ok());
    }

    #[test]
    fn prospects_filter_by_creation_window_and_ids() {
        let store = seeded_store();

        let in_window = store
            .prospects(&ProspectFilter::created_within(window()))
            .expect("query runs");
        let ids: Vec<i64> = in_window.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(in_window[0].created_at, at(12));

        let by_id = store
            .prospects(&ProspectFilter::ids(vec![ProspectId(1)]))
            .expect("query runs");
        assert_eq!(by_id.len(), 1);
        assert!(store
            .prospects(&ProspectFilter::ids(Vec::new()))
            .expect("query runs")
            .is_empty());
    }

    #[test]
    fn id_lists_beyond_the_parameter_limit_still_query() {
        let store = seeded_store();
        let ids: Vec<ProspectId> = (1..=40_000).map(ProspectId).collect();

        let found = store
            .prospects(&ProspectFilter::ids(ids.clone()))
            .expect("query runs");
        assert_eq!(found.len(), 3);
        assert!(store.touchpoints(&ids).expect("query runs").is_empty());
        assert!(store
            .contracts(&ContractFilter {
                prospects: Some(ids),
                ..ContractFilter::default()
            })
            .expect("query runs")
            .is_empty());
    }

    #[test]
    fn journey_overlap_and_transitions() {
        let store = seeded_store();
        store
            .insert_journey_entry(&JourneyEntry {
                id: 1,
                prospect_id: ProspectId(1),
                stage_id: StageId(1),
                entered_at: at(1),
                exited_at: Some(at(3)),
            })
            .expect("entry inserted");
        store
            .record_transition(ProspectId(2), StageId(1), at(12))
            .expect("first transition");
        store
            .record_transition(ProspectId(2), StageId(2), at(14))
            .expect("second transition");

        let overlapping = store
            .journey_entries(&JourneyFilter::overlapping(window()))
            .expect("query runs");
        assert_eq!(overlapping.len(), 2);
        assert!(overlapping.iter().all(|entry| entry.prospect_id == ProspectId(2)));
        assert_eq!(overlapping[0].exited_at, Some(at(14)));
        assert_eq!(overlapping[1].exited_at, None);
    }

    #[test]
    fn corrupt_rows_are_skipped() {
        let store = seeded_store();
        {
            let conn = store.lock().expect("lock");
            conn.execute(
                "INSERT INTO contracts (contract_id, prospect_id, contract_value, contract_start_date, contract_status, signed_at)
                 VALUES (1, 2, 5000, '2025-05-15', 'active', 'not-a-date'),
                        (2, 2, 7000, '2025-05-15', 'active', '2025-05-15 09:00:00')",
                [],
            )
            .expect("raw insert");
        }

        let contracts = store
            .contracts(&ContractFilter {
                signed_within: None,
                prospects: Some(vec![ProspectId(2)]),
            })
            .expect("query runs");
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].id, ContractId(2));
        assert_eq!(contracts[0].status, ContractStatus::Active);
    }
}
