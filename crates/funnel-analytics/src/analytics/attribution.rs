use super::domain::{
    days_between, Contract, ContractId, LeadSource, ProspectId, SourceCategory, SourceId,
    Touchpoint,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Rule deciding how a contract's value is credited across touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    FirstTouch,
    LastTouch,
    Linear,
    TimeDecay,
    PositionBased,
}

impl AttributionModel {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::FirstTouch,
            Self::LastTouch,
            Self::Linear,
            Self::TimeDecay,
            Self::PositionBased,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstTouch => "first_touch",
            Self::LastTouch => "last_touch",
            Self::Linear => "linear",
            Self::TimeDecay => "time_decay",
            Self::PositionBased => "position_based",
        }
    }
}

impl fmt::Display for AttributionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributionModel {
    type Err = AttributionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().to_ascii_lowercase();
        Self::ordered()
            .into_iter()
            .find(|model| model.as_str() == token)
            .ok_or_else(|| AttributionError::InvalidModel(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributionError {
    #[error("unknown attribution model '{0}' (expected first_touch, last_touch, linear, time_decay or position_based)")]
    InvalidModel(String),
    #[error("contract {0} has no attributable touchpoints")]
    NoTouchpoints(ContractId),
    #[error("contract {contract} has unusable value {value}")]
    InvalidContractValue { contract: ContractId, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSettings {
    pub half_life_days: f64,
    pub first_touch_share: f64,
    pub last_touch_share: f64,
}

impl Default for AttributionSettings {
    fn default() -> Self {
        Self {
            half_life_days: 7.0,
            first_touch_share: 0.4,
            last_touch_share: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "source_id", rename_all = "snake_case")]
pub enum AttributedSource {
    Source(SourceId),
    Unattributed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub source: AttributedSource,
    pub weight: f64,
    pub amount_cents: i64,
}

impl Allocation {
    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractAttribution {
    pub contract_id: ContractId,
    pub prospect_id: ProspectId,
    pub model: AttributionModel,
    pub value_cents: i64,
    pub allocations: Vec<Allocation>,
}

impl ContractAttribution {
    pub fn total_cents(&self) -> i64 {
        self.allocations.iter().map(|a| a.amount_cents).sum()
    }

    pub fn cents_for(&self, source: AttributedSource) -> i64 {
        self.allocations
            .iter()
            .filter(|allocation| allocation.source == source)
            .map(|allocation| allocation.amount_cents)
            .sum()
    }

    pub fn is_unattributed(&self) -> bool {
        self.allocations
            .iter()
            .all(|allocation| allocation.source == AttributedSource::Unattributed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceAttribution {
    pub source: AttributedSource,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<SourceCategory>,
    pub attributed_cents: i64,
    pub attributed_revenue: f64,
    pub attributed_mrr: f64,
    pub contracts_credited: usize,
    pub avg_deal_size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_sales_cycle_days: Option<f64>,
    pub revenue_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttributionBreakdown {
    pub model: AttributionModel,
    pub total_revenue: f64,
    pub contracts_attributed: usize,
    pub contracts_skipped: usize,
    pub unattributed_contracts: usize,
    pub sources: Vec<SourceAttribution>,
    pub contracts: Vec<ContractAttribution>,
}

impl AttributionBreakdown {
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn source(&self, source_id: SourceId) -> Option<&SourceAttribution> {
        self.sources
            .iter()
            .find(|row| row.source == AttributedSource::Source(source_id))
    }
}

/// Distributes contract revenue across lead sources.
pub struct AttributionEngine {
    settings: AttributionSettings,
    sources: HashMap<SourceId, LeadSource>,
}

impl AttributionEngine {
    pub fn new(settings: AttributionSettings, sources: &[LeadSource]) -> Self {
        let sources = sources
            .iter()
            .map(|source| (source.id, source.clone()))
            .collect();
        Self { settings, sources }
    }

    /// Touches usable for `contract`, oldest first. The earliest touch
    /// survives the source's attribution window; later ones must fall inside it.
    pub fn resolve_touches<'a>(
        &self,
        contract: &Contract,
        touches: &'a [Touchpoint],
    ) -> Vec<(&'a Touchpoint, SourceId)> {
        let mut resolved: Vec<(&Touchpoint, SourceId)> = touches
            .iter()
            .filter(|touch| touch.touched_at <= contract.signed_at)
            .filter_map(|touch| {
                let source_id = touch.source_id?;
                self.sources.contains_key(&source_id).then_some((touch, source_id))
            })
            .collect();
        resolved.sort_by_key(|(touch, _)| touch.touched_at);

        let mut kept = Vec::with_capacity(resolved.len());
        for (index, (touch, source_id)) in resolved.into_iter().enumerate() {
            let window_days = self
                .sources
                .get(&source_id)
                .map(|source| source.attribution_window_days)
                .unwrap_or(0);
            let earliest_allowed = contract.signed_at - Duration::days(window_days as i64);
            if index == 0 || touch.touched_at >= earliest_allowed {
                kept.push((touch, source_id));
            }
        }
        kept
    }

    pub fn attribute(
        &self,
        contract: &Contract,
        touches: &[Touchpoint],
        model: AttributionModel,
    ) -> Result<ContractAttribution, AttributionError> {
        let value_cents = contract_cents(contract)?;
        let resolved = self.resolve_touches(contract, touches);
        if resolved.is_empty() {
            return Err(AttributionError::NoTouchpoints(contract.id));
        }

        let touch_weights = self.touch_weights(contract, &resolved, model);

        // Accumulate per source, keeping first-appearance order for tie breaks.
        let mut per_source: Vec<(SourceId, f64)> = Vec::new();
        for ((_, source_id), weight) in resolved.iter().zip(touch_weights) {
            match per_source.iter_mut().find(|(id, _)| id == source_id) {
                Some((_, total)) => *total += weight,
                None => per_source.push((*source_id, weight)),
            }
        }

        let total_weight: f64 = per_source.iter().map(|(_, weight)| weight).sum();
        let allocations = allocate_cents(value_cents, &per_source, total_weight);

        Ok(ContractAttribution {
            contract_id: contract.id,
            prospect_id: contract.prospect_id,
            model,
            value_cents,
            allocations,
        })
    }

    fn touch_weights(
        &self,
        contract: &Contract,
        resolved: &[(&Touchpoint, SourceId)],
        model: AttributionModel,
    ) -> Vec<f64> {
        let count = resolved.len();
        let mut weights = vec![0.0; count];

        match model {
            AttributionModel::FirstTouch => weights[0] = 1.0,
            AttributionModel::LastTouch => weights[count - 1] = 1.0,
            AttributionModel::Linear => {
                let mut touches_per_source: HashMap<SourceId, usize> = HashMap::new();
                for (_, source_id) in resolved {
                    *touches_per_source.entry(*source_id).or_default() += 1;
                }
                let distinct = touches_per_source.len() as f64;
                for (weight, (_, source_id)) in weights.iter_mut().zip(resolved) {
                    let repeats = touches_per_source.get(source_id).copied().unwrap_or(1) as f64;
                    *weight = 1.0 / (distinct * repeats);
                }
            }
            AttributionModel::TimeDecay => {
                for (weight, (touch, _)) in weights.iter_mut().zip(resolved) {
                    let age = days_between(touch.touched_at, contract.signed_at);
                    *weight = decay_weight(age, self.settings.half_life_days);
                }
                if weights.iter().sum::<f64>() <= 0.0 {
                    weights.iter_mut().for_each(|weight| *weight = 1.0);
                }
            }
            AttributionModel::PositionBased => match count {
                1 => weights[0] = 1.0,
                2 => {
                    weights[0] = self.settings.first_touch_share;
                    weights[1] = self.settings.last_touch_share;
                }
                _ => {
                    let middle_share = (1.0
                        - self.settings.first_touch_share
                        - self.settings.last_touch_share)
                        .max(0.0);
                    let per_middle = middle_share / (count - 2) as f64;
                    weights[0] = self.settings.first_touch_share;
                    weights[count - 1] = self.settings.last_touch_share;
                    weights[1..count - 1]
                        .iter_mut()
                        .for_each(|weight| *weight = per_middle);
                }
            },
        }

        weights
    }

    /// Like [`attribute`](Self::attribute), but credits an `Unattributed`
    /// bucket when nothing resolvable remains.
    pub fn attribute_or_unattributed(
        &self,
        contract: &Contract,
        touches: &[Touchpoint],
        model: AttributionModel,
    ) -> Result<ContractAttribution, AttributionError> {
        match self.attribute(contract, touches, model) {
            Err(AttributionError::NoTouchpoints(contract_id)) => {
                warn!(contract_id = contract_id.0, "no attributable touches; crediting unattributed");
                let value_cents = contract_cents(contract)?;
                Ok(ContractAttribution {
                    contract_id,
                    prospect_id: contract.prospect_id,
                    model,
                    value_cents,
                    allocations: vec![Allocation {
                        source: AttributedSource::Unattributed,
                        weight: 1.0,
                        amount_cents: value_cents,
                    }],
                })
            }
            other => other,
        }
    }

    /// Attributes every revenue-bearing contract and rolls the credit up per source.
    pub fn breakdown(
        &self,
        contracts: &[Contract],
        touches: &HashMap<ProspectId, Vec<Touchpoint>>,
        model: AttributionModel,
    ) -> AttributionBreakdown {
        let mut tallies: HashMap<AttributedSource, SourceTally> = HashMap::new();
        let mut attributed = Vec::new();
        let mut contracts_skipped = 0;
        let mut unattributed_contracts = 0;
        let no_touches = Vec::new();

        for contract in contracts {
            if !contract.status.bears_revenue() {
                contracts_skipped += 1;
                continue;
            }

            let history = touches.get(&contract.prospect_id).unwrap_or(&no_touches);
            let attribution = match self.attribute_or_unattributed(contract, history, model) {
                Ok(attribution) => attribution,
                Err(error) => {
                    warn!(contract_id = contract.id.0, %error, "skipping contract");
                    contracts_skipped += 1;
                    continue;
                }
            };
            if attribution.is_unattributed() {
                unattributed_contracts += 1;
            }

            let cycle_days = self
                .resolve_touches(contract, history)
                .first()
                .map(|(first, _)| days_between(first.touched_at, contract.signed_at));

            for allocation in &attribution.allocations {
                let tally = tallies.entry(allocation.source).or_default();
                tally.cents += allocation.amount_cents;
                tally.mrr += contract.monthly_recurring_revenue * allocation.weight;
                tally.contracts += 1;
                tally.deal_values += contract.contract_value;
                if let Some(days) = cycle_days {
                    tally.cycle_days.push(days);
                }
            }
            attributed.push(attribution);
        }

        let total_cents: i64 = tallies.values().map(|tally| tally.cents).sum();
        let mut sources: Vec<SourceAttribution> = tallies
            .into_iter()
            .map(|(source, tally)| self.source_row(source, tally, total_cents))
            .collect();
        sources.sort_by(|a, b| {
            b.attributed_cents
                .cmp(&a.attributed_cents)
                .then(a.source.cmp(&b.source))
        });

        debug!(
            model = model.as_str(),
            contracts = attributed.len(),
            contracts_skipped,
            unattributed_contracts,
            "attribution breakdown computed"
        );

        AttributionBreakdown {
            model,
            total_revenue: total_cents as f64 / 100.0,
            contracts_attributed: attributed.len(),
            contracts_skipped,
            unattributed_contracts,
            sources,
            contracts: attributed,
        }
    }

    fn source_row(&self, source: AttributedSource, tally: SourceTally, total_cents: i64) -> SourceAttribution {
        let (source_name, category) = match source {
            AttributedSource::Source(id) => match self.sources.get(&id) {
                Some(lead_source) => (lead_source.name.clone(), Some(lead_source.category)),
                None => (format!("Source {}", id.0), None),
            },
            AttributedSource::Unattributed => ("Unattributed".to_string(), None),
        };
        let avg_sales_cycle_days = if tally.cycle_days.is_empty() {
            None
        } else {
            Some(tally.cycle_days.iter().sum::<f64>() / tally.cycle_days.len() as f64)
        };

        SourceAttribution {
            source,
            source_name,
            category,
            attributed_cents: tally.cents,
            attributed_revenue: tally.cents as f64 / 100.0,
            attributed_mrr: tally.mrr,
            contracts_credited: tally.contracts,
            avg_deal_size: if tally.contracts == 0 {
                0.0
            } else {
                tally.deal_values / tally.contracts as f64
            },
            avg_sales_cycle_days,
            revenue_percentage: if total_cents == 0 {
                0.0
            } else {
                tally.cents as f64 / total_cents as f64 * 100.0
            },
        }
    }
}

#[derive(Default)]
struct SourceTally {
    cents: i64,
    mrr: f64,
    contracts: usize,
    deal_values: f64,
    cycle_days: Vec<f64>,
}

/// Relative weight of a touch `age_days` before signing.
pub fn decay_weight(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    2f64.powf(-age_days.max(0.0) / half_life_days)
}

fn contract_cents(contract: &Contract) -> Result<i64, AttributionError> {
    let value = contract.contract_value;
    if !value.is_finite() || value < 0.0 {
        return Err(AttributionError::InvalidContractValue {
            contract: contract.id,
            value,
        });
    }
    Ok((value * 100.0).round() as i64)
}

/// Rounds each share to whole cents and settles the remainder on the heaviest
/// source; ties keep the earliest.
fn allocate_cents(value_cents: i64, weights: &[(SourceId, f64)], total_weight: f64) -> Vec<Allocation> {
    let normalized: Vec<(SourceId, f64)> = weights
        .iter()
        .map(|(source_id, weight)| {
            let share = if total_weight > 0.0 {
                weight / total_weight
            } else {
                1.0 / weights.len() as f64
            };
            (*source_id, share)
        })
        .collect();

    let mut allocations: Vec<Allocation> = normalized
        .iter()
        .map(|(source_id, share)| Allocation {
            source: AttributedSource::Source(*source_id),
            weight: *share,
            amount_cents: (value_cents as f64 * share).round() as i64,
        })
        .collect();

    let remainder = value_cents - allocations.iter().map(|a| a.amount_cents).sum::<i64>();
    if remainder != 0 {
        let mut heaviest = 0;
        for (index, allocation) in allocations.iter().enumerate() {
            if allocation.weight > allocations[heaviest].weight {
                heaviest = index;
            }
        }
        allocations[heaviest].amount_cents += remainder;
    }

    allocations
}
