use super::aggregator::{FunnelAggregate, StageAggregate};
use super::domain::{
    current_open_entries, days_between, JourneyEntry, ProspectId, StageCatalog, StageId, StageKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Thresholds and weights steering bottleneck detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckConfig {
    pub bottleneck_threshold_days: f64,
    pub low_conversion_threshold_percent: f64,
    /// Fraction of the expected duration tolerated before flagging.
    pub duration_tolerance: f64,
    pub stuck_multiplier: f64,
    pub duration_weight: f64,
    pub conversion_weight: f64,
}

impl Default for BottleneckConfig {
    fn default() -> Self {
        Self {
            bottleneck_threshold_days: 21.0,
            low_conversion_threshold_percent: 50.0,
            duration_tolerance: 0.0,
            stuck_multiplier: 2.0,
            duration_weight: 0.5,
            conversion_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckReason {
    ExceedsExpectedDuration,
    ExceedsThresholdDays,
    LowConversion,
}

impl BottleneckReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExceedsExpectedDuration => "exceeds_expected_duration",
            Self::ExceedsThresholdDays => "exceeds_threshold_days",
            Self::LowConversion => "low_conversion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BottleneckFinding {
    pub stage_id: StageId,
    pub stage_name: String,
    pub stage_order: u32,
    pub reasons: Vec<BottleneckReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_days: Option<f64>,
    pub expected_duration_days: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_overrun_ratio: Option<f64>,
    pub conversion_rate: f64,
    pub prospects_entered: usize,
    pub prospects_stuck: usize,
    pub score: f64,
    pub severity: Severity,
    pub recommendations: Vec<&'static str>,
}

impl BottleneckFinding {
    pub fn has_reason(&self, reason: BottleneckReason) -> bool {
        self.reasons.contains(&reason)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StuckProspect {
    pub prospect_id: ProspectId,
    pub stage_id: StageId,
    pub entered_at: DateTime<Utc>,
    pub days_in_stage: f64,
    pub threshold_days: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StuckGroup {
    pub stage_id: StageId,
    pub stage_name: String,
    pub stage_order: u32,
    pub prospects: Vec<StuckProspect>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BottleneckReport {
    pub as_of: DateTime<Utc>,
    pub findings: Vec<BottleneckFinding>,
    pub stuck: Vec<StuckGroup>,
}

impl BottleneckReport {
    pub fn total_stuck(&self) -> usize {
        self.stuck.iter().map(|group| group.prospects.len()).sum()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == severity)
            .count()
    }
}

const STAGE_PLAYBOOK: &[(&str, [&str; 3])] = &[
    (
        "Lead Generated",
        [
            "Introduce lead scoring so high-fit prospects are worked first",
            "Automate qualification sequences for new leads",
            "Review lead source quality and tighten targeting",
        ],
    ),
    (
        "Discovery Call Scheduled",
        [
            "Sharpen the first-touch messaging and value proposition",
            "Offer self-service calendar booking",
            "Give prospects a reason to book now, such as a time-boxed consultation",
        ],
    ),
    (
        "Discovery Call Completed",
        [
            "Send confirmation and reminder sequences to cut no-shows",
            "Coach the team on running discovery calls",
            "Record calls and review them for improvement",
        ],
    ),
    (
        "Proposal Sent",
        [
            "Shorten the hand-off from discovery to proposal",
            "Maintain proposal templates for faster turnaround",
            "Qualify harder before committing to a proposal",
        ],
    ),
    (
        "Proposal Under Review",
        [
            "Run a structured follow-up sequence while proposals are open",
            "Track proposal engagement to time follow-ups",
            "Add case studies and social proof to proposals",
        ],
    ),
    (
        "Contract Negotiation",
        [
            "Simplify contract terms",
            "Train the team on objection handling and negotiation",
            "Offer packaged pricing options",
        ],
    ),
];

const MAX_RECOMMENDATIONS: usize = 5;

pub struct BottleneckDetector {
    config: BottleneckConfig,
}

impl BottleneckDetector {
    pub fn new(config: BottleneckConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BottleneckConfig {
        &self.config
    }

    /// Flags slow or leaky stages and lists prospects waiting too long.
    pub fn detect(
        &self,
        aggregate: &FunnelAggregate,
        catalog: &StageCatalog,
        entries: &[JourneyEntry],
        as_of: DateTime<Utc>,
    ) -> BottleneckReport {
        let stuck = self.stuck_prospects(catalog, entries, as_of);
        let stuck_counts: HashMap<StageId, usize> = stuck
            .iter()
            .map(|group| (group.stage_id, group.prospects.len()))
            .collect();

        let mut findings: Vec<BottleneckFinding> = aggregate
            .stages
            .iter()
            .filter(|stage| stage.kind != StageKind::Lost)
            .filter_map(|stage| {
                let stuck = stuck_counts.get(&stage.stage_id).copied().unwrap_or(0);
                self.evaluate_stage(stage, stuck)
            })
            .collect();

        findings.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.stage_order.cmp(&b.stage_order))
        });

        debug!(
            flagged = findings.len(),
            stuck = stuck_counts.values().sum::<usize>(),
            "bottleneck detection complete"
        );

        BottleneckReport {
            as_of,
            findings,
            stuck,
        }
    }

    /// Returns a finding when the stage breaches any threshold. Won stages are
    /// judged on duration only since nothing converts out of them.
    pub fn evaluate_stage(&self, stage: &StageAggregate, stuck: usize) -> Option<BottleneckFinding> {
        let config = &self.config;
        let expected = stage.expected_duration_days;
        let has_entrants = stage.prospects_entered > 0;
        let judges_conversion = has_entrants && stage.kind == StageKind::Open;
        let mut reasons = Vec::new();

        if let Some(avg) = stage.avg_duration_days {
            if expected > 0.0 && avg > expected * (1.0 + config.duration_tolerance) {
                reasons.push(BottleneckReason::ExceedsExpectedDuration);
            }
            if avg > config.bottleneck_threshold_days {
                reasons.push(BottleneckReason::ExceedsThresholdDays);
            }
        }
        if judges_conversion && stage.stage_conversion_rate < config.low_conversion_threshold_percent {
            reasons.push(BottleneckReason::LowConversion);
        }

        if reasons.is_empty() {
            return None;
        }

        let duration_overrun_ratio = match stage.avg_duration_days {
            Some(avg) if expected > 0.0 => Some(avg / expected),
            _ => None,
        };
        let stuck_share = if has_entrants {
            stuck as f64 / stage.prospects_entered as f64
        } else {
            0.0
        };
        let rate = judges_conversion.then_some(stage.stage_conversion_rate);

        Some(BottleneckFinding {
            stage_id: stage.stage_id,
            stage_name: stage.stage_name.clone(),
            stage_order: stage.stage_order,
            reasons,
            avg_duration_days: stage.avg_duration_days,
            expected_duration_days: expected,
            duration_overrun_ratio,
            conversion_rate: stage.stage_conversion_rate,
            prospects_entered: stage.prospects_entered,
            prospects_stuck: stuck,
            score: self.score(stage),
            severity: severity(rate, duration_overrun_ratio, stuck_share),
            recommendations: recommendations(
                &stage.stage_name,
                rate,
                duration_overrun_ratio,
                stuck_share,
            ),
        })
    }

    fn score(&self, stage: &StageAggregate) -> f64 {
        let config = &self.config;
        let duration_component = match stage.avg_duration_days {
            Some(avg) if stage.expected_duration_days > 0.0 => {
                (avg / stage.expected_duration_days - 1.0).max(0.0)
            }
            _ => 0.0,
        };
        let threshold = config.low_conversion_threshold_percent;
        let judges_conversion = stage.prospects_entered > 0 && stage.kind == StageKind::Open;
        let conversion_component = if judges_conversion && threshold > 0.0 {
            (threshold - stage.stage_conversion_rate).max(0.0) / threshold
        } else {
            0.0
        };

        config.duration_weight * duration_component + config.conversion_weight * conversion_component
    }

    /// Current entries in open stages older than `expected × stuck_multiplier`.
    pub fn stuck_prospects(
        &self,
        catalog: &StageCatalog,
        entries: &[JourneyEntry],
        as_of: DateTime<Utc>,
    ) -> Vec<StuckGroup> {
        let mut grouped: HashMap<StageId, Vec<StuckProspect>> = HashMap::new();

        for entry in current_open_entries(entries).into_values() {
            let Some(stage) = catalog.get(entry.stage_id) else {
                continue;
            };
            if stage.kind.is_terminal() || entry.entered_at > as_of {
                continue;
            }

            let threshold_days = stage.expected_duration_days * self.config.stuck_multiplier;
            let days_in_stage = days_between(entry.entered_at, as_of);
            if days_in_stage > threshold_days {
                grouped.entry(stage.id).or_default().push(StuckProspect {
                    prospect_id: entry.prospect_id,
                    stage_id: stage.id,
                    entered_at: entry.entered_at,
                    days_in_stage,
                    threshold_days,
                });
            }
        }

        catalog
            .stages()
            .iter()
            .filter_map(|stage| {
                let mut prospects = grouped.remove(&stage.id)?;
                prospects.sort_by(|a, b| {
                    b.days_in_stage
                        .total_cmp(&a.days_in_stage)
                        .then(a.prospect_id.cmp(&b.prospect_id))
                });
                Some(StuckGroup {
                    stage_id: stage.id,
                    stage_name: stage.name.clone(),
                    stage_order: stage.order,
                    prospects,
                })
            })
            .collect()
    }
}

fn severity(rate: Option<f64>, ratio: Option<f64>, stuck_share: f64) -> Severity {
    let rate_below = |limit: f64| rate.map(|rate| rate < limit).unwrap_or(false);
    let ratio_above = |limit: f64| ratio.map(|ratio| ratio > limit).unwrap_or(false);

    if rate_below(50.0) || ratio_above(2.0) || stuck_share > 0.3 {
        Severity::High
    } else if rate_below(70.0) || ratio_above(1.5) || stuck_share > 0.2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn recommendations(
    stage_name: &str,
    rate: Option<f64>,
    ratio: Option<f64>,
    stuck_share: f64,
) -> Vec<&'static str> {
    let mut picks: Vec<&'static str> = STAGE_PLAYBOOK
        .iter()
        .find(|(name, _)| *name == stage_name)
        .map(|(_, tips)| tips.to_vec())
        .unwrap_or_default();

    if rate.map(|rate| rate < 50.0).unwrap_or(false) {
        picks.push("Revisit qualification criteria for this stage");
        picks.push("Review lost prospects for recurring objections");
    }
    if ratio.map(|ratio| ratio > 2.0).unwrap_or(false) {
        picks.push("Automate follow-ups for prospects in this stage");
        picks.push("Agree explicit next steps and timelines with prospects");
    }
    if stuck_share > 0.3 {
        picks.push("Run a re-engagement campaign for stalled prospects");
        picks.push("Add stage-specific nurturing content");
    }

    picks.truncate(MAX_RECOMMENDATIONS);
    picks
}
