use super::domain::{
    DateWindow, FunnelStage, JourneyEntry, ProspectId, StageCatalog, StageId, StageKind,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Where a prospect went after leaving a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    Converted,
    Dropped,
    Lateral,
}

pub fn classify_exit(current: &FunnelStage, next: Option<&FunnelStage>) -> ExitKind {
    match next {
        None => ExitKind::Dropped,
        Some(stage) if stage.kind == StageKind::Lost => ExitKind::Dropped,
        Some(stage) if stage.order > current.order => ExitKind::Converted,
        Some(_) => ExitKind::Lateral,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageAggregate {
    pub stage_id: StageId,
    pub stage_name: String,
    pub stage_order: u32,
    pub kind: StageKind,
    pub expected_duration_days: f64,
    pub prospects_entered: usize,
    pub prospects_exited: usize,
    pub prospects_converted: usize,
    pub prospects_dropped: usize,
    pub open_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_days: Option<f64>,
    pub stage_conversion_rate: f64,
    pub funnel_conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelAggregate {
    pub window: DateWindow,
    pub stages: Vec<StageAggregate>,
    pub total_prospects: usize,
    pub skipped_entries: usize,
}

impl FunnelAggregate {
    pub fn is_empty(&self) -> bool {
        self.total_prospects == 0
    }

    pub fn stage(&self, stage_id: StageId) -> Option<&StageAggregate> {
        self.stages.iter().find(|stage| stage.stage_id == stage_id)
    }
}

#[derive(Default)]
struct StageTally {
    entered: HashSet<ProspectId>,
    exited: HashSet<ProspectId>,
    converted: HashSet<ProspectId>,
    dropped: HashSet<ProspectId>,
    open: HashSet<ProspectId>,
    durations: Vec<f64>,
}

/// Entries must carry each prospect's full history: only entries overlapping
/// the window are counted, but exits are classified against the next entry
/// wherever it falls.
pub fn aggregate_funnel(
    window: &DateWindow,
    catalog: &StageCatalog,
    entries: &[JourneyEntry],
) -> FunnelAggregate {
    let mut skipped_entries = 0;
    let mut histories: HashMap<ProspectId, Vec<&JourneyEntry>> = HashMap::new();

    for entry in entries {
        if catalog.get(entry.stage_id).is_none() {
            warn!(entry_id = entry.id, stage_id = entry.stage_id.0, "journey entry references unknown stage; skipping");
            skipped_entries += 1;
            continue;
        }
        if matches!(entry.exited_at, Some(exited) if exited < entry.entered_at) {
            warn!(entry_id = entry.id, "journey entry exits before it enters; skipping");
            skipped_entries += 1;
            continue;
        }
        histories.entry(entry.prospect_id).or_default().push(entry);
    }

    let mut tallies: HashMap<StageId, StageTally> = HashMap::new();
    let mut prospects_in_window: HashSet<ProspectId> = HashSet::new();

    for (prospect_id, history) in histories.iter_mut() {
        history.sort_by(|a, b| a.entered_at.cmp(&b.entered_at).then(a.id.cmp(&b.id)));

        let open_count = history.iter().filter(|entry| entry.exited_at.is_none()).count();
        if open_count > 1 {
            warn!(
                prospect_id = prospect_id.0,
                open_count, "prospect occupies more than one open stage; keeping the latest"
            );
        }
        let current_open = history
            .iter()
            .rev()
            .find(|entry| entry.exited_at.is_none())
            .map(|entry| entry.id);

        for (index, entry) in history.iter().enumerate() {
            if !entry.overlaps(window) {
                continue;
            }
            let Some(stage) = catalog.get(entry.stage_id) else {
                continue;
            };

            prospects_in_window.insert(*prospect_id);
            let tally = tallies.entry(stage.id).or_default();
            tally.entered.insert(*prospect_id);

            match entry.duration_days() {
                Some(duration) => {
                    tally.exited.insert(*prospect_id);
                    tally.durations.push(duration);

                    let next = history
                        .get(index + 1)
                        .and_then(|next| catalog.get(next.stage_id));
                    match classify_exit(stage, next) {
                        ExitKind::Converted => {
                            tally.converted.insert(*prospect_id);
                        }
                        ExitKind::Dropped => {
                            tally.dropped.insert(*prospect_id);
                        }
                        ExitKind::Lateral => {}
                    }
                }
                None if current_open == Some(entry.id) => {
                    tally.open.insert(*prospect_id);
                }
                None => {}
            }
        }
    }

    let first_stage_entered = tallies
        .get(&catalog.first().id)
        .map(|tally| tally.entered.len())
        .unwrap_or(0);

    let stages = catalog
        .stages()
        .iter()
        .map(|stage| {
            let tally = tallies.remove(&stage.id).unwrap_or_default();
            let entered = tally.entered.len();
            let converted = tally.converted.len();
            let avg_duration_days = if tally.durations.is_empty() {
                None
            } else {
                Some(tally.durations.iter().sum::<f64>() / tally.durations.len() as f64)
            };

            StageAggregate {
                stage_id: stage.id,
                stage_name: stage.name.clone(),
                stage_order: stage.order,
                kind: stage.kind,
                expected_duration_days: stage.expected_duration_days,
                prospects_entered: entered,
                prospects_exited: tally.exited.len(),
                prospects_converted: converted,
                prospects_dropped: tally.dropped.len(),
                open_entries: tally.open.len(),
                avg_duration_days,
                stage_conversion_rate: percentage(converted, entered),
                funnel_conversion_rate: percentage(converted, first_stage_entered.max(1)),
            }
        })
        .collect();

    debug!(
        prospects = prospects_in_window.len(),
        skipped_entries, "aggregated funnel window"
    );

    FunnelAggregate {
        window: *window,
        stages,
        total_prospects: prospects_in_window.len(),
        skipped_entries,
    }
}

pub(crate) fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}
