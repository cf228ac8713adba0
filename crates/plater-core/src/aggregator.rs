//! Client-side folding of a progress stream into an overall view.
//!
//! The aggregator tolerates plates it was not told about up front, duplicate
//! delivery and out-of-order updates. It is pure derived state and can be
//! rebuilt by replaying the stream.

use crate::error::FatalKind;
use crate::plate::PlateInfo;
use crate::session::{PlateProgress, ProgressEvent};
use std::collections::{BTreeMap, BTreeSet};

/// Overall outcome as seen by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateStatus {
    InProgress,
    /// The job finished. Listed plates failed individually; the others have results.
    Completed { failed_plates: Vec<u32> },
    /// The whole job failed.
    Failed { kind: FatalKind, message: String },
}

impl AggregateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AggregateStatus::InProgress)
    }
}

/// What happened to an event handed to [`ProgressAggregator::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Would have violated per-plate monotonicity.
    Rejected,
    /// Arrived after the terminal event.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    expected_count: usize,
    known_plates: BTreeSet<u32>,
    latest: BTreeMap<u32, PlateProgress>,
    status: AggregateStatus,
    high_water: f32,
}

impl ProgressAggregator {
    /// Starts with the plates the client expects to be sliced.
    pub fn new(expected_plates: impl IntoIterator<Item = u32>) -> Self {
        let known_plates: BTreeSet<u32> = expected_plates.into_iter().collect();
        Self {
            expected_count: known_plates.len(),
            known_plates,
            latest: BTreeMap::new(),
            status: AggregateStatus::InProgress,
            high_water: 0.0,
        }
    }

    pub fn apply(&mut self, event: &ProgressEvent) -> ApplyOutcome {
        if self.status.is_terminal() {
            tracing::debug!(event = event.name(), "[Aggregator] event after terminal ignored");
            return ApplyOutcome::Ignored;
        }

        match event {
            ProgressEvent::Start { .. } => {}
            ProgressEvent::Progress { progress } => {
                if let Some(existing) = self.latest.get(&progress.plate_index)
                    && !existing.permits(progress)
                {
                    tracing::warn!(
                        plate_index = progress.plate_index,
                        phase = %progress.phase,
                        "[Aggregator] rejected non-monotonic update for completed plate"
                    );
                    return ApplyOutcome::Rejected;
                }
                self.known_plates.insert(progress.plate_index);
                self.latest.insert(progress.plate_index, progress.clone());
            }
            ProgressEvent::Complete { .. } => {
                self.status = AggregateStatus::Completed {
                    failed_plates: self.failed_plates(),
                };
                self.high_water = 100.0;
                return ApplyOutcome::Applied;
            }
            ProgressEvent::Error { kind, message } => {
                self.status = AggregateStatus::Failed {
                    kind: *kind,
                    message: message.clone(),
                };
                return ApplyOutcome::Applied;
            }
        }

        self.high_water = self.high_water.max(self.overall_percent());
        ApplyOutcome::Applied
    }

    pub fn known_plates(&self) -> &BTreeSet<u32> {
        &self.known_plates
    }

    pub fn per_plate_latest(&self) -> &BTreeMap<u32, PlateProgress> {
        &self.latest
    }

    pub fn latest(&self, plate_index: u32) -> Option<&PlateProgress> {
        self.latest.get(&plate_index)
    }

    pub fn status(&self) -> &AggregateStatus {
        &self.status
    }

    /// `max(known plates, originally expected)`.
    pub fn denominator(&self) -> usize {
        self.known_plates.len().max(self.expected_count)
    }

    pub fn completed_count(&self) -> usize {
        self.latest.values().filter(|p| p.is_complete).count()
    }

    /// `(completed + in-progress fraction) / denominator * 100`, clamped.
    ///
    /// Can drop when a newly discovered plate grows the denominator; see
    /// [`display_percent`](Self::display_percent).
    pub fn overall_percent(&self) -> f32 {
        let denominator = self.denominator();
        if denominator == 0 {
            return 0.0;
        }
        let fractional: f32 = self
            .latest
            .values()
            .filter(|p| !p.is_complete)
            .map(|p| p.progress_percent / 100.0)
            .sum();
        let value = (self.completed_count() as f32 + fractional) / denominator as f32 * 100.0;
        value.clamp(0.0, 100.0)
    }

    /// High-water mark of [`overall_percent`](Self::overall_percent) for
    /// progress bars; never decreases.
    pub fn display_percent(&self) -> f32 {
        self.high_water
    }

    pub fn failed_plates(&self) -> Vec<u32> {
        self.latest
            .values()
            .filter(|p| p.is_error())
            .map(|p| p.plate_index)
            .collect()
    }

    /// Projects finished plates onto a plate list.
    ///
    /// Completed plates get their estimates, failed plates an error marker,
    /// and plates discovered mid-stream are appended.
    pub fn merge_into(&self, plates: &[PlateInfo]) -> Vec<PlateInfo> {
        let mut merged: BTreeMap<u32, PlateInfo> = plates
            .iter()
            .map(|p| (p.plate_index, p.clone()))
            .collect();

        for progress in self.latest.values().filter(|p| p.is_complete) {
            let plate = merged
                .entry(progress.plate_index)
                .or_insert_with(|| PlateInfo::new(progress.plate_index, 0));
            match &progress.error {
                Some(message) => plate.slice_error = Some(message.clone()),
                None => plate.apply_estimates(&progress.estimates),
            }
        }

        merged.into_values().collect()
    }
}
