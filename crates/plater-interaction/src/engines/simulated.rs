//! Stand-in engine that derives progress from a plate's object count.
//!
//! Only used when configured explicitly (`engine.kind = "simulated"`); it is
//! never substituted for an unavailable slicer.

use async_trait::async_trait;
use plater_core::config::EngineConfig;
use plater_core::engine::{EngineFailure, EngineNotification, NotificationSink, PlateJob, SlicingEngine};
use plater_core::plate::Estimates;
use std::time::Duration;

const STEPS: u32 = 10;
const PRINT_SECONDS_PER_OBJECT: u64 = 1800;
const GRAMS_PER_OBJECT: f64 = 6.5;
/// Upper bound on the simulated time for a single plate.
const MAX_PLATE_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

pub struct SimulatedSlicingEngine {
    seconds_per_object: f64,
}

impl SimulatedSlicingEngine {
    pub fn new(seconds_per_object: f64) -> Self {
        Self {
            seconds_per_object: if seconds_per_object.is_finite() {
                seconds_per_object.max(0.0)
            } else {
                0.0
            },
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.seconds_per_object)
    }

    /// Total simulated slicing time for a plate, capped at one day. Empty
    /// plates count as one object.
    pub fn duration_for(&self, object_count: u32) -> Duration {
        Duration::try_from_secs_f64(object_count.max(1) as f64 * self.seconds_per_object)
            .map(|duration| duration.min(MAX_PLATE_DURATION))
            .unwrap_or(MAX_PLATE_DURATION)
    }

    fn estimates_for(object_count: u32) -> Estimates {
        let objects = object_count.max(1);
        Estimates::new(
            Some(objects as u64 * PRINT_SECONDS_PER_OBJECT),
            Some(objects as f64 * GRAMS_PER_OBJECT),
        )
    }
}

#[async_trait]
impl SlicingEngine for SimulatedSlicingEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn slice(
        &self,
        job: PlateJob,
        notifications: NotificationSink,
    ) -> Result<Estimates, EngineFailure> {
        let step = self.duration_for(job.object_count) / STEPS;
        for i in 0..STEPS {
            tokio::time::sleep(step).await;
            let percent = (i + 1) as f32 * 100.0 / STEPS as f32;
            let _ = notifications.send(EngineNotification::new(
                "slicing",
                percent,
                format!("step {}/{}", i + 1, STEPS),
            ));
        }
        Ok(Self::estimates_for(job.object_count))
    }
}
