//! Slicing engine boundary.
//!
//! The engine is an opaque black box invoked once per plate. Adapters live in
//! `plater-interaction`; this module only fixes the contract.

mod failure;

pub use failure::{EngineFailure, EngineFailureKind};

use crate::plate::Estimates;
use crate::request::FilamentMapping;
use crate::session::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

/// Input for a single plate invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateJob {
    pub session_id: SessionId,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    pub plate_index: u32,
    #[serde(default)]
    pub object_count: u32,
    pub mappings: Vec<FilamentMapping>,
    pub build_plate_type: String,
}

/// Intermediate notification emitted by an engine while slicing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineNotification {
    /// Overrides the job's plate when the engine reports on a plate it
    /// discovered on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_index: Option<u32>,
    pub phase: String,
    pub percent: f32,
    #[serde(default)]
    pub message: String,
}

impl EngineNotification {
    pub fn new(phase: impl Into<String>, percent: f32, message: impl Into<String>) -> Self {
        Self {
            plate_index: None,
            phase: phase.into(),
            percent,
            message: message.into(),
        }
    }

    pub fn for_plate(mut self, plate_index: u32) -> Self {
        self.plate_index = Some(plate_index);
        self
    }
}

/// Sender half handed to engines for intermediate notifications.
pub type NotificationSink = UnboundedSender<EngineNotification>;

/// An external slicing engine.
///
/// Implementations send zero or more notifications on `notifications` and
/// then resolve to the plate's terminal outcome. Dropping the returned future
/// must be safe; callers drop it when a session is cancelled or times out.
#[async_trait]
pub trait SlicingEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn slice(
        &self,
        job: PlateJob,
        notifications: NotificationSink,
    ) -> Result<Estimates, EngineFailure>;
}
