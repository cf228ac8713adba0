//! Plate registry trait.

use super::model::{Estimates, ModelRecord, PlateInfo};
use crate::error::Result;
use async_trait::async_trait;

/// Read access to analyzed models plus the narrow write-back path used when
/// plates finish slicing.
///
/// The registry is owned by model analysis; the slicing subsystem only ever
/// calls `update_estimates` and `mark_plate_error`. Writes are
/// last-terminal-event-wins per plate index.
#[async_trait]
pub trait PlateRegistry: Send + Sync {
    /// Finds a model by file id.
    ///
    /// - `Ok(Some(record))`: model known
    /// - `Ok(None)`: unknown file id
    async fn find_model(&self, file_id: &str) -> Result<Option<ModelRecord>>;

    /// Records estimates for a completed plate.
    ///
    /// Plate indices that model analysis did not know about are appended.
    async fn update_estimates(
        &self,
        file_id: &str,
        plate_index: u32,
        estimates: &Estimates,
    ) -> Result<()>;

    /// Leaves an error marker on a plate whose slice failed recoverably.
    async fn mark_plate_error(&self, file_id: &str, plate_index: u32, message: &str)
    -> Result<()>;

    /// Convenience accessor for a model's plates.
    async fn plates(&self, file_id: &str) -> Result<Option<Vec<PlateInfo>>> {
        Ok(self.find_model(file_id).await?.map(|m| m.plates))
    }
}
