//! Plate domain module.
//!
//! - `model`: `PlateInfo`, `Estimates` and the `ModelRecord` that groups a file's plates
//! - `registry`: `PlateRegistry`, the store this subsystem writes estimates back into

mod model;
mod registry;

pub use model::{Estimates, ModelRecord, PlateInfo};
pub use registry::PlateRegistry;
