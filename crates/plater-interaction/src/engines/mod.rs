mod cli;
mod simulated;

pub use cli::CliSlicingEngine;
pub use simulated::SimulatedSlicingEngine;

use plater_core::config::{EngineConfig, EngineKind};
use plater_core::engine::SlicingEngine;
use std::sync::Arc;

/// Builds the engine selected in configuration.
pub fn build_engine(config: &EngineConfig) -> Arc<dyn SlicingEngine> {
    match config.kind {
        EngineKind::Cli => Arc::new(CliSlicingEngine::from_config(config)),
        EngineKind::Simulated => Arc::new(SimulatedSlicingEngine::from_config(config)),
    }
}
