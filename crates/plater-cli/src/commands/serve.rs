use crate::runtime::SliceRuntime;
use crate::server::{self, AppState};
use anyhow::Result;
use plater_core::config::PlaterConfig;
use plater_infrastructure::{InMemoryPlateRegistry, ModelManifest, PlaterPaths};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(config: PlaterConfig, models: Option<PathBuf>) -> Result<()> {
    let registry = load_registry(models).await?;
    let runtime = Arc::new(SliceRuntime::start(&config, registry));

    let state = AppState {
        runtime: Arc::clone(&runtime),
    };
    let result = server::serve(&config.server.bind, state).await;

    if let Ok(runtime) = Arc::try_unwrap(runtime) {
        runtime.shutdown();
    }
    result
}

/// An explicit manifest must exist; the default one is optional.
async fn load_registry(models: Option<PathBuf>) -> Result<Arc<InMemoryPlateRegistry>> {
    let (path, required) = match models {
        Some(path) => (path, true),
        None => match PlaterPaths::models_file() {
            Ok(path) => (path, false),
            Err(e) => {
                tracing::warn!("[Serve] {}; starting with an empty model catalog", e);
                return Ok(Arc::new(InMemoryPlateRegistry::new()));
            }
        },
    };

    if !required && !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "[Serve] no model manifest found; starting with an empty model catalog"
        );
        return Ok(Arc::new(InMemoryPlateRegistry::new()));
    }

    let manifest = ModelManifest::load(&path).await?;
    Ok(Arc::new(manifest.into_registry()))
}
