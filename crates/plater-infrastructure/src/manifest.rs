//! TOML model manifests.
//!
//! Stand-in for model analysis when running the CLI: a `models.toml` lists
//! the files and their plates.
//!
//! ```toml
//! [[model]]
//! file_id = "benchy.3mf"
//! path = "models/benchy.3mf"
//!
//! [[model.plate]]
//! plate_index = 1
//! object_count = 3
//! filament_indices = [1, 2]
//! ```

use crate::plate_registry::InMemoryPlateRegistry;
use plater_core::error::{Result, SliceError};
use plater_core::plate::ModelRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default, rename = "model")]
    pub models: Vec<ModelRecord>,
}

impl ModelManifest {
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: ModelManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reads a manifest file. Relative model paths are resolved against the
    /// manifest's directory.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SliceError::io(format!("failed to read manifest {}: {}", path.display(), e))
        })?;
        let mut manifest = Self::parse(&content)?;

        if let Some(base) = path.parent() {
            for model in &mut manifest.models {
                if let Some(model_path) = &model.path
                    && model_path.is_relative()
                {
                    model.path = Some(base.join(model_path));
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            models = manifest.models.len(),
            "[ModelManifest] loaded"
        );
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.file_id.as_str()) {
                return Err(SliceError::config(format!(
                    "duplicate model '{}' in manifest",
                    model.file_id
                )));
            }
            let mut plates = HashSet::new();
            for plate in &model.plates {
                if !plates.insert(plate.plate_index) {
                    return Err(SliceError::config(format!(
                        "duplicate plate {} in model '{}'",
                        plate.plate_index, model.file_id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn into_registry(self) -> InMemoryPlateRegistry {
        InMemoryPlateRegistry::with_models(self.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plater_core::plate::PlateRegistry;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
        [[model]]
        file_id = "benchy.3mf"
        path = "models/benchy.3mf"

        [[model.plate]]
        plate_index = 2
        object_count = 1

        [[model.plate]]
        plate_index = 1
        object_count = 3
        has_support = true
        filament_indices = [1, 2]

        [[model]]
        file_id = "empty.3mf"
    "#;

    #[test]
    fn test_parse() {
        let manifest = ModelManifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.models.len(), 2);

        let benchy = &manifest.models[0];
        assert_eq!(benchy.plate_indices(), vec![1, 2]);
        let plate = benchy.plate(1).unwrap();
        assert!(plate.has_support);
        assert_eq!(plate.filament_indices, vec![1, 2]);
        assert!(manifest.models[1].plates.is_empty());
    }

    #[test]
    fn test_duplicate_plate_rejected() {
        let content = r#"
            [[model]]
            file_id = "a"
            [[model.plate]]
            plate_index = 1
            [[model.plate]]
            plate_index = 1
        "#;
        let err = ModelManifest::parse(content).unwrap_err();
        assert!(matches!(err, SliceError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        let registry = ModelManifest::load(&path).await.unwrap().into_registry();
        let model = registry.find_model("benchy.3mf").await.unwrap().unwrap();
        assert_eq!(model.path, Some(dir.path().join("models/benchy.3mf")));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ModelManifest::load(&dir.path().join("nope.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, SliceError::Io { .. }));
    }
}
