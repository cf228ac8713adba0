//! In-memory plate registry.

use async_trait::async_trait;
use plater_core::error::Result;
use plater_core::plate::{Estimates, ModelRecord, PlateInfo, PlateRegistry};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Model catalog held in memory.
///
/// Populated by model analysis (or a manifest) through [`register`], then
/// updated by slice completions. Writes for a plate are last-write-wins.
///
/// [`register`]: InMemoryPlateRegistry::register
#[derive(Debug, Default)]
pub struct InMemoryPlateRegistry {
    models: RwLock<HashMap<String, ModelRecord>>,
}

impl InMemoryPlateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: impl IntoIterator<Item = ModelRecord>) -> Self {
        Self {
            models: RwLock::new(
                models
                    .into_iter()
                    .map(|model| (model.file_id.clone(), model))
                    .collect(),
            ),
        }
    }

    /// Adds or replaces a model.
    pub async fn register(&self, model: ModelRecord) {
        tracing::debug!(
            file_id = %model.file_id,
            plates = model.plates.len(),
            "[PlateRegistry] model registered"
        );
        let mut models = self.models.write().await;
        models.insert(model.file_id.clone(), model);
    }

    pub async fn file_ids(&self) -> Vec<String> {
        let models = self.models.read().await;
        let mut ids: Vec<String> = models.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Applies `update` to a plate, creating the plate if the engine found one
    /// model analysis did not.
    async fn with_plate(&self, file_id: &str, plate_index: u32, update: impl FnOnce(&mut PlateInfo)) {
        let mut models = self.models.write().await;
        let Some(model) = models.get_mut(file_id) else {
            tracing::warn!(file_id, plate_index, "[PlateRegistry] write for unknown file ignored");
            return;
        };

        match model.plates.iter_mut().find(|p| p.plate_index == plate_index) {
            Some(plate) => update(plate),
            None => {
                tracing::info!(file_id, plate_index, "[PlateRegistry] adding discovered plate");
                let mut plate = PlateInfo::new(plate_index, 0);
                update(&mut plate);
                model.plates.push(plate);
                model.plates.sort_by_key(|p| p.plate_index);
            }
        }
    }
}

#[async_trait]
impl PlateRegistry for InMemoryPlateRegistry {
    async fn find_model(&self, file_id: &str) -> Result<Option<ModelRecord>> {
        let models = self.models.read().await;
        Ok(models.get(file_id).cloned())
    }

    async fn update_estimates(
        &self,
        file_id: &str,
        plate_index: u32,
        estimates: &Estimates,
    ) -> Result<()> {
        self.with_plate(file_id, plate_index, |plate| plate.apply_estimates(estimates))
            .await;
        Ok(())
    }

    async fn mark_plate_error(&self, file_id: &str, plate_index: u32, message: &str) -> Result<()> {
        self.with_plate(file_id, plate_index, |plate| {
            plate.slice_error = Some(message.to_string());
        })
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> InMemoryPlateRegistry {
        InMemoryPlateRegistry::with_models([ModelRecord::new(
            "f1",
            vec![PlateInfo::new(1, 2), PlateInfo::new(2, 1)],
        )])
    }

    #[tokio::test]
    async fn test_update_estimates() {
        let registry = registry();
        registry
            .update_estimates("f1", 2, &Estimates::new(Some(1200), Some(8.4)))
            .await
            .unwrap();

        let plates = registry.plates("f1").await.unwrap().unwrap();
        assert_eq!(plates[1].prediction_seconds, Some(1200));
        assert_eq!(plates[1].weight_grams, Some(8.4));
        assert_eq!(plates[0].prediction_seconds, None);
    }

    #[tokio::test]
    async fn test_discovered_plate_is_inserted_in_order() {
        let registry = registry();
        registry
            .update_estimates("f1", 5, &Estimates::new(Some(60), None))
            .await
            .unwrap();
        registry.mark_plate_error("f1", 3, "unsupported material").await.unwrap();

        let model = registry.find_model("f1").await.unwrap().unwrap();
        assert_eq!(model.plate_indices(), vec![1, 2, 3, 5]);
        assert_eq!(
            model.plate(3).and_then(|p| p.slice_error.clone()).as_deref(),
            Some("unsupported material")
        );
    }

    #[tokio::test]
    async fn test_success_clears_error_marker() {
        let registry = registry();
        registry.mark_plate_error("f1", 1, "bad params").await.unwrap();
        registry
            .update_estimates("f1", 1, &Estimates::new(Some(30), None))
            .await
            .unwrap();

        let model = registry.find_model("f1").await.unwrap().unwrap();
        assert!(model.plate(1).unwrap().slice_error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let registry = registry();
        assert!(registry.find_model("nope").await.unwrap().is_none());
        // writes for unknown files are dropped, not errors
        assert!(registry.mark_plate_error("nope", 1, "x").await.is_ok());
        assert_eq!(registry.file_ids().await, vec!["f1".to_string()]);
    }
}
