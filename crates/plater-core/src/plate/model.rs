//! Plate domain model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Time and material estimates produced by a successful plate slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_grams: Option<f64>,
}

impl Estimates {
    pub fn new(prediction_seconds: Option<u64>, weight_grams: Option<f64>) -> Self {
        Self {
            prediction_seconds,
            weight_grams,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prediction_seconds.is_none() && self.weight_grams.is_none()
    }
}

/// One independently sliceable build-plate layout within a model file.
///
/// Produced by model analysis. The estimate fields and `slice_error` are the
/// only fields the slicing subsystem writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateInfo {
    pub plate_index: u32,
    #[serde(default)]
    pub object_count: u32,
    #[serde(default)]
    pub has_support: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_grams: Option<f64>,
    /// Filament slots used by this plate. Empty means "all mappings apply".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filament_indices: Vec<u32>,
    /// Error marker left by the last failed slice of this plate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_error: Option<String>,
}

impl PlateInfo {
    pub fn new(plate_index: u32, object_count: u32) -> Self {
        Self {
            plate_index,
            object_count,
            has_support: false,
            name: None,
            prediction_seconds: None,
            weight_grams: None,
            filament_indices: Vec::new(),
            slice_error: None,
        }
    }

    /// Applies estimates from a completed slice and clears any stale error marker.
    ///
    /// Fields missing from `estimates` keep their previous value.
    pub fn apply_estimates(&mut self, estimates: &Estimates) {
        if let Some(seconds) = estimates.prediction_seconds {
            self.prediction_seconds = Some(seconds);
        }
        if let Some(grams) = estimates.weight_grams {
            self.weight_grams = Some(grams);
        }
        self.slice_error = None;
    }

    pub fn estimates(&self) -> Estimates {
        Estimates::new(self.prediction_seconds, self.weight_grams)
    }
}

/// A submitted model file and the plates model analysis found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub file_id: String,
    /// Location handed to the slicing engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, rename = "plate")]
    pub plates: Vec<PlateInfo>,
}

impl ModelRecord {
    pub fn new(file_id: impl Into<String>, plates: Vec<PlateInfo>) -> Self {
        Self {
            file_id: file_id.into(),
            path: None,
            plates,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn plate(&self, plate_index: u32) -> Option<&PlateInfo> {
        self.plates.iter().find(|p| p.plate_index == plate_index)
    }

    /// Plate indices in ascending order.
    pub fn plate_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.plates.iter().map(|p| p.plate_index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
