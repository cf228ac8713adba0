//! Slice request inputs.

use crate::fingerprint::{Fingerprint, fingerprint};
use serde::{Deserialize, Serialize};

/// Assignment of a model filament slot to a physical feeder slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilamentMapping {
    pub filament_index: u32,
    pub slot: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filament_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl FilamentMapping {
    pub fn new(filament_index: u32, slot: u32) -> Self {
        Self {
            filament_index,
            slot,
            filament_type: None,
            color: None,
        }
    }
}

/// Everything a client sends to start slicing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRequest {
    pub file_id: String,
    #[serde(default)]
    pub mappings: Vec<FilamentMapping>,
    pub build_plate_type: String,
    /// `None` slices every plate.
    #[serde(default)]
    pub selected_plate: Option<u32>,
}

impl SliceRequest {
    pub fn new(file_id: impl Into<String>, build_plate_type: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            mappings: Vec::new(),
            build_plate_type: build_plate_type.into(),
            selected_plate: None,
        }
    }

    pub fn with_mappings(mut self, mappings: Vec<FilamentMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_selected_plate(mut self, plate_index: Option<u32>) -> Self {
        self.selected_plate = plate_index;
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(
            &self.file_id,
            &self.mappings,
            &self.build_plate_type,
            self.selected_plate,
        )
    }

    /// Mappings relevant to a plate that uses `filament_indices`.
    ///
    /// An empty index list means the plate did not declare its filaments and
    /// receives every mapping.
    pub fn mappings_for(&self, filament_indices: &[u32]) -> Vec<FilamentMapping> {
        let mut subset: Vec<FilamentMapping> = self
            .mappings
            .iter()
            .filter(|m| filament_indices.is_empty() || filament_indices.contains(&m.filament_index))
            .cloned()
            .collect();
        subset.sort();
        subset
    }
}
