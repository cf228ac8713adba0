pub mod fingerprint;
pub mod serve;
pub mod slice;

use anyhow::{Context, Result, bail};
use plater_core::request::{FilamentMapping, SliceRequest};

/// Parses `<filament_index>:<slot>`.
pub fn parse_mapping(value: &str) -> Result<FilamentMapping> {
    let Some((index, slot)) = value.split_once(':') else {
        bail!("mapping '{}' must look like <filament_index>:<slot>", value);
    };
    let index: u32 = index
        .trim()
        .parse()
        .with_context(|| format!("invalid filament index in '{}'", value))?;
    let slot: u32 = slot
        .trim()
        .parse()
        .with_context(|| format!("invalid slot in '{}'", value))?;
    Ok(FilamentMapping::new(index, slot))
}

pub fn build_request(
    file_id: &str,
    build_plate: &str,
    plate: Option<u32>,
    mappings: &[String],
) -> Result<SliceRequest> {
    let mappings = mappings
        .iter()
        .map(|m| parse_mapping(m))
        .collect::<Result<Vec<_>>>()?;
    Ok(SliceRequest::new(file_id, build_plate)
        .with_mappings(mappings)
        .with_selected_plate(plate))
}
