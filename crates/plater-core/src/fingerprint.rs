//! Configuration fingerprints.
//!
//! A fingerprint is a deterministic key over the inputs that change slicing
//! output. Two requests with equal fingerprints resolve to the same session.

use crate::request::FilamentMapping;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for v5 fingerprint ids.
const FINGERPRINT_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_4c2e_93a0_4d51_8e77_0c1d_5a9b_f2e3);

/// Sentinel used in the canonical form when every plate is requested.
const ALL_PLATES: &str = "all";

/// Opaque equality key for a slicing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a slicing configuration.
///
/// Mappings are treated as a set: input order and duplicates do not affect
/// the result.
pub fn fingerprint(
    file_id: &str,
    mappings: &[FilamentMapping],
    build_plate_type: &str,
    selected_plate: Option<u32>,
) -> Fingerprint {
    let mut sorted: Vec<&FilamentMapping> = mappings.iter().collect();
    sorted.sort();
    sorted.dedup();

    let plate = match selected_plate {
        Some(index) => index.to_string(),
        None => ALL_PLATES.to_string(),
    };

    let canonical = serde_json::json!({
        "file_id": file_id,
        "mappings": sorted,
        "build_plate_type": build_plate_type,
        "plate": plate,
    });

    let id = Uuid::new_v5(&FINGERPRINT_NAMESPACE, canonical.to_string().as_bytes());
    Fingerprint(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(index: u32, slot: u32) -> FilamentMapping {
        FilamentMapping::new(index, slot)
    }

    #[test]
    fn test_order_independent() {
        let a = fingerprint("f1", &[mapping(0, 1), mapping(1, 2)], "cool_plate", None);
        let b = fingerprint("f1", &[mapping(1, 2), mapping(0, 1)], "cool_plate", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicates_ignored() {
        let a = fingerprint("f1", &[mapping(0, 1), mapping(0, 1)], "cool_plate", None);
        let b = fingerprint("f1", &[mapping(0, 1)], "cool_plate", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_each_field_matters() {
        let base = fingerprint("f1", &[mapping(0, 1)], "cool_plate", None);
        assert_ne!(base, fingerprint("f2", &[mapping(0, 1)], "cool_plate", None));
        assert_ne!(base, fingerprint("f1", &[mapping(0, 2)], "cool_plate", None));
        assert_ne!(base, fingerprint("f1", &[mapping(0, 1)], "textured_pei", None));
        assert_ne!(base, fingerprint("f1", &[mapping(0, 1)], "cool_plate", Some(1)));
    }

    #[test]
    fn test_selected_plate_distinct_from_all() {
        let all = fingerprint("f1", &[], "cool_plate", None);
        let first = fingerprint("f1", &[], "cool_plate", Some(0));
        assert_ne!(all, first);
    }

    #[test]
    fn test_deterministic() {
        let a = fingerprint("f1", &[], "cool_plate", Some(2));
        let b = fingerprint("f1", &[], "cool_plate", Some(2));
        assert_eq!(a.as_str(), b.as_str());
    }
}
