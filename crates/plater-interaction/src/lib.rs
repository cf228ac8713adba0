//! Slicing engine adapters.
//!
//! - [`CliSlicingEngine`]: drives an external slicer executable, one process per plate
//! - [`SimulatedSlicingEngine`]: object-count based stand-in for development
//!
//! [`build_engine`] picks one from configuration.

pub mod engines;

pub use engines::{CliSlicingEngine, SimulatedSlicingEngine, build_engine};
