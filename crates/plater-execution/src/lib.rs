//! Execution layer for Plater.
//!
//! Drives the slicing engine. All plates of all sessions go through one
//! global queue so the engine never runs more than one plate at a time.

mod worker;

pub use worker::PlateWorkerQueue;
