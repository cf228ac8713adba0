//! Domain layer for Plater.
//!
//! Pure types and traits for multi-plate slice orchestration: plate data,
//! configuration fingerprints, sessions and their progress events, the
//! slicing engine boundary and the client-side progress aggregator.

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod plate;
pub mod request;
pub mod session;

// Re-export common error type
pub use error::{FatalKind, Result, SliceError};
pub use fingerprint::{Fingerprint, fingerprint};
pub use request::{FilamentMapping, SliceRequest};
