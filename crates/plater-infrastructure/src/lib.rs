//! Infrastructure layer for Plater.
//!
//! File-backed configuration, platform paths and the in-memory plate
//! registry used by the server and the CLI.

pub mod config_service;
pub mod manifest;
pub mod paths;
pub mod plate_registry;

pub use config_service::ConfigService;
pub use manifest::ModelManifest;
pub use paths::{PathError, PlaterPaths};
pub use plate_registry::InMemoryPlateRegistry;
