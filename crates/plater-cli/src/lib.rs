//! The `plater` binary's building blocks.
//!
//! Kept as a library so the HTTP surface can be exercised from tests.

pub mod commands;
pub mod logging;
pub mod runtime;
pub mod server;

pub use runtime::SliceRuntime;
