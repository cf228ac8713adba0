//! Slice session lifecycle.
//!
//! # Module Structure
//!
//! - `channel`: per-session single-consumer progress channel
//! - `store`: in-memory session table shared with the plate worker
//! - `manager`: `SliceSessionManager`, the public entry point

mod channel;
mod manager;
mod store;

pub use channel::{ProgressChannel, ProgressSubscription};
pub use manager::{ManagerSettings, SliceSessionManager, SliceStarter, SweepReport};
pub use store::{PurgedSession, SessionStore};
