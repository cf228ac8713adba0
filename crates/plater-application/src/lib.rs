//! Application layer for Plater.
//!
//! Coordinates slice sessions on top of the domain types: session
//! bookkeeping and progress delivery, the watchdog, and the debounced
//! auto-trigger that reacts to configuration edits.

pub mod auto_trigger;
pub mod session;

pub use auto_trigger::{AutoTriggerController, ObserveOutcome};
pub use session::{
    ManagerSettings, ProgressSubscription, SessionStore, SliceSessionManager, SliceStarter,
};
