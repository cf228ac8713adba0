//! Slice session domain module.
//!
//! # Module Structure
//!
//! - `model`: `SliceSession`, its `SessionState` machine and per-plate `PlateProgress`
//! - `event`: `ProgressEvent`, the wire-level stream variants
//! - `queue`: `PlateJobQueue`, the seam between session management and plate execution

mod event;
mod model;
mod queue;

pub use event::ProgressEvent;
pub use model::{PlateProgress, SessionId, SessionState, SliceSession};
pub use queue::{PlateJobQueue, SessionJob};
