use super::model::SessionId;
use crate::engine::PlateJob;
use crate::error::Result;

/// All plates of one session, in the order they must be sliced.
#[derive(Debug, Clone)]
pub struct SessionJob {
    pub session_id: SessionId,
    pub file_id: String,
    pub plates: Vec<PlateJob>,
}

/// Global, sequential queue of plate work.
///
/// Implemented by the execution layer. The session manager only enqueues;
/// results flow back through the session store.
pub trait PlateJobQueue: Send + Sync {
    /// Appends a session's plates to the queue without blocking.
    fn enqueue(&self, job: SessionJob) -> Result<()>;
}
