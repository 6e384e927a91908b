//! Job queue seam
//!
//! The engine never runs handlers itself. Handler calls and thenable coercions
//! are packaged as [`Job`]s and handed to an injected [`JobQueue`]. Whoever owns
//! the queue runs the jobs later, in submission order, against the same engine.

use crate::engine::Engine;

/// A deferred unit of work run against the engine
pub type Job = Box<dyn FnOnce(&mut Engine) + Send>;

/// FIFO job submission.
///
/// Implementations must never run the job synchronously inside `enqueue`, and
/// must run jobs in the order they were enqueued. Jobs enqueued while another
/// job runs go after everything already queued.
pub trait JobQueue: Send + Sync {
    /// Submit a job
    fn enqueue(&self, job: Job);
}
