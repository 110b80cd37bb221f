//! Error types for the worker pool.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the pool's handoff protocol. User jobs are never
//! inspected by the pool: whatever a worker's `process` returns is passed
//! through untouched, so job-level failures do not appear here.
//!
//! ## Error Cases
//! - `PoolClosed`: a submission was attempted (or was still waiting) after
//!   the pool shut down.
//! - `WorkerLost`: the worker serving a call went away mid-exchange.
//! - `TimedOut`: a deadline-bounded submission overran its deadline.

/// A result type defaulting to the pool's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for pool submissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The pool is not running.
    ///
    /// Submitting work to a closed pool is a caller bug, not a transient
    /// condition: the panicking submission methods abort on it, while the
    /// `try_` variants surface it as this value.
    #[error("the pool is not running")]
    PoolClosed,

    /// The worker serving this call shut down before completing the
    /// exchange. This indicates the worker's thread exited (for example
    /// because its `process` panicked) while a caller was still waiting on
    /// it.
    #[error("worker was closed")]
    WorkerLost,

    /// A deadline-bounded submission exceeded its deadline in one of its
    /// phases: acquiring a worker, delivering the job, or awaiting the
    /// result. Recoverable; the serving worker (if any) has been
    /// interrupted and returns to service.
    #[error("job request timed out")]
    TimedOut,
}
