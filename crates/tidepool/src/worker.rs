use core::marker::PhantomData;
use std::sync::Arc;

/// A handle that can abort a worker's in-flight `process` call from another
/// thread.
///
/// The handle is deliberately separate from [`Worker`]: `process` holds
/// `&mut self` on the worker's own thread for its entire duration, so
/// cancellation has to travel through a second, independently owned object.
/// Implementations typically share some signalling primitive (a channel, a
/// flag, a socket shutdown handle) with the worker they belong to.
///
/// Interruption is best-effort: the pool only promises to *invoke* the
/// handle when a caller abandons a job; whether and how `process` unblocks
/// is up to the worker implementation.
pub trait Interrupter: Send + 'static {
    /// Requests that the worker's current `process` call return early.
    fn interrupt(&self);
}

/// An [`Interrupter`] that does nothing.
///
/// The right choice for workers whose `process` cannot be unblocked
/// externally. Deadline-bounded callers will still stop waiting on such a
/// worker; the worker simply finishes its job unobserved.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopInterrupter;

impl Interrupter for NopInterrupter {
    fn interrupt(&self) {}
}

/// A working agent owned by a pool.
///
/// Each worker is driven by a dedicated thread: it is asked to block until
/// ready, is handed one job at a time, and is terminated when removed from
/// the pool. The pool never interprets payloads or outputs; both are opaque
/// to it.
///
/// `block_until_ready` and `terminate` have empty defaults and only need to
/// be written when a worker warms up state between jobs or holds resources
/// worth releasing.
pub trait Worker: Send + 'static {
    /// The job input this worker accepts.
    type Payload: Send + 'static;
    /// The result this worker produces.
    type Output: Send + 'static;
    /// The cancellation handle bundled with each handoff this worker makes.
    type Interrupter: Interrupter;

    /// Synchronously performs one job and returns the result.
    fn process(&mut self, payload: Self::Payload) -> Self::Output;

    /// Called before each handoff; must block until the worker is ready for
    /// its next job.
    fn block_until_ready(&mut self) {}

    /// Returns a fresh cancellation handle for this worker. Workers that
    /// cannot be interrupted return [`NopInterrupter`].
    fn interrupter(&self) -> Self::Interrupter;

    /// Called exactly once when the worker is removed from the pool, to
    /// release any held resources.
    fn terminate(&mut self) {}
}

/// A minimal [`Worker`] that wraps a plain function.
///
/// Every worker in the pool shares one closure through an [`Arc`], so the
/// function must be callable through `&self`. Construct pools of these with
/// [`Pool::from_fn`].
///
/// [`Pool::from_fn`]: crate::Pool::from_fn
pub struct ClosureWorker<F, P, O> {
    f: Arc<F>,
    _io: PhantomData<fn(P) -> O>,
}

impl<F, P, O> ClosureWorker<F, P, O>
where
    F: Fn(P) -> O,
{
    /// Creates a worker processing jobs with the shared closure `f`.
    pub fn new(f: Arc<F>) -> Self {
        Self {
            f,
            _io: PhantomData,
        }
    }
}

impl<F, P, O> Worker for ClosureWorker<F, P, O>
where
    F: Fn(P) -> O + Send + Sync + 'static,
    P: Send + 'static,
    O: Send + 'static,
{
    type Payload = P;
    type Output = O;
    type Interrupter = NopInterrupter;

    fn process(&mut self, payload: P) -> O {
        (self.f)(payload)
    }

    fn interrupter(&self) -> NopInterrupter {
        NopInterrupter
    }
}

/// A deferred unit of work accepted by [`CallbackWorker`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A [`Worker`] whose payloads are the jobs themselves.
///
/// Each payload is a boxed closure that the worker simply runs. Construct
/// pools of these with [`Pool::callback`].
///
/// [`Pool::callback`]: crate::Pool::callback
#[derive(Clone, Copy, Debug, Default)]
pub struct CallbackWorker;

impl Worker for CallbackWorker {
    type Payload = Job;
    type Output = ();
    type Interrupter = NopInterrupter;

    fn process(&mut self, job: Job) {
        job();
    }

    fn interrupter(&self) -> NopInterrupter {
        NopInterrupter
    }
}
