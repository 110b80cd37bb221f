//! The worker pool.
//!
//! A [`Pool`] owns a set of workers, each running on its own thread behind a
//! wrapper that speaks the pool's handoff protocol. Callers' own threads
//! drive submissions directly: a call waits for any worker to advertise
//! readiness on the shared handoff channel, delivers the job on that
//! worker's private channel, and (for synchronous submissions) waits on the
//! worker's private result channel. Channel rendezvous is the only
//! synchronization on the job path; the worker map's mutex guards nothing
//! but resizes.

mod evictor;
mod request;
mod wrapper;


use crate::pool::request::{Completion, JobEnvelope, Offer};
use crate::pool::wrapper::WrapperHandle;
use crate::{
    CallbackWorker, ClosureWorker, Error, IdSource, Result, SequentialIds, Worker, WorkerId,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, bounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long a worker may sit ready-but-unused before reporting itself for
/// eviction, unless overridden by [`Pool::with_idle_timeout`].
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// The live worker set plus the pool-held master halves of the shared
/// channels. `offer_tx` doubles as the closed flag: once it is `None`, the
/// pool accepts no further work and no further resizes.
pub(crate) struct Registry<W: Worker> {
    pub members: HashMap<WorkerId, WrapperHandle>,
    pub offer_tx: Option<crossbeam_channel::Sender<Offer<W>>>,
    pub idle_tx: Option<crossbeam_channel::Sender<WorkerId>>,
}

/// A resizable pool of workers that process jobs synchronously,
/// fire-and-forget, or under a deadline.
///
/// The pool multiplexes opaque payloads across its workers and returns
/// their opaque results; it never interprets either. Workers are pulled,
/// not pushed to: each one advertises readiness for exactly one job at a
/// time, so a slow worker never accumulates a private backlog.
///
/// Sizing is dynamic. [`Pool::set_size`] grows and shrinks the worker set
/// concurrently with in-flight traffic, and workers idle past the pool's
/// idle timeout are evicted down to the construction size.
///
/// ## Example
///
/// ```
/// use tidepool::Pool;
///
/// let pool = Pool::from_fn(4, |n: u64| n * 2);
/// assert_eq!(pool.process(21), 42);
/// pool.close();
/// ```
pub struct Pool<W: Worker, S: IdSource = SequentialIds> {
    ctor: Box<dyn Fn() -> W + Send + Sync>,
    ids: S,
    idle_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    offer_rx: Receiver<Offer<W>>,
    registry: Arc<Mutex<Registry<W>>>,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl<W: Worker> Pool<W> {
    /// Creates a pool that starts with `n` workers, each built by `ctor`.
    ///
    /// The constructor is retained: growing the pool later calls it once
    /// per added worker. Workers idle longer than
    /// [`DEFAULT_IDLE_TIMEOUT`] are evicted down to `n`.
    pub fn new(n: usize, ctor: impl Fn() -> W + Send + Sync + 'static) -> Self {
        Self::with_idle_timeout(n, ctor, DEFAULT_IDLE_TIMEOUT)
    }

    /// Like [`Pool::new`], with an explicit idle timeout after which a
    /// ready-but-unused worker reports itself for eviction.
    pub fn with_idle_timeout(
        n: usize,
        ctor: impl Fn() -> W + Send + Sync + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self::with_id_source(n, ctor, idle_timeout, SequentialIds::default())
    }
}

impl<W: Worker, S: IdSource> Pool<W, S> {
    /// The fully explicit constructor: worker count, worker constructor,
    /// idle timeout, and the [`IdSource`] that names each worker.
    pub fn with_id_source(
        n: usize,
        ctor: impl Fn() -> W + Send + Sync + 'static,
        idle_timeout: Duration,
        ids: S,
    ) -> Self {
        let (offer_tx, offer_rx) = bounded(0);
        let (idle_tx, idle_rx) = bounded(0);

        let registry = Arc::new(Mutex::new(Registry {
            members: HashMap::new(),
            offer_tx: Some(offer_tx),
            idle_tx: Some(idle_tx),
        }));

        // The construction size is the eviction floor for the pool's whole
        // life; set_size never moves it.
        let evictor = evictor::spawn(Arc::clone(&registry), idle_rx, n);

        let pool = Self {
            ctor: Box::new(ctor),
            ids,
            idle_timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
            offer_rx,
            registry,
            evictor: Mutex::new(Some(evictor)),
        };
        pool.set_size(n);
        pool
    }

    /// Processes a payload on the next available worker and returns its
    /// result, blocking until the worker finishes.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been closed, or if the serving worker's
    /// thread exits mid-exchange. Both indicate a caller bug or a panicking
    /// worker; for explicitly fallible behavior use [`Self::try_process`].
    pub fn process(&self, payload: W::Payload) -> W::Output {
        self.try_process(payload).unwrap()
    }

    /// A fallible version of [`Self::process`].
    ///
    /// Blocks until a worker becomes available, hands the payload over, and
    /// blocks again until that worker returns the result.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`]: the pool was closed before a worker could
    ///   accept the job (including while this call was already waiting).
    /// - [`Error::WorkerLost`]: the serving worker's thread exited before
    ///   delivering a result.
    pub fn try_process(&self, payload: W::Payload) -> Result<W::Output> {
        let _guard = InFlight::begin(&self.in_flight);

        let offer = self.offer_rx.recv().map_err(|_| Error::PoolClosed)?;
        let envelope = JobEnvelope {
            payload,
            done: Completion::Return,
        };
        offer.job_tx.send(envelope).map_err(|_| Error::WorkerLost)?;
        offer.ret_rx.recv().map_err(|_| Error::WorkerLost)
    }

    /// Enqueues a payload without waiting for its result.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::process`]; for
    /// explicitly fallible behavior use [`Self::try_process_async`].
    pub fn process_async(&self, payload: W::Payload) {
        self.try_process_async(payload).unwrap()
    }

    /// A fallible version of [`Self::process_async`].
    ///
    /// Returns once a worker has accepted the job; the result is discarded
    /// when the worker finishes. No guarantee is made about when the job
    /// starts beyond "after a worker became available". The in-flight
    /// counter reported by [`Self::queue_len`] stays elevated until the
    /// worker completes the job.
    ///
    /// ```
    /// use tidepool::Pool;
    ///
    /// let pool = Pool::from_fn(2, |n: i32| n + 1);
    /// pool.try_process_async(1).unwrap();
    /// while pool.queue_len() > 0 {
    ///     std::thread::yield_now();
    /// }
    /// ```
    pub fn try_process_async(&self, payload: W::Payload) -> Result<()> {
        self.submit_async(payload, None)
    }

    /// Like [`Self::try_process_async`], additionally invoking `complete`
    /// with the job's output on the worker's own thread.
    ///
    /// The hook should be brief; the worker does not return to service
    /// until it finishes.
    ///
    /// ```
    /// use tidepool::Pool;
    ///
    /// let (tx, rx) = std::sync::mpsc::channel();
    /// let pool = Pool::from_fn(2, |n: i32| n * n);
    /// pool.try_process_async_with(7, move |out| {
    ///     let _ = tx.send(out);
    /// })
    /// .unwrap();
    /// assert_eq!(rx.recv().unwrap(), 49);
    /// ```
    pub fn try_process_async_with(
        &self,
        payload: W::Payload,
        complete: impl FnOnce(W::Output) + Send + 'static,
    ) -> Result<()> {
        self.submit_async(payload, Some(Box::new(complete)))
    }

    fn submit_async(
        &self,
        payload: W::Payload,
        hook: Option<Box<dyn FnOnce(W::Output) + Send + 'static>>,
    ) -> Result<()> {
        // No RAII guard here: the count stays up until the worker reports
        // completion, so the decrement rides in the completion callback.
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let offer = match self.offer_rx.recv() {
            Ok(offer) => offer,
            Err(_) => {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                return Err(Error::PoolClosed);
            }
        };

        let in_flight = Arc::clone(&self.in_flight);
        let envelope = JobEnvelope {
            payload,
            done: Completion::Callback(Box::new(move |output| {
                in_flight.fetch_sub(1, Ordering::Relaxed);
                if let Some(hook) = hook {
                    hook(output);
                }
            })),
        };

        if offer.job_tx.send(envelope).is_err() {
            // The envelope (and its decrementing callback) died with the
            // worker, so the count must come back down here.
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::WorkerLost);
        }
        Ok(())
    }

    /// Processes a payload like [`Self::try_process`], but bounded by one
    /// deadline across all three phases: acquiring a worker, delivering the
    /// job, and awaiting the result.
    ///
    /// On a timeout in the delivery or result phase the serving worker is
    /// interrupted (best-effort, via its [`Interrupter`]) and this call
    /// returns without waiting for it any further.
    ///
    /// ```
    /// use std::time::Duration;
    /// use tidepool::Pool;
    ///
    /// let pool = Pool::from_fn(1, |n: u32| n + 1);
    /// assert_eq!(pool.process_timed(1, Duration::from_secs(5)), Ok(2));
    /// ```
    ///
    /// # Errors
    ///
    /// - [`Error::TimedOut`]: the deadline passed in any phase.
    /// - [`Error::PoolClosed`]: the pool was closed while acquiring a
    ///   worker. Unlike [`Self::process`], this is reported as a value.
    /// - [`Error::WorkerLost`]: the serving worker's thread exited
    ///   mid-exchange.
    ///
    /// [`Interrupter`]: crate::Interrupter
    pub fn process_timed(&self, payload: W::Payload, timeout: Duration) -> Result<W::Output> {
        let _guard = InFlight::begin(&self.in_flight);
        let deadline = Instant::now() + timeout;

        let offer = match self.offer_rx.recv_deadline(deadline) {
            Ok(offer) => offer,
            Err(RecvTimeoutError::Timeout) => return Err(Error::TimedOut),
            Err(RecvTimeoutError::Disconnected) => return Err(Error::PoolClosed),
        };

        let envelope = JobEnvelope {
            payload,
            done: Completion::Return,
        };
        match offer.job_tx.send_deadline(envelope, deadline) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                offer.interrupt.fire();
                return Err(Error::TimedOut);
            }
            Err(SendTimeoutError::Disconnected(_)) => return Err(Error::WorkerLost),
        }

        match offer.ret_rx.recv_deadline(deadline) {
            Ok(output) => Ok(output),
            Err(RecvTimeoutError::Timeout) => {
                offer.interrupt.fire();
                Err(Error::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerLost),
        }
    }

    /// Changes the total number of workers in the pool.
    ///
    /// Growing constructs the missing workers, each named by a fresh id
    /// from the pool's [`IdSource`]. Shrinking signals the surplus workers
    /// to stop and then waits for all of them together, so retiring k
    /// workers costs roughly one worker's shutdown latency, not k. A worker
    /// that is mid-job finishes that job first.
    ///
    /// ```
    /// use tidepool::Pool;
    ///
    /// let pool = Pool::from_fn(1, |n: i32| n);
    /// pool.set_size(4);
    /// assert_eq!(pool.get_size(), 4);
    /// pool.set_size(2);
    /// assert_eq!(pool.get_size(), 2);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the pool has been closed.
    pub fn set_size(&self, n: usize) {
        let doomed: Vec<WrapperHandle> = {
            let mut registry = self.registry.lock();
            let (offer_tx, idle_tx) = match (&registry.offer_tx, &registry.idle_tx) {
                (Some(offer_tx), Some(idle_tx)) => (offer_tx.clone(), idle_tx.clone()),
                _ => panic!("{}", Error::PoolClosed),
            };

            let current = registry.members.len();
            if n > current {
                for _ in current..n {
                    let id = self.ids.next_id();
                    let wrapper = wrapper::spawn(
                        id.clone(),
                        (self.ctor)(),
                        self.idle_timeout,
                        offer_tx.clone(),
                        idle_tx.clone(),
                    );
                    registry.members.insert(id, wrapper);
                }
                Vec::new()
            } else {
                let victims: Vec<WorkerId> =
                    registry.members.keys().take(current - n).cloned().collect();
                victims
                    .iter()
                    .filter_map(|id| registry.members.remove(id))
                    .collect()
            }
        };
        // The lock never spans a blocking wait: stopping and joining happen
        // out here, after the map already reflects the new size.
        stop_and_join(doomed);
    }

    /// Returns the current worker count. Safe to call concurrently with
    /// resizes and submissions.
    pub fn get_size(&self) -> usize {
        self.registry.lock().members.len()
    }

    /// Returns the number of jobs accepted but not yet completed.
    ///
    /// Suitable for load reporting. Workers pull jobs rather than having
    /// them pushed, so this is an in-flight count, not a queue depth.
    pub fn queue_len(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Terminates all workers and shuts the pool down.
    ///
    /// Blocks until every worker has exited and the idle-eviction
    /// controller has drained. Pending and future submissions observe
    /// [`Error::PoolClosed`] (or panic, for the panicking variants).
    /// Idempotent; also invoked by `Drop`, so an unclosed pool cannot leak
    /// threads.
    ///
    /// ```
    /// use tidepool::{Error, Pool};
    ///
    /// let pool = Pool::from_fn(2, |n: i32| n);
    /// pool.close();
    /// assert_eq!(pool.try_process(7), Err(Error::PoolClosed));
    /// ```
    pub fn close(&self) {
        let doomed: Vec<WrapperHandle> = {
            let mut registry = self.registry.lock();
            if registry.offer_tx.is_none() {
                return;
            }
            // Dropping the master senders is what lets waiting callers (and
            // the eviction loop) observe the shutdown once the workers are
            // gone too.
            registry.offer_tx = None;
            registry.idle_tx = None;
            registry.members.drain().map(|(_, wrapper)| wrapper).collect()
        };
        stop_and_join(doomed);

        if let Some(evictor) = self.evictor.lock().take() {
            let _ = evictor.join();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("pool closed");
    }
}

impl<F, P, O> Pool<ClosureWorker<F, P, O>>
where
    F: Fn(P) -> O + Send + Sync + 'static,
    P: Send + 'static,
    O: Send + 'static,
{
    /// Creates a pool of `n` workers that each process jobs with the
    /// function `f`.
    pub fn from_fn(n: usize, f: F) -> Self {
        let f = Arc::new(f);
        Self::new(n, move || ClosureWorker::new(Arc::clone(&f)))
    }
}

impl Pool<CallbackWorker> {
    /// Creates a pool of `n` workers whose payloads are the jobs
    /// themselves: each submitted [`Job`] closure is simply run.
    ///
    /// [`Job`]: crate::Job
    pub fn callback(n: usize) -> Self {
        Self::new(n, || CallbackWorker)
    }
}

impl<W: Worker, S: IdSource> Drop for Pool<W, S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Batched shutdown: all stop signals first, then all joins.
fn stop_and_join(mut doomed: Vec<WrapperHandle>) {
    for wrapper in &mut doomed {
        wrapper.stop();
    }
    for wrapper in &mut doomed {
        wrapper.join();
    }
}

/// RAII increment of the in-flight counter for the synchronous submission
/// paths, so early returns and panics can never strand the count.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn begin(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
