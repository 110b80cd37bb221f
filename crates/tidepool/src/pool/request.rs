use crate::{Interrupter, Worker};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use std::sync::Arc;

/// How a finished job's output leaves the worker.
pub(crate) enum Completion<O> {
    /// Deliver the output on the worker's private result channel; the
    /// submitting caller is blocked on the other end.
    Return,
    /// Fire-and-forget submission: invoke this hook on the worker's thread
    /// and never touch the result channel.
    Callback(Box<dyn FnOnce(O) + Send + 'static>),
}

/// The payload plus completion metadata moved from a caller to exactly one
/// worker. Created per submission, consumed by the serving worker, gone once
/// the worker reports completion.
pub(crate) struct JobEnvelope<W: Worker> {
    pub payload: W::Payload,
    pub done: Completion<W::Output>,
}

/// A message advertising that a specific worker is ready to accept exactly
/// one job.
///
/// Offers travel over a zero-capacity channel, so one is never buffered: it
/// either rendezvouses with a caller or it never left the worker. The
/// consuming caller commits to exactly one follow-up — deliver a
/// [`JobEnvelope`] on `job_tx`, or fire `interrupt` and walk away.
pub(crate) struct Offer<W: Worker> {
    /// Sends the job to the worker that made this offer.
    pub job_tx: Sender<JobEnvelope<W>>,
    /// Reads the result from the worker that made this offer.
    pub ret_rx: Receiver<W::Output>,
    /// Cancels the job this offer began. After firing it, the caller must
    /// not read from `ret_rx`.
    pub interrupt: OfferInterrupter<W::Interrupter>,
}

/// The worker-side anchor of one interruption episode.
///
/// Each episode owns a fresh zero-capacity channel whose sender sits in a
/// shared slot. Firing the episode drops that sender, which the worker's
/// loop observes as a disconnect on [`InterruptGate::fired`]. Once an
/// episode is spent the worker installs a brand-new channel *and* a
/// brand-new slot: a stale handle still pointing at the old slot finds it
/// empty and stays inert, so no episode can ever fire twice.
pub(crate) struct InterruptGate {
    slot: Arc<Mutex<Option<Sender<()>>>>,
    fired_rx: Receiver<()>,
}

impl InterruptGate {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            slot: Arc::new(Mutex::new(Some(tx))),
            fired_rx: rx,
        }
    }

    /// The receiver that becomes ready (by disconnecting) when the current
    /// episode's handle fires. Nothing is ever sent on it.
    pub fn fired(&self) -> &Receiver<()> {
        &self.fired_rx
    }

    /// Replaces the spent episode with a fresh one.
    pub fn rearm(&mut self) {
        *self = Self::new();
    }

    /// Builds the caller-side handle bundled into the next offer, pairing
    /// the current episode with the worker's own [`Interrupter`].
    pub fn handle<I: Interrupter>(&self, worker: I) -> OfferInterrupter<I> {
        OfferInterrupter {
            slot: Arc::clone(&self.slot),
            worker,
        }
    }
}

/// The caller-side interrupt function bundled with one [`Offer`].
pub(crate) struct OfferInterrupter<I: Interrupter> {
    slot: Arc<Mutex<Option<Sender<()>>>>,
    worker: I,
}

impl<I: Interrupter> OfferInterrupter<I> {
    /// Abandons the handoff this offer began: tears down the worker's
    /// current interruption episode, then asks the worker itself to unblock.
    /// Consumes the handle, so a single offer can only be cancelled once.
    pub fn fire(self) {
        drop(self.slot.lock().take());
        self.worker.interrupt();
    }
}
