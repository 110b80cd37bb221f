//! The per-worker run loop.
//!
//! Each pooled [`Worker`] is owned by exactly one wrapper, which runs it on
//! a dedicated thread and speaks the pool's handoff protocol on its behalf:
//! advertise readiness, accept one job, hand back one result, and retire on
//! request. The wrapper also owns the worker's idle timer and its
//! interruption episodes.

use crate::{Worker, WorkerId};
use crate::pool::request::{Completion, InterruptGate, JobEnvelope, Offer};
use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pool-side handle to one wrapper: stop it, then wait for it to finish.
///
/// Stopping and joining are split so a batch of wrappers can all be told to
/// stop before any of them is waited on; shrinking by k workers then costs
/// roughly one shutdown, not k.
pub(crate) struct WrapperHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WrapperHandle {
    /// Signals the wrapper to exit after its current protocol step.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel, which every
        // blocking point in the run loop watches.
        self.stop_tx = None;
    }

    /// Blocks until the wrapper's thread has exited. A worker that panicked
    /// mid-job still joins cleanly; the shrink must always complete.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!("worker thread panicked before shutdown");
            }
        }
    }
}

/// Constructs a wrapper around `worker` and starts its thread.
pub(crate) fn spawn<W: Worker>(
    id: WorkerId,
    worker: W,
    idle_timeout: Duration,
    offer_tx: Sender<Offer<W>>,
    idle_tx: Sender<WorkerId>,
) -> WrapperHandle {
    let (stop_tx, stop_rx) = bounded(0);
    let (job_tx, job_rx) = bounded(0);
    let (ret_tx, ret_rx) = bounded(0);

    let wrapper = Wrapper {
        id: id.clone(),
        worker,
        idle_timeout,
        offer_tx,
        idle_tx,
        stop_rx,
        job_tx,
        job_rx,
        ret_tx,
        ret_rx,
        gate: InterruptGate::new(),
    };

    let thread = thread::Builder::new()
        .name(format!("tidepool-{id}"))
        .spawn(move || wrapper.run())
        .expect("failed to spawn worker thread");

    WrapperHandle {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    }
}

struct Wrapper<W: Worker> {
    id: WorkerId,
    worker: W,
    idle_timeout: Duration,

    /// Shared handoff channel; every ready worker in the pool offers here.
    offer_tx: Sender<Offer<W>>,
    /// Idle-eviction notifications, keyed by worker id.
    idle_tx: Sender<WorkerId>,
    stop_rx: Receiver<()>,

    // Both halves of the private job and result channels live here for the
    // wrapper's whole life. Offers carry clones of the caller halves; the
    // wrapper keeping its own clones means an abandoned offer can never
    // disconnect them.
    job_tx: Sender<JobEnvelope<W>>,
    job_rx: Receiver<JobEnvelope<W>>,
    ret_tx: Sender<W::Output>,
    ret_rx: Receiver<W::Output>,

    gate: InterruptGate,
}

impl<W: Worker> Wrapper<W> {
    fn run(mut self) {
        #[cfg(feature = "tracing")]
        tracing::trace!("worker {} started", self.id);

        loop {
            // NOTE: blocking here keeps the worker out of the handoff
            // rotation until it can actually take a job.
            self.worker.block_until_ready();

            // The idle timer measures time spent offering, so it re-arms on
            // every pass.
            let idle_at = after(self.idle_timeout);
            let offer = Offer {
                job_tx: self.job_tx.clone(),
                ret_rx: self.ret_rx.clone(),
                interrupt: self.gate.handle(self.worker.interrupter()),
            };

            select! {
                send(self.offer_tx, offer) -> res => {
                    if res.is_err() {
                        // The pool itself is gone; nothing left to serve.
                        break;
                    }
                    self.serve();
                }
                recv(idle_at) -> _ => {
                    // Report ready-but-unused and loop back around. The pool
                    // decides whether that means eviction; a stop must be
                    // able to win this race even if the controller is busy.
                    select! {
                        send(self.idle_tx, self.id.clone()) -> _ => {}
                        recv(self.stop_rx) -> _ => break,
                    }
                }
                recv(self.stop_rx) -> _ => break,
            }
        }

        self.worker.terminate();
        #[cfg(feature = "tracing")]
        tracing::trace!("worker {} stopped", self.id);
    }

    /// Runs one accepted handoff to completion.
    ///
    /// The caller holding the offer is committed to exactly one of: deliver
    /// a job envelope, or fire the interrupter. Stop signals are not
    /// consulted until the episode resolves, which is what bounds a shrink
    /// at one in-flight job per worker.
    fn serve(&mut self) {
        select! {
            recv(self.job_rx) -> envelope => {
                let envelope = envelope
                    .expect("job channel disconnected while the wrapper holds a sender");
                let output = self.worker.process(envelope.payload);
                match envelope.done {
                    Completion::Callback(complete) => complete(output),
                    Completion::Return => select! {
                        send(self.ret_tx, output) -> _ => {}
                        recv(self.gate.fired()) -> _ => {
                            // The caller walked away before collecting the
                            // result. Discard it and arm a fresh episode so
                            // this one can never trip again.
                            self.gate.rearm();
                        }
                    },
                }
            }
            recv(self.gate.fired()) -> _ => self.gate.rearm(),
        }
    }
}
