//! The idle-eviction controller.
//!
//! A single background loop per pool. Workers that sat ready-but-unused past
//! their idle timeout report their own id here; the controller removes and
//! terminates them unless that would take the pool below its floor. This is
//! advisory pressure relief, not a hard cap: ids are handled one at a time,
//! so a burst of simultaneous idling can never over-shrink the pool.

use crate::{Worker, WorkerId};
use crate::pool::Registry;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Starts the controller thread for one pool.
///
/// The loop drains the idle channel until it fully disconnects, which
/// happens once the pool has dropped its master sender and every worker is
/// gone — so the thread can always be joined after a close.
pub(crate) fn spawn<W: Worker>(
    registry: Arc<Mutex<Registry<W>>>,
    idle_rx: Receiver<WorkerId>,
    floor: usize,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("tidepool-evictor".into())
        .spawn(move || run(registry, idle_rx, floor))
        .expect("failed to spawn idle-eviction thread")
}

fn run<W: Worker>(registry: Arc<Mutex<Registry<W>>>, idle_rx: Receiver<WorkerId>, floor: usize) {
    while let Ok(id) = idle_rx.recv() {
        // Hold the lock only for the map mutation; the reporting worker may
        // be blocked on our next recv, so stop/join must happen unlocked.
        let evicted = {
            let mut registry = registry.lock();
            if registry.members.len() > floor {
                registry.members.remove(&id)
            } else {
                None
            }
        };

        if let Some(mut wrapper) = evicted {
            #[cfg(feature = "tracing")]
            tracing::debug!("evicting idle worker {id}");
            wrapper.stop();
            wrapper.join();
        }
    }
}
