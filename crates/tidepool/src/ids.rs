use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// A stable identifier naming one pooled worker.
///
/// Cheap to clone; used as the pool's map key and as the token a worker
/// reports on the idle-eviction channel.
pub type WorkerId = Arc<str>;

/// A source of process-unique worker identifiers.
///
/// The pool asks its id source for a fresh identifier once per worker, at
/// construction time. This is an explicitly constructed, injected service
/// rather than process-global state, so two pools can carry independent
/// sources (or share one) and tests can observe exactly which ids were
/// issued.
///
/// # Example
///
/// ```
/// use tidepool::{IdSource, WorkerId};
///
/// struct Fixed;
/// impl IdSource for Fixed {
///     fn next_id(&self) -> WorkerId {
///         "only".into()
///     }
/// }
///
/// assert_eq!(&*Fixed.next_id(), "only");
/// ```
pub trait IdSource: Send + Sync + 'static {
    /// Returns a fresh identifier, unique within this source.
    fn next_id(&self) -> WorkerId;
}

/// The default [`IdSource`]: a prefixed atomic counter.
///
/// Produces `"worker-0"`, `"worker-1"`, ... for the default prefix. Ids are
/// unique for the lifetime of the source, so workers constructed after a
/// shrink never reuse an evicted worker's name.
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    /// Creates a source issuing `"{prefix}-{n}"` for n = 0, 1, 2, ...
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("worker")
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> WorkerId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sequential_ids_are_unique_and_prefixed() {
        let ids = SequentialIds::new("w");
        let issued: HashSet<_> = (0..64).map(|_| ids.next_id()).collect();
        assert_eq!(issued.len(), 64);
        assert!(issued.iter().all(|id| id.starts_with("w-")));
    }

    #[test]
    fn sequential_ids_are_unique_across_threads() {
        let ids = Arc::new(SequentialIds::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ids = Arc::clone(&ids);
            handles.push(std::thread::spawn(move || {
                (0..128).map(|_| ids.next_id()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 8 * 128);
    }
}
