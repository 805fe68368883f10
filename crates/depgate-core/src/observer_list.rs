#![forbid(unsafe_code)]

//! Thread-safe observer fan-out with per-observer delivery sequences.
//!
//! # Design
//!
//! Each registration pairs an observer with the
//! [`TaskRunner`](crate::TaskRunner) it wants to be called on.
//! [`ObserverList::notify`] snapshots the registrations and posts one task
//! per observer to that observer's runner; it never calls an
//! observer inline, so notifying from inside a lock-free or re-entrant
//! context is always safe.
//!
//! # Invariants
//!
//! 1. Registration and removal are safe from any thread.
//! 2. Observers sharing a runner are notified in registration order.
//! 3. After [`remove_observer`](ObserverList::remove_observer) returns, the
//!    observer is not invoked again, including for notifications that were
//!    already posted but not yet delivered.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::sequence::SharedRunner;

/// Identifier returned by [`ObserverList::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Raw numeric value (for logging).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

struct Entry<O: ?Sized> {
    id: ObserverId,
    observer: Arc<O>,
    runner: SharedRunner,
    live: Arc<AtomicBool>,
}

impl<O: ?Sized> Clone for Entry<O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            observer: Arc::clone(&self.observer),
            runner: Arc::clone(&self.runner),
            live: Arc::clone(&self.live),
        }
    }
}

/// A registry of observers of type `O` (usually a `dyn Trait`).
pub struct ObserverList<O: ?Sized> {
    entries: Mutex<Vec<Entry<O>>>,
    next_id: AtomicU64,
}

impl<O: ?Sized> Default for ObserverList<O> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<O: ?Sized + Send + Sync + 'static> std::fmt::Debug for ObserverList<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}

impl<O: ?Sized + Send + Sync + 'static> ObserverList<O> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`, to be notified on `runner`.
    pub fn add_observer(&self, observer: Arc<O>, runner: SharedRunner) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push(Entry {
            id,
            observer,
            runner,
            live: Arc::new(AtomicBool::new(true)),
        });
        id
    }

    /// Unregister an observer. Returns `false` if `id` was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut entries = self.entries();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = entries.remove(pos);
        entry.live.store(false, Ordering::Release);
        true
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Post `f` to every registered observer on its own runner.
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&O) + Send + Sync + 'static,
    {
        let snapshot: Vec<Entry<O>> = self.entries().clone();
        if snapshot.is_empty() {
            return;
        }
        let f = Arc::new(f);
        for entry in snapshot {
            let f = Arc::clone(&f);
            let observer = Arc::clone(&entry.observer);
            let live = Arc::clone(&entry.live);
            let posted = entry.runner.post_task(Box::new(move || {
                if live.load(Ordering::Acquire) {
                    f(&observer);
                }
            }));
            if let Err(err) = posted {
                tracing::debug!(
                    message = "observer.delivery_dropped",
                    observer = entry.id.raw(),
                    error = %err
                );
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry<O>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
