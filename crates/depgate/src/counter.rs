#![forbid(unsafe_code)]

//! Atomic lease counter gating access to a component.
//!
//! # Design
//!
//! Every component owns one [`DependencyCounter`]. Its state lives in a
//! single `AtomicU32`:
//!
//! ```text
//!  31 30                                   0
//! ┌──┬──────────────────────────────────────┐
//! │E │          outstanding leases          │
//! └──┴──────────────────────────────────────┘
//! ```
//!
//! `E` is [`ENABLED_BIT`]. Weak acquisition is a compare-and-swap loop that
//! only succeeds while `E` is set, so "is enabled" and "take a lease" are one
//! atomic step and a lease can never be granted after disabling begins.
//!
//! Strong dependents are tracked in a side table protected by a mutex. The
//! mutex also serializes the enable/disable edges against strong
//! acquisition, so a dependent is either in the disable snapshot or sees the
//! counter as disabling, never neither.
//!
//! A strong dependent holds a lease only once it has been handed the
//! component. Dependents still waiting for the component to enable sit in
//! the side table without a lease, so a waiting dependent never holds up a
//! drain it is itself waiting on.
//!
//! # Invariants
//!
//! 1. The lease count never underflows; releasing an unheld lease panics.
//! 2. While `E` is clear no new weak lease is granted.
//! 3. `leases_drained` is delivered exactly once per disable, on the owning
//!    sequence, after `E` is clear and the count is zero.
//! 4. After [`detach`](DependencyCounter::detach) no acquisition yields the
//!    component value.
//!
//! # Failure Modes
//!
//! - **Lease leak**: a weak lease never released keeps the component in
//!   `Disabling` forever. Nothing times this out; the `counter.disabling`
//!   event reports the outstanding count.
//! - **Count overflow**: more than 2^31 - 1 concurrent leases panics.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use ahash::AHashSet;
use arc_swap::ArcSwapOption;
use depgate_core::{SharedRunner, run_or_post};

use crate::dependency::StrongLink;
use crate::node::{LifecycleNode, NodeRef};
use crate::state::ComponentId;

/// High bit of the counter word: set while weak leases may be granted.
pub const ENABLED_BIT: u32 = 1 << 31;

/// Mask of the lease-count bits.
pub const COUNT_MASK: u32 = ENABLED_BIT - 1;

struct Dependent<T> {
    link: Arc<StrongLink<T>>,
    generation: u64,
    leased: bool,
}

struct CounterState<T> {
    node: Option<Weak<dyn LifecycleNode>>,
    disabling: bool,
    dependents: Vec<Dependent<T>>,
}

/// Lease counter and dependent registry for one component.
pub struct DependencyCounter<T> {
    id: ComponentId,
    runner: SharedRunner,
    word: AtomicU32,
    component: ArcSwapOption<T>,
    state: Mutex<CounterState<T>>,
}

impl<T> std::fmt::Debug for DependencyCounter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCounter")
            .field("component", &self.id)
            .field("enabled", &self.is_enabled())
            .field("leases", &self.lease_count())
            .finish()
    }
}

impl<T> DependencyCounter<T> {
    /// Component this counter belongs to.
    #[must_use]
    pub fn component_id(&self) -> ComponentId {
        self.id
    }

    /// Whether weak leases are currently grantable.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.word.load(Ordering::Acquire) & ENABLED_BIT != 0
    }

    /// Outstanding weak and strong leases.
    #[must_use]
    pub fn lease_count(&self) -> u32 {
        self.word.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Registered strong dependents, leased or waiting.
    #[must_use]
    pub fn strong_dependent_count(&self) -> usize {
        self.lock().dependents.len()
    }

    fn lock(&self) -> MutexGuard<'_, CounterState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Send + Sync + 'static> DependencyCounter<T> {
    pub(crate) fn new(id: ComponentId, runner: SharedRunner, component: Arc<T>) -> Self {
        Self {
            id,
            runner,
            word: AtomicU32::new(0),
            component: ArcSwapOption::from(Some(component)),
            state: Mutex::new(CounterState {
                node: None,
                disabling: false,
                dependents: Vec::new(),
            }),
        }
    }

    pub(crate) fn attach(&self, node: Weak<dyn LifecycleNode>) {
        self.lock().node = Some(node);
    }

    /// Current component value, `None` once detached.
    pub(crate) fn component(&self) -> Option<Arc<T>> {
        self.component.load_full()
    }

    // ── Leases ──────────────────────────────────────────────────────

    /// Take a lease if the component is enabled.
    ///
    /// On success the caller owns one lease and must hand it back through
    /// [`release`](Self::release).
    pub(crate) fn weak_acquire(self: &Arc<Self>) -> Option<Arc<T>> {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            if current & ENABLED_BIT == 0 {
                return None;
            }
            assert!(
                current & COUNT_MASK != COUNT_MASK,
                "lease count overflow on component {}",
                self.id
            );
            match self.word.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        match self.component.load_full() {
            Some(component) => Some(component),
            None => {
                self.release();
                None
            }
        }
    }

    /// Return one lease.
    pub(crate) fn release(self: &Arc<Self>) {
        let prev = self.word.fetch_sub(1, Ordering::AcqRel);
        assert!(
            prev & COUNT_MASK != 0,
            "lease released on component {} with none outstanding",
            self.id
        );
        if prev == 1 {
            let counter = Arc::clone(self);
            if let Err(err) = run_or_post(&*self.runner, move || counter.finish_drain()) {
                tracing::warn!(
                    message = "counter.drain_dropped",
                    component_id = self.id.raw(),
                    error = %err
                );
            }
        }
    }

    /// Deliver `leases_drained` if a disable is waiting and nothing is
    /// outstanding. Runs on the owning sequence.
    fn finish_drain(&self) {
        let node = {
            let mut state = self.lock();
            if !state.disabling || self.word.load(Ordering::Acquire) != 0 {
                return;
            }
            state.disabling = false;
            state.node.clone()
        };
        tracing::trace!(message = "counter.drained", component_id = self.id.raw());
        if let Some(node) = node.and_then(|weak| weak.upgrade()) {
            node.leases_drained();
        }
    }

    // ── Strong dependents ───────────────────────────────────────────

    /// Register `link` as a strong dependent.
    ///
    /// If the component is enabled the link takes a lease and is told it is
    /// ready; otherwise it waits and the component is asked to enable.
    pub(crate) fn strong_acquire(self: &Arc<Self>, link: &Arc<StrongLink<T>>, generation: u64) {
        let ready_now = {
            let mut state = self.lock();
            let word = self.word.load(Ordering::Acquire);
            let ready = word & ENABLED_BIT != 0 && !state.disabling;
            if ready {
                let prev = self.word.fetch_add(1, Ordering::AcqRel);
                assert!(
                    prev & COUNT_MASK != COUNT_MASK,
                    "lease count overflow on component {}",
                    self.id
                );
            }
            state.dependents.push(Dependent {
                link: Arc::clone(link),
                generation,
                leased: ready,
            });
            ready
        };
        if ready_now {
            link.deliver_ready(generation);
        } else {
            self.request_enable();
        }
    }

    /// Unregister `link`, returning its lease if it held one.
    pub(crate) fn strong_release(self: &Arc<Self>, link: &Arc<StrongLink<T>>) {
        let leased = {
            let mut state = self.lock();
            let Some(pos) = state
                .dependents
                .iter()
                .position(|d| Arc::ptr_eq(&d.link, link))
            else {
                return;
            };
            state.dependents.remove(pos).leased
        };
        if leased {
            self.release();
        }
    }

    fn request_enable(&self) {
        let node = self.lock().node.clone();
        if let Some(node) = node {
            NodeRef::new(node, Arc::clone(&self.runner)).run("enable", |node| node.enable());
        }
    }

    // ── Edges ───────────────────────────────────────────────────────

    /// Open the counter: set [`ENABLED_BIT`] and lease the component to
    /// every waiting strong dependent.
    pub(crate) fn enable(&self) {
        let ready: Vec<(Arc<StrongLink<T>>, u64)> = {
            let mut state = self.lock();
            state.disabling = false;
            let mut ready = Vec::new();
            for dependent in state.dependents.iter_mut().filter(|d| !d.leased) {
                dependent.leased = true;
                ready.push((Arc::clone(&dependent.link), dependent.generation));
            }
            let waiting = u32::try_from(ready.len()).unwrap_or(COUNT_MASK);
            let prev = self.word.fetch_add(waiting, Ordering::AcqRel);
            assert!(
                (prev & COUNT_MASK).checked_add(waiting).is_some_and(|n| n <= COUNT_MASK),
                "lease count overflow on component {}",
                self.id
            );
            self.word.fetch_or(ENABLED_BIT, Ordering::AcqRel);
            ready
        };
        tracing::trace!(
            message = "counter.enabled",
            component_id = self.id.raw(),
            ready = ready.len()
        );
        for (link, generation) in ready {
            link.deliver_ready(generation);
        }
    }

    /// Begin draining: disable every strong dependent, clear
    /// [`ENABLED_BIT`], and deliver `leases_drained` once the count is zero.
    pub(crate) fn disable(self: &Arc<Self>) {
        let dependents: Vec<Arc<StrongLink<T>>> = {
            let mut state = self.lock();
            state.disabling = true;
            state
                .dependents
                .iter()
                .map(|d| Arc::clone(&d.link))
                .collect()
        };
        for link in &dependents {
            link.disable_owner();
        }
        let prev = self.word.fetch_and(!ENABLED_BIT, Ordering::AcqRel);
        let outstanding = prev & COUNT_MASK;
        tracing::debug!(
            message = "counter.disabling",
            component_id = self.id.raw(),
            dependents = dependents.len(),
            outstanding
        );
        if outstanding == 0 {
            self.finish_drain();
        }
    }

    /// Sever the counter from its component.
    ///
    /// Returns the component value (for the caller to drop outside any lock)
    /// and the strong dependents still registered.
    pub(crate) fn detach(&self) -> (Option<Arc<T>>, Vec<Arc<StrongLink<T>>>) {
        let leftover = {
            let mut state = self.lock();
            state.node = None;
            state.disabling = false;
            state
                .dependents
                .iter()
                .map(|d| Arc::clone(&d.link))
                .collect()
        };
        (self.component.swap(None), leftover)
    }

    /// Whether `candidate` is this component or reachable through its
    /// strong dependencies.
    pub(crate) fn depends_on(
        &self,
        candidate: ComponentId,
        visited: &mut AHashSet<ComponentId>,
    ) -> bool {
        if self.id == candidate {
            return true;
        }
        if !visited.insert(self.id) {
            return false;
        }
        let node = self.lock().node.clone().and_then(|weak| weak.upgrade());
        node.is_some_and(|node| node.depends_on(candidate, visited))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use depgate_core::LabSequence;

    fn counter(seq: &LabSequence) -> Arc<DependencyCounter<&'static str>> {
        Arc::new(DependencyCounter::new(
            ComponentId::next(),
            seq.runner(),
            Arc::new("value"),
        ))
    }

    #[test]
    fn weak_acquire_fails_while_disabled() {
        let seq = LabSequence::new();
        let c = counter(&seq);
        assert!(c.weak_acquire().is_none());
        assert_eq!(c.lease_count(), 0);
    }

    #[test]
    fn weak_acquire_counts_leases_while_enabled() {
        let seq = LabSequence::new();
        let c = counter(&seq);
        c.enable();
        assert!(c.is_enabled());
        let a = c.weak_acquire().unwrap();
        let b = c.weak_acquire().unwrap();
        assert_eq!(*a, "value");
        assert_eq!(*b, "value");
        assert_eq!(c.lease_count(), 2);
        c.release();
        c.release();
        assert_eq!(c.lease_count(), 0);
        assert!(c.is_enabled());
    }

    #[test]
    fn disable_clears_bit_and_keeps_count() {
        let seq = LabSequence::new();
        let c = counter(&seq);
        c.enable();
        let _lease = c.weak_acquire().unwrap();
        c.disable();
        assert!(!c.is_enabled());
        assert_eq!(c.lease_count(), 1);
        assert!(c.weak_acquire().is_none());
        assert_eq!(c.lease_count(), 1);
        c.release();
        seq.run_until_idle();
        assert_eq!(c.lease_count(), 0);
    }

    #[test]
    #[should_panic(expected = "none outstanding")]
    fn release_without_lease_panics() {
        let seq = LabSequence::new();
        let c = counter(&seq);
        c.release();
    }

    #[test]
    fn detach_yields_value_and_blocks_acquire() {
        let seq = LabSequence::new();
        let c = counter(&seq);
        c.enable();
        let (value, leftover) = c.detach();
        assert_eq!(value.as_deref(), Some(&"value"));
        assert!(leftover.is_empty());
        assert!(c.weak_acquire().is_none());
        assert_eq!(c.lease_count(), 0);
    }

    #[test]
    fn self_is_reported_as_dependency() {
        let seq = LabSequence::new();
        let c = counter(&seq);
        let mut visited = AHashSet::new();
        assert!(c.depends_on(c.component_id(), &mut visited));
        let mut visited = AHashSet::new();
        assert!(!c.depends_on(ComponentId::next(), &mut visited));
    }

    #[test]
    fn concurrent_weak_leases_balance() {
        let seq = LabSequence::new();
        let c = counter(&seq);
        c.enable();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        if c.weak_acquire().is_some() {
                            c.release();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.lease_count(), 0);
        assert!(c.is_enabled());
    }
}
