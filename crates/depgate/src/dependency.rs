#![forbid(unsafe_code)]

//! Dependency handles.
//!
//! - [`StrongDependency`]: declared at construction; the owning component
//!   does not enable until the target is enabled, and the target does not
//!   disable until the owner has.
//! - [`WeakRef`]: opportunistic access. [`WeakRef::try_acquire`] yields a
//!   [`WeakLease`] only while the target is enabled, and the target waits for
//!   every lease to drop before running its disable hook.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use ahash::AHashSet;

use crate::counter::DependencyCounter;
use crate::node::{LifecycleNode, NodeRef};
use crate::state::ComponentId;

/// Progress of a strong dependency within one enable cycle of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkPhase {
    /// Not in use; the owner is disabled.
    #[default]
    Idle,
    /// Registered with the target, waiting for it to enable.
    Waiting,
    /// The target is enabled and a lease is held.
    Ready,
}

struct LinkState<T> {
    phase: LinkPhase,
    generation: u64,
    cached: Option<Arc<T>>,
}

pub(crate) struct StrongLink<T> {
    target: Arc<DependencyCounter<T>>,
    owner: OnceLock<NodeRef>,
    state: Mutex<LinkState<T>>,
}

impl<T: Send + Sync + 'static> StrongLink<T> {
    pub(crate) fn new(target: Arc<DependencyCounter<T>>) -> Arc<Self> {
        Arc::new(Self {
            target,
            owner: OnceLock::new(),
            state: Mutex::new(LinkState {
                phase: LinkPhase::Idle,
                generation: 0,
                cached: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LinkState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hand the target to the owner, on the owner's sequence.
    pub(crate) fn deliver_ready(self: &Arc<Self>, generation: u64) {
        let Some(owner) = self.owner.get() else {
            return;
        };
        let link = Arc::clone(self);
        owner.run("dependency_ready", move |node| link.on_ready(generation, node));
    }

    fn on_ready(&self, generation: u64, node: Arc<dyn LifecycleNode>) {
        let component = self.target.component();
        {
            let mut state = self.lock();
            if state.generation != generation || state.phase != LinkPhase::Waiting {
                tracing::trace!(
                    message = "dependency.stale_ready",
                    target_id = self.target.component_id().raw(),
                    generation
                );
                return;
            }
            let Some(component) = component else {
                return;
            };
            state.cached = Some(component);
            state.phase = LinkPhase::Ready;
        }
        node.dependency_ready();
    }

    /// Ask the owner to disable because the target is disabling.
    pub(crate) fn disable_owner(&self) {
        if let Some(owner) = self.owner.get() {
            let target_id = self.target.component_id();
            owner.run("disable", move |node| {
                tracing::trace!(
                    message = "dependency.cascade_disable",
                    owner = %node.info(),
                    target_id = target_id.raw()
                );
                node.disable();
            });
        }
    }
}

/// Type-erased link as held by the owning component.
pub(crate) trait DependencyLink: Send + Sync {
    fn target_id(&self) -> ComponentId;

    fn attach_owner(&self, owner: NodeRef);

    fn start_using(self: Arc<Self>);

    fn stop_using(self: Arc<Self>);

    fn target_depends_on(&self, candidate: ComponentId, visited: &mut AHashSet<ComponentId>)
    -> bool;
}

impl<T: Send + Sync + 'static> DependencyLink for StrongLink<T> {
    fn target_id(&self) -> ComponentId {
        self.target.component_id()
    }

    fn attach_owner(&self, owner: NodeRef) {
        assert!(
            self.owner.set(owner).is_ok(),
            "strong dependency on {} attached to two owners",
            self.target.component_id()
        );
    }

    fn start_using(self: Arc<Self>) {
        let generation = {
            let mut state = self.lock();
            assert!(
                state.phase == LinkPhase::Idle,
                "strong dependency on {} started twice without stop_using",
                self.target.component_id()
            );
            state.phase = LinkPhase::Waiting;
            state.generation += 1;
            state.generation
        };
        self.target.strong_acquire(&self, generation);
    }

    fn stop_using(self: Arc<Self>) {
        let cached = {
            let mut state = self.lock();
            assert!(
                state.phase != LinkPhase::Idle,
                "strong dependency on {} stopped without start_using",
                self.target.component_id()
            );
            state.phase = LinkPhase::Idle;
            state.cached.take()
        };
        drop(cached);
        self.target.strong_release(&self);
    }

    fn target_depends_on(
        &self,
        candidate: ComponentId,
        visited: &mut AHashSet<ComponentId>,
    ) -> bool {
        self.target.depends_on(candidate, visited)
    }
}

// ─── StrongDependency ────────────────────────────────────────────────────────

/// Owner-side handle to a strong dependency.
///
/// Cloneable; clones observe the same link. [`get`](Self::get) returns the
/// target only while the owner is using it, which covers the owner's
/// `on_enable` through `on_disable` window.
pub struct StrongDependency<T> {
    link: Arc<StrongLink<T>>,
}

impl<T> Clone for StrongDependency<T> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
        }
    }
}

impl<T: Send + Sync + 'static> StrongDependency<T> {
    pub(crate) fn new(link: Arc<StrongLink<T>>) -> Self {
        Self { link }
    }

    /// The target, if it is enabled and leased to this owner.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.link.lock().cached.clone()
    }

    /// Run `f` against the target if it is available.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.get().map(|target| f(&target))
    }

    /// Whether the target is currently leased to this owner.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == LinkPhase::Ready
    }

    /// Current phase of the link.
    #[must_use]
    pub fn phase(&self) -> LinkPhase {
        self.link.lock().phase
    }

    /// Identifier of the target component.
    #[must_use]
    pub fn target_id(&self) -> ComponentId {
        self.link.target.component_id()
    }
}

impl<T> std::fmt::Debug for StrongDependency<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrongDependency")
            .field("target", &self.link.target.component_id())
            .finish_non_exhaustive()
    }
}

// ─── WeakRef ─────────────────────────────────────────────────────────────────

/// Non-owning handle that can lease a component while it is enabled.
pub struct WeakRef<T> {
    counter: Arc<DependencyCounter<T>>,
}

impl<T> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
        }
    }
}

impl<T> std::fmt::Debug for WeakRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakRef").field(&self.counter).finish()
    }
}

impl<T: Send + Sync + 'static> WeakRef<T> {
    pub(crate) fn new(counter: Arc<DependencyCounter<T>>) -> Self {
        Self { counter }
    }

    /// Lease the component if it is enabled.
    ///
    /// Safe to call from any thread. Returns `None` while the component is
    /// not enabled, is disabling, or has been destroyed.
    #[must_use]
    pub fn try_acquire(&self) -> Option<WeakLease<T>> {
        let component = self.counter.weak_acquire()?;
        Some(WeakLease {
            counter: Arc::clone(&self.counter),
            component: Some(component),
        })
    }

    /// Whether the component currently grants leases.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.counter.is_enabled()
    }

    /// Outstanding leases across all holders.
    #[must_use]
    pub fn lease_count(&self) -> u32 {
        self.counter.lease_count()
    }

    /// Identifier of the referenced component.
    #[must_use]
    pub fn component_id(&self) -> ComponentId {
        self.counter.component_id()
    }
}

/// A held lease; the component cannot finish disabling until it drops.
pub struct WeakLease<T: Send + Sync + 'static> {
    counter: Arc<DependencyCounter<T>>,
    component: Option<Arc<T>>,
}

impl<T: Send + Sync + 'static> WeakLease<T> {
    /// Give the lease back. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl<T: Send + Sync + 'static> Deref for WeakLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.component
            .as_deref()
            .expect("weak lease dereferenced after release")
    }
}

impl<T: Send + Sync + 'static> Drop for WeakLease<T> {
    fn drop(&mut self) {
        drop(self.component.take());
        self.counter.release();
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for WeakLease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakLease")
            .field("component", &self.counter.component_id())
            .finish_non_exhaustive()
    }
}
