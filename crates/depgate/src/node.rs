#![forbid(unsafe_code)]

//! Type-erased view of a component's state machine.
//!
//! Counters, links and completions refer to their component through a
//! [`NodeRef`]: a weak pointer plus the runner that owns the component. Every
//! call crosses into the component through [`NodeRef::run`] or
//! [`NodeRef::post`], so transitions always execute on the owning sequence.

use std::sync::{Arc, Weak};

use ahash::AHashSet;
use depgate_core::{SequenceError, SharedRunner, run_or_post};

use crate::state::{ComponentId, ComponentInfo};

pub(crate) trait LifecycleNode: Send + Sync {
    fn info(&self) -> &ComponentInfo;

    fn enable(self: Arc<Self>);

    fn disable(self: Arc<Self>);

    /// One strong dependency became ready.
    fn dependency_ready(self: Arc<Self>);

    /// The component's counter reached zero leases while disabling.
    fn leases_drained(self: Arc<Self>);

    fn enable_completed(self: Arc<Self>, success: bool);

    fn disable_completed(self: Arc<Self>);

    /// Whether `candidate` is reachable through this node's strong
    /// dependencies.
    fn depends_on(&self, candidate: ComponentId, visited: &mut AHashSet<ComponentId>) -> bool;
}

#[derive(Clone)]
pub(crate) struct NodeRef {
    node: Weak<dyn LifecycleNode>,
    runner: SharedRunner,
}

impl NodeRef {
    pub(crate) fn new(node: Weak<dyn LifecycleNode>, runner: SharedRunner) -> Self {
        Self { node, runner }
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<dyn LifecycleNode>> {
        self.node.upgrade()
    }

    pub(crate) fn runner(&self) -> &SharedRunner {
        &self.runner
    }

    /// Run `f` on the node's sequence: inline when already there, posted
    /// otherwise. Silently skipped once the node is gone.
    pub(crate) fn run<F>(&self, op: &'static str, f: F)
    where
        F: FnOnce(Arc<dyn LifecycleNode>) + Send + 'static,
    {
        let node = self.node.clone();
        let result = run_or_post(&*self.runner, move || {
            if let Some(node) = node.upgrade() {
                f(node);
            }
        });
        if let Err(err) = result {
            tracing::warn!(message = "component.call_dropped", op, error = %err);
        }
    }

    /// Always post `f` to the node's sequence, even when already on it.
    pub(crate) fn post<F>(&self, op: &'static str, f: F)
    where
        F: FnOnce(Arc<dyn LifecycleNode>) + Send + 'static,
    {
        if let Err(err) = self.try_post(f) {
            tracing::warn!(message = "component.call_dropped", op, error = %err);
        }
    }

    pub(crate) fn try_post<F>(&self, f: F) -> Result<(), SequenceError>
    where
        F: FnOnce(Arc<dyn LifecycleNode>) + Send + 'static,
    {
        let node = self.node.clone();
        self.runner.post_task(Box::new(move || {
            if let Some(node) = node.upgrade() {
                f(node);
            }
        }))
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("alive", &(self.node.strong_count() > 0))
            .field("sequence", &self.runner.sequence_id())
            .finish()
    }
}
