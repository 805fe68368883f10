#![forbid(unsafe_code)]

//! Randomizable component graphs driven on a single [`LabSequence`].
//!
//! A [`Graph`] is built from a [`GraphSpec`] whose node `i` may only depend
//! on nodes `< i`, so every `GraphSpec` is acyclic. Tests and fuzz targets feed it
//! a stream of [`GraphOp`]s and call [`Graph::check`] between steps.
//!
//! # Checked invariants
//!
//! 1. No `on_enable` ran while one of the component's strong dependencies
//!    was not ready.
//! 2. An `Enabled` component's strong dependencies are all `Enabled`.
//! 3. The counter's enabled bit is set exactly when the component is
//!    `Enabled`.
//! 4. While a component is inside `on_disable`, none of its dependents holds
//!    it ready.
//! 5. Lease count = held weak leases + dependents holding it ready (checked
//!    when no destroy is in flight).
//! 6. After teardown every value has been dropped exactly once.

use std::sync::{Arc, Weak};

use depgate::{Component, ComponentState, WeakLease, WeakRef};
use depgate_core::LabSequence;

use crate::event_log::{Event, EventLog};
use crate::scripted::{Reply, Scripted, fixture, scripted_with};

/// Upper bound on settle rounds; each round completes every parked hook.
const MAX_SETTLE_ROUNDS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    /// Indices of strong dependencies; each must be lower than this node's.
    pub dependencies: Vec<usize>,
    pub enable: Reply,
    pub disable: Reply,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSpec {
    pub nodes: Vec<NodeSpec>,
}

impl GraphSpec {
    /// Chain `n0 <- n1 <- ... <- n{len-1}` with immediate replies.
    #[must_use]
    pub fn chain(len: usize) -> Self {
        Self {
            nodes: (0..len)
                .map(|i| NodeSpec {
                    dependencies: if i == 0 { Vec::new() } else { vec![i - 1] },
                    enable: Reply::Succeed,
                    disable: Reply::Succeed,
                })
                .collect(),
        }
    }
}

/// One step applied to a [`Graph`]. Indices wrap modulo the node count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOp {
    Enable(usize),
    Disable(usize),
    Destroy(usize),
    FinishEnable(usize, bool),
    FinishDisable(usize),
    Lease(usize),
    ReleaseLease(usize),
    Pump,
}

pub struct Graph {
    seq: LabSequence,
    log: EventLog,
    names: Vec<String>,
    edges: Vec<Vec<usize>>,
    nodes: Vec<Option<Component<Scripted>>>,
    fixtures: Vec<Weak<Scripted>>,
    weak: Vec<WeakRef<Scripted>>,
    leases: Vec<(usize, WeakLease<Scripted>)>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges)
            .field("leases", &self.leases.len())
            .finish()
    }
}

impl Graph {
    /// Build the graph on a fresh sequence owned by the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if a node lists a dependency that is not lower than its own
    /// index.
    #[must_use]
    pub fn new(spec: &GraphSpec) -> Self {
        let seq = LabSequence::new();
        let log = EventLog::new();
        let mut nodes: Vec<Option<Component<Scripted>>> = Vec::with_capacity(spec.nodes.len());
        let mut names = Vec::with_capacity(spec.nodes.len());
        let mut edges = Vec::with_capacity(spec.nodes.len());
        for (index, node) in spec.nodes.iter().enumerate() {
            let name = format!("n{index}");
            let mut dependencies: Vec<usize> = node.dependencies.clone();
            dependencies.sort_unstable();
            dependencies.dedup();
            assert!(
                dependencies.iter().all(|&d| d < index),
                "node {index} may only depend on lower-numbered nodes"
            );
            let targets: Vec<&Component<Scripted>> = dependencies
                .iter()
                .filter_map(|&d| nodes[d].as_ref())
                .collect();
            let (enable, disable) = (node.enable, node.disable);
            let component = scripted_with(seq.runner(), &log, &name, &targets, |s| {
                s.enable_default(enable).disable_reply(disable)
            });
            names.push(name);
            edges.push(dependencies);
            nodes.push(Some(component));
        }
        let fixtures = nodes
            .iter()
            .flatten()
            .map(|c| Arc::downgrade(&fixture(c)))
            .collect();
        let weak = nodes.iter().flatten().map(Component::weak_ref).collect();
        Self {
            seq,
            log,
            names,
            edges,
            nodes,
            fixtures,
            weak,
            leases: Vec::new(),
        }
    }

    #[must_use]
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    #[must_use]
    pub fn sequence(&self) -> &LabSequence {
        &self.seq
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The component at `index`, unless destroyed.
    #[must_use]
    pub fn component(&self, index: usize) -> Option<&Component<Scripted>> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    /// Apply `op`, then run the sequence until idle.
    pub fn apply(&mut self, op: GraphOp) {
        if self.nodes.is_empty() {
            return;
        }
        let n = self.nodes.len();
        match op {
            GraphOp::Enable(i) => {
                if let Some(c) = self.component(i % n) {
                    c.enable();
                }
            }
            GraphOp::Disable(i) => {
                if let Some(c) = self.component(i % n) {
                    c.disable();
                }
            }
            GraphOp::Destroy(i) => {
                if let Some(c) = self.nodes[i % n].take() {
                    c.destroy();
                }
            }
            GraphOp::FinishEnable(i, success) => {
                if let Some(f) = self.fixtures[i % n].upgrade() {
                    f.finish_enable(success);
                }
            }
            GraphOp::FinishDisable(i) => {
                if let Some(f) = self.fixtures[i % n].upgrade() {
                    f.finish_disable();
                }
            }
            GraphOp::Lease(i) => {
                let i = i % n;
                if let Some(lease) = self.weak[i].try_acquire() {
                    self.leases.push((i, lease));
                }
            }
            GraphOp::ReleaseLease(k) => {
                if !self.leases.is_empty() {
                    let k = k % self.leases.len();
                    drop(self.leases.swap_remove(k));
                }
            }
            GraphOp::Pump => {}
        }
        self.seq.run_until_idle();
    }

    /// Return every lease and complete every parked hook (successfully)
    /// until nothing changes.
    pub fn settle(&mut self) {
        self.leases.clear();
        for _ in 0..MAX_SETTLE_ROUNDS {
            self.seq.run_until_idle();
            let mut progressed = false;
            for weak in &self.fixtures {
                if let Some(f) = weak.upgrade() {
                    progressed |= f.finish_enable(true);
                    progressed |= f.finish_disable();
                }
            }
            if !progressed {
                self.seq.run_until_idle();
                return;
            }
        }
        panic!("graph did not settle after {MAX_SETTLE_ROUNDS} rounds");
    }

    /// Destroy every remaining component and settle.
    pub fn teardown(&mut self) {
        self.leases.clear();
        for slot in self.nodes.iter_mut().rev() {
            if let Some(c) = slot.take() {
                c.destroy();
            }
        }
        self.settle();
    }

    /// Verify the graph invariants listed in the module docs (1 to 5).
    pub fn check(&self) -> Result<(), String> {
        if let Some(event) = self
            .log
            .snapshot()
            .into_iter()
            .find(|e| matches!(e, Event::PrematureEnable { .. }))
        {
            return Err(format!("on_enable before dependencies were ready: {event:?}"));
        }

        for (i, slot) in self.nodes.iter().enumerate() {
            let Some(component) = slot else { continue };
            let state = component.state();

            if state == ComponentState::Enabled {
                for &d in &self.edges[i] {
                    let dep_state = self.component(d).map(Component::state);
                    if dep_state != Some(ComponentState::Enabled) {
                        return Err(format!(
                            "{} is enabled but its dependency {} is {dep_state:?}",
                            self.names[i], self.names[d]
                        ));
                    }
                }
            }

            let bit = component.weak_ref().is_enabled();
            if bit != (state == ComponentState::Enabled) {
                return Err(format!(
                    "{} is {state} but its counter enabled bit is {bit}",
                    self.names[i]
                ));
            }

            if self.fixtures[i]
                .upgrade()
                .is_some_and(|f| f.has_parked_disable())
            {
                for (k, deps) in self.edges.iter().enumerate() {
                    let Some(pos) = deps.iter().position(|&d| d == i) else {
                        continue;
                    };
                    let holds_ready = self.fixtures[k]
                        .upgrade()
                        .and_then(|f| f.dependency(pos).map(|dep| dep.is_ready()))
                        .unwrap_or(false);
                    if holds_ready {
                        return Err(format!(
                            "{} is in on_disable while dependent {} still holds it",
                            self.names[i], self.names[k]
                        ));
                    }
                }
            }
        }

        if !self.destroy_in_flight() {
            for (i, slot) in self.nodes.iter().enumerate() {
                let Some(component) = slot else { continue };
                let weak_held = self.leases.iter().filter(|(j, _)| *j == i).count();
                let strong_held = self.ready_dependents(i);
                let expected = weak_held + strong_held;
                let actual = component.lease_count() as usize;
                if actual != expected {
                    return Err(format!(
                        "{} has {actual} leases, expected {expected} \
                         ({weak_held} weak + {strong_held} strong)",
                        self.names[i]
                    ));
                }
            }
        }
        Ok(())
    }

    /// Verify that every component value was dropped exactly once. Call
    /// after [`teardown`](Self::teardown).
    pub fn check_teardown(&self) -> Result<(), String> {
        for name in &self.names {
            let drops = self
                .log
                .count(|e| matches!(e, Event::Dropped(n) if n == name));
            if drops != 1 {
                return Err(format!("{name} was dropped {drops} times"));
            }
        }
        Ok(())
    }

    fn ready_dependents(&self, target: usize) -> usize {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(k, deps)| {
                let pos = deps.iter().position(|&d| d == target)?;
                let f = self.fixtures[k].upgrade()?;
                let ready = f.dependency(pos)?.is_ready();
                ready.then_some(())
            })
            .count()
    }

    fn destroy_in_flight(&self) -> bool {
        self.nodes.iter().enumerate().any(|(i, slot)| {
            slot.is_none()
                && self
                    .log
                    .count(|e| matches!(e, Event::Dropped(n) if *n == self.names[i]))
                    == 0
        })
    }
}
