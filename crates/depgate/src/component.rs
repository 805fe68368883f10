#![forbid(unsafe_code)]

//! The component state machine.
//!
//! # Design
//!
//! A [`Component`] wraps a user value implementing [`Lifecycle`]. The value
//! never enables or disables itself directly; it is told to through
//! [`Lifecycle::on_enable`] / [`Lifecycle::on_disable`] and answers through a
//! one-shot completion, possibly much later and from any thread.
//!
//! ```text
//!              enable()                  all deps ready + on_enable ok
//!  Disabled ─────────────▶ Enabling ───────────────────────────────▶ Enabled
//!     ▲                      │  on_enable failed / disable()           │
//!     │                      ▼                                         │ disable()
//!     └──────────────── Disabling ◀────────────────────────────────────┘
//!       dependents off,
//!       leases drained,
//!       on_disable done
//! ```
//!
//! `Destroying` is `Disabling` with no way back: the value is dropped when
//! the cycle finishes, instead of the component resting in `Disabled`.
//!
//! # Invariants
//!
//! 1. Every transition runs on the owning sequence; entry points panic when
//!    called elsewhere.
//! 2. At most one `on_enable` / `on_disable` call is outstanding.
//! 3. `on_enable` runs only after every strong dependency is ready.
//! 4. `on_disable` runs only after every strong dependent has disabled and
//!    every lease has been returned, and only if `on_enable` succeeded.
//! 5. The value is dropped only after the component is fully disabled.
//!
//! # Failure Modes
//!
//! - **Hook never completes**: the component stays in `Enabling` or
//!   `Disabling`. Dropping the completion without calling it counts as
//!   completing it (failure, for enable).
//! - **Dependency cycle**: [`Component::add_dependency`] panics.
//! - **Off-sequence call**: panic with the component name.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use ahash::AHashSet;
use depgate_core::{ObserverId, ObserverList, SharedRunner};

use crate::controller::ComponentController;
use crate::counter::DependencyCounter;
use crate::dependency::{DependencyLink, StrongDependency, StrongLink, WeakRef};
use crate::node::{LifecycleNode, NodeRef};
use crate::observer::ComponentObserver;
use crate::state::{ComponentId, ComponentInfo, ComponentState};

// ─── Diagnostics ─────────────────────────────────────────────────────────────

static ENABLE_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);
static CYCLES_REJECTED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Total `on_enable` failures across all components.
#[must_use]
pub fn enable_failures_total() -> u64 {
    ENABLE_FAILURES_TOTAL.load(Ordering::Relaxed)
}

/// Total dependency registrations rejected because they would form a cycle.
#[must_use]
pub fn cycles_rejected_total() -> u64 {
    CYCLES_REJECTED_TOTAL.load(Ordering::Relaxed)
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

/// Behavior hooks of a component value.
///
/// Both hooks are called on the component's sequence and must eventually
/// invoke their completion exactly once. Completing inline is fine; the
/// result is always processed as a separate task.
pub trait Lifecycle: Send + Sync + 'static {
    /// Bring the value up. Every strong dependency is ready at this point.
    fn on_enable(&self, done: EnableCompletion);

    /// Tear the value down. No dependent and no lease remains.
    fn on_disable(&self, done: DisableCompletion);
}

/// One-shot completion for [`Lifecycle::on_enable`].
#[must_use = "the component stays in Enabling until the completion is invoked or dropped"]
pub struct EnableCompletion {
    target: Option<NodeRef>,
    component: ComponentId,
}

impl EnableCompletion {
    fn new(target: NodeRef, component: ComponentId) -> Self {
        Self {
            target: Some(target),
            component,
        }
    }

    /// Component this completion belongs to.
    #[must_use]
    pub fn component_id(&self) -> ComponentId {
        self.component
    }

    /// Report the outcome of `on_enable`.
    pub fn complete(mut self, success: bool) {
        if let Some(target) = self.target.take() {
            target.post("enable_completed", move |node| {
                node.enable_completed(success);
            });
        }
    }

    pub fn succeed(self) {
        self.complete(true);
    }

    pub fn fail(self) {
        self.complete(false);
    }
}

impl Drop for EnableCompletion {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            tracing::warn!(
                message = "component.enable_completion_dropped",
                component_id = self.component.raw()
            );
            target.post("enable_completed", |node| node.enable_completed(false));
        }
    }
}

impl std::fmt::Debug for EnableCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnableCompletion")
            .field("component", &self.component)
            .field("pending", &self.target.is_some())
            .finish()
    }
}

/// One-shot completion for [`Lifecycle::on_disable`].
#[must_use = "the component stays in Disabling until the completion is invoked or dropped"]
pub struct DisableCompletion {
    target: Option<NodeRef>,
    component: ComponentId,
}

impl DisableCompletion {
    fn new(target: NodeRef, component: ComponentId) -> Self {
        Self {
            target: Some(target),
            component,
        }
    }

    /// Component this completion belongs to.
    #[must_use]
    pub fn component_id(&self) -> ComponentId {
        self.component
    }

    /// Report that `on_disable` finished.
    pub fn complete(mut self) {
        if let Some(target) = self.target.take() {
            target.post("disable_completed", |node| node.disable_completed());
        }
    }
}

impl Drop for DisableCompletion {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            tracing::warn!(
                message = "component.disable_completion_dropped",
                component_id = self.component.raw()
            );
            target.post("disable_completed", |node| node.disable_completed());
        }
    }
}

impl std::fmt::Debug for DisableCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisableCompletion")
            .field("component", &self.component)
            .field("pending", &self.target.is_some())
            .finish()
    }
}

// ─── Node ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Machine {
    state: ComponentState,
    dependencies: Vec<Arc<dyn DependencyLink>>,
    pending_dependencies: usize,
    async_call_in_progress: bool,
    /// `on_enable` succeeded and `on_disable` has not been issued since.
    hook_enabled: bool,
    using_dependencies: bool,
    pending_enable: bool,
    leases_drained: bool,
    /// Observers were told `enabled(true)` this cycle.
    announced_enabled: bool,
    /// Self-reference held while destroying, after the owner handle is gone.
    keep_alive: Option<Arc<dyn LifecycleNode>>,
}

enum EnableOutcome {
    Enabled,
    Failed,
    Superseded,
}

enum DisableStep {
    RunHook,
    Finalize,
}

pub(crate) struct Node<T: Lifecycle> {
    info: ComponentInfo,
    runner: SharedRunner,
    counter: Arc<DependencyCounter<T>>,
    machine: Mutex<Machine>,
    observers: ObserverList<dyn ComponentObserver>,
}

impl<T: Lifecycle> Node<T> {
    fn new(
        info: ComponentInfo,
        runner: SharedRunner,
        value: T,
        dependencies: Vec<Arc<dyn DependencyLink>>,
    ) -> Arc<Self> {
        let counter = Arc::new(DependencyCounter::new(
            info.id(),
            Arc::clone(&runner),
            Arc::new(value),
        ));
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let erased: Weak<dyn LifecycleNode> = weak.clone();
            counter.attach(erased.clone());
            for link in &dependencies {
                link.attach_owner(NodeRef::new(erased.clone(), Arc::clone(&runner)));
            }
            Self {
                info,
                runner,
                counter,
                machine: Mutex::new(Machine {
                    dependencies,
                    ..Machine::default()
                }),
                observers: ObserverList::new(),
            }
        })
    }

    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn node_ref(self: &Arc<Self>) -> NodeRef {
        let weak = Arc::downgrade(self);
        let weak: Weak<dyn LifecycleNode> = weak;
        NodeRef::new(weak, Arc::clone(&self.runner))
    }

    fn assert_on_sequence(&self, op: &str) {
        assert!(
            self.runner.runs_tasks_in_current_sequence(),
            "{op} on component {} called off its sequence {}",
            self.info,
            self.runner.sequence_id()
        );
    }

    fn state(&self) -> ComponentState {
        self.machine().state
    }

    // ── Enable path ─────────────────────────────────────────────────

    fn enable_now(self: &Arc<Self>) {
        self.assert_on_sequence("enable");
        let dependencies = {
            let mut m = self.machine();
            let state = m.state;
            match state {
                ComponentState::Enabling | ComponentState::Enabled | ComponentState::Destroying => {
                    return;
                }
                ComponentState::Disabling => {
                    m.pending_enable = true;
                    drop(m);
                    tracing::debug!(message = "component.enable_deferred", component = %self.info);
                    return;
                }
                ComponentState::Disabled => {}
            }
            m.state = ComponentState::Enabling;
            m.pending_dependencies = m.dependencies.len();
            m.using_dependencies = !m.dependencies.is_empty();
            m.dependencies.clone()
        };
        tracing::debug!(
            message = "component.enable",
            component = %self.info,
            dependencies = dependencies.len()
        );
        if dependencies.is_empty() {
            self.try_on_enable();
        } else {
            for link in dependencies {
                link.start_using();
            }
        }
    }

    fn on_dependency_ready(self: &Arc<Self>) {
        let all_ready = {
            let mut m = self.machine();
            if m.state != ComponentState::Enabling {
                return;
            }
            m.pending_dependencies = m.pending_dependencies.saturating_sub(1);
            m.pending_dependencies == 0
        };
        if all_ready {
            self.try_on_enable();
        }
    }

    fn try_on_enable(self: &Arc<Self>) {
        {
            let mut m = self.machine();
            if m.state != ComponentState::Enabling || m.async_call_in_progress {
                return;
            }
            m.async_call_in_progress = true;
        }
        let Some(value) = self.counter.component() else {
            return;
        };
        let _span = tracing::debug_span!("component.on_enable", component = %self.info).entered();
        value.on_enable(EnableCompletion::new(self.node_ref(), self.info.id()));
    }

    fn finish_enable(self: &Arc<Self>, success: bool) {
        let outcome = {
            let mut m = self.machine();
            m.async_call_in_progress = false;
            match m.state {
                ComponentState::Enabling if success => {
                    m.state = ComponentState::Enabled;
                    m.hook_enabled = true;
                    m.announced_enabled = true;
                    EnableOutcome::Enabled
                }
                ComponentState::Enabling => EnableOutcome::Failed,
                ComponentState::Disabling | ComponentState::Destroying => {
                    if success {
                        m.hook_enabled = true;
                    }
                    EnableOutcome::Superseded
                }
                state @ (ComponentState::Disabled | ComponentState::Enabled) => {
                    panic!("enable completion for {} arrived while {state}", self.info)
                }
            }
        };
        match outcome {
            EnableOutcome::Enabled => {
                tracing::debug!(message = "component.enabled", component = %self.info);
                self.counter.enable();
                self.notify_enabled(true);
            }
            EnableOutcome::Failed => {
                ENABLE_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(message = "component.enable_failed", component = %self.info);
                self.disable_now();
                self.notify_enabled(false);
            }
            EnableOutcome::Superseded => {
                tracing::debug!(
                    message = "component.enable_superseded",
                    component = %self.info,
                    success
                );
                // Observers are not told: the enable was already withdrawn.
                if !success {
                    ENABLE_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        message = "component.enable_failed",
                        component = %self.info,
                        superseded = true
                    );
                }
                self.continue_disable();
            }
        }
    }

    // ── Disable path ────────────────────────────────────────────────

    fn disable_now(self: &Arc<Self>) {
        self.assert_on_sequence("disable");
        {
            let mut m = self.machine();
            match m.state {
                ComponentState::Disabled | ComponentState::Destroying => return,
                ComponentState::Disabling => {
                    m.pending_enable = false;
                    return;
                }
                ComponentState::Enabling | ComponentState::Enabled => {}
            }
            m.state = ComponentState::Disabling;
            m.leases_drained = false;
        }
        tracing::debug!(message = "component.disable", component = %self.info);
        self.counter.disable();
    }

    fn on_leases_drained(self: &Arc<Self>) {
        {
            let mut m = self.machine();
            if !matches!(
                m.state,
                ComponentState::Disabling | ComponentState::Destroying
            ) {
                return;
            }
            m.leases_drained = true;
        }
        self.continue_disable();
    }

    fn continue_disable(self: &Arc<Self>) {
        let step = {
            let mut m = self.machine();
            if !matches!(
                m.state,
                ComponentState::Disabling | ComponentState::Destroying
            ) || !m.leases_drained
                || m.async_call_in_progress
            {
                return;
            }
            if m.hook_enabled {
                m.hook_enabled = false;
                m.async_call_in_progress = true;
                DisableStep::RunHook
            } else {
                DisableStep::Finalize
            }
        };
        match step {
            DisableStep::RunHook => {
                let Some(value) = self.counter.component() else {
                    return;
                };
                let _span =
                    tracing::debug_span!("component.on_disable", component = %self.info).entered();
                value.on_disable(DisableCompletion::new(self.node_ref(), self.info.id()));
            }
            DisableStep::Finalize => self.finalize_disable(),
        }
    }

    fn finish_disable_hook(self: &Arc<Self>) {
        self.machine().async_call_in_progress = false;
        self.finalize_disable();
    }

    fn finalize_disable(self: &Arc<Self>) {
        let (dependencies, announce, destroying, replay, keep_alive) = {
            let mut m = self.machine();
            let dependencies = if m.using_dependencies {
                m.using_dependencies = false;
                m.dependencies.clone()
            } else {
                Vec::new()
            };
            let announce = std::mem::take(&mut m.announced_enabled);
            let destroying = m.state == ComponentState::Destroying;
            let replay = !destroying && std::mem::take(&mut m.pending_enable);
            m.state = ComponentState::Disabled;
            m.pending_dependencies = 0;
            (dependencies, announce, destroying, replay, m.keep_alive.take())
        };
        tracing::debug!(
            message = "component.disabled",
            component = %self.info,
            released = dependencies.len()
        );
        if announce {
            self.notify_disabled();
        }
        for link in dependencies {
            link.stop_using();
        }
        if destroying {
            self.finish_destroy();
        } else if replay {
            self.enable_now();
        }
        drop(keep_alive);
    }

    // ── Destroy ─────────────────────────────────────────────────────

    fn destroy_now(self: &Arc<Self>) {
        self.assert_on_sequence("destroy");
        let from = {
            let mut m = self.machine();
            let from = m.state;
            match from {
                ComponentState::Disabled | ComponentState::Destroying => {}
                ComponentState::Disabling | ComponentState::Enabling | ComponentState::Enabled => {
                    m.state = ComponentState::Destroying;
                    m.pending_enable = false;
                    m.keep_alive = Some(Arc::clone(self) as Arc<dyn LifecycleNode>);
                }
            }
            from
        };
        tracing::debug!(message = "component.destroy", component = %self.info, from = %from);
        match from {
            ComponentState::Disabled => self.finish_destroy(),
            ComponentState::Enabling | ComponentState::Enabled => {
                self.machine().leases_drained = false;
                self.counter.disable();
            }
            ComponentState::Disabling | ComponentState::Destroying => {}
        }
    }

    fn finish_destroy(&self) {
        let dependencies = std::mem::take(&mut self.machine().dependencies);
        let (value, orphans) = self.counter.detach();
        tracing::debug!(
            message = "component.destroyed",
            component = %self.info,
            orphaned = orphans.len()
        );
        for link in &orphans {
            link.disable_owner();
        }
        drop(dependencies);
        drop(value);
    }

    // ── Observers ───────────────────────────────────────────────────

    fn notify_enabled(&self, success: bool) {
        let info = self.info.clone();
        self.observers
            .notify(move |observer| observer.on_component_enabled(&info, success));
    }

    fn notify_disabled(&self) {
        let info = self.info.clone();
        self.observers
            .notify(move |observer| observer.on_component_disabled(&info));
    }
}

impl<T: Lifecycle> LifecycleNode for Node<T> {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn enable(self: Arc<Self>) {
        self.enable_now();
    }

    fn disable(self: Arc<Self>) {
        self.disable_now();
    }

    fn dependency_ready(self: Arc<Self>) {
        self.on_dependency_ready();
    }

    fn leases_drained(self: Arc<Self>) {
        self.on_leases_drained();
    }

    fn enable_completed(self: Arc<Self>, success: bool) {
        self.finish_enable(success);
    }

    fn disable_completed(self: Arc<Self>) {
        self.finish_disable_hook();
    }

    fn depends_on(&self, candidate: ComponentId, visited: &mut AHashSet<ComponentId>) -> bool {
        let dependencies = self.machine().dependencies.clone();
        dependencies
            .iter()
            .any(|link| link.target_depends_on(candidate, visited))
    }
}

// ─── Component ───────────────────────────────────────────────────────────────

/// Collects strong dependencies for a component that does not exist yet.
///
/// ```
/// use std::sync::Arc;
/// use depgate::{Component, ComponentBuilder, DisableCompletion, EnableCompletion, Lifecycle,
///               StrongDependency};
/// use depgate_core::LabSequence;
///
/// struct Store;
/// impl Lifecycle for Store {
///     fn on_enable(&self, done: EnableCompletion) { done.succeed(); }
///     fn on_disable(&self, done: DisableCompletion) { done.complete(); }
/// }
///
/// struct Api { store: StrongDependency<Store> }
/// impl Lifecycle for Api {
///     fn on_enable(&self, done: EnableCompletion) {
///         done.complete(self.store.is_ready());
///     }
///     fn on_disable(&self, done: DisableCompletion) { done.complete(); }
/// }
///
/// let seq = LabSequence::new();
/// let store = Component::new(seq.runner(), "store", Store);
/// let mut builder = ComponentBuilder::new(seq.runner(), "api");
/// let dep = builder.depends_on(&store);
/// let api = builder.build(Api { store: dep });
///
/// api.enable();
/// seq.run_until_idle();
/// assert!(store.weak_ref().is_enabled());
/// assert!(api.weak_ref().is_enabled());
/// ```
pub struct ComponentBuilder {
    info: ComponentInfo,
    runner: SharedRunner,
    dependencies: Vec<Arc<dyn DependencyLink>>,
}

impl ComponentBuilder {
    /// Start a component named `name`, driven on `runner`.
    #[must_use]
    pub fn new(runner: SharedRunner, name: &str) -> Self {
        Self {
            info: ComponentInfo::new(name),
            runner,
            dependencies: Vec::new(),
        }
    }

    /// Identity the built component will have.
    #[must_use]
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    /// Declare a strong dependency on `dependency`.
    pub fn depends_on<D: Lifecycle>(&mut self, dependency: &Component<D>) -> StrongDependency<D> {
        let link = StrongLink::new(Arc::clone(&dependency.node.counter));
        self.dependencies
            .push(Arc::clone(&link) as Arc<dyn DependencyLink>);
        StrongDependency::new(link)
    }

    /// Finish construction. The component starts `Disabled`.
    pub fn build<T: Lifecycle>(self, value: T) -> Component<T> {
        tracing::trace!(
            message = "component.created",
            component = %self.info,
            dependencies = self.dependencies.len()
        );
        Component {
            node: Node::new(self.info, self.runner, value, self.dependencies),
        }
    }
}

impl std::fmt::Debug for ComponentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentBuilder")
            .field("info", &self.info)
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

/// Owner handle of a component.
///
/// Dropping the handle (or calling [`destroy`](Self::destroy)) disables the
/// component if needed and drops its value once disabled. The handle must be
/// used and dropped on the component's sequence.
pub struct Component<T: Lifecycle> {
    node: Arc<Node<T>>,
}

impl<T: Lifecycle> Component<T> {
    /// A component without strong dependencies.
    #[must_use]
    pub fn new(runner: SharedRunner, name: &str, value: T) -> Self {
        ComponentBuilder::new(runner, name).build(value)
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[must_use]
    pub fn info(&self) -> &ComponentInfo {
        &self.node.info
    }

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.node.info.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ComponentState {
        self.node.state()
    }

    /// Sequence the component is driven on.
    #[must_use]
    pub fn runner(&self) -> &SharedRunner {
        &self.node.runner
    }

    /// The component value.
    #[must_use]
    pub fn value(&self) -> Option<Arc<T>> {
        self.node.counter.component()
    }

    /// Outstanding leases on this component.
    #[must_use]
    pub fn lease_count(&self) -> u32 {
        self.node.counter.lease_count()
    }

    /// Number of strong dependencies declared by this component.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.node.machine().dependencies.len()
    }

    /// Targets of this component's strong dependencies, in declaration
    /// order.
    #[must_use]
    pub fn dependency_ids(&self) -> Vec<ComponentId> {
        self.node
            .machine()
            .dependencies
            .iter()
            .map(|link| link.target_id())
            .collect()
    }

    /// Strong dependents currently registered on this component.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.node.counter.strong_dependent_count()
    }

    /// Whether `other` is reachable through this component's strong
    /// dependencies.
    #[must_use]
    pub fn depends_on(&self, other: ComponentId) -> bool {
        let mut visited = AHashSet::new();
        LifecycleNode::depends_on(&*self.node, other, &mut visited)
    }

    // ── Handles ─────────────────────────────────────────────────────

    /// A weak reference usable from any thread.
    #[must_use]
    pub fn weak_ref(&self) -> WeakRef<T> {
        WeakRef::new(Arc::clone(&self.node.counter))
    }

    /// A clonable handle that posts enable/disable requests.
    #[must_use]
    pub fn controller(&self) -> ComponentController {
        ComponentController::new(self.node.node_ref(), self.node.info.clone())
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Request enable. No-op if enabling, enabled, or destroying; deferred
    /// until the current cycle ends if disabling.
    pub fn enable(&self) {
        self.node.enable_now();
    }

    /// Request disable. No-op if already disabled or destroying.
    pub fn disable(&self) {
        self.node.disable_now();
    }

    /// Disable if needed, then drop the value.
    pub fn destroy(self) {
        drop(self);
    }

    /// Declare a strong dependency after construction.
    ///
    /// # Panics
    ///
    /// Panics if the component is not disabled, or if `dependency` already
    /// depends on this component (directly, transitively, or by being this
    /// component).
    pub fn add_dependency<D: Lifecycle>(&self, dependency: &Component<D>) -> StrongDependency<D> {
        self.node.assert_on_sequence("add_dependency");
        let state = self.state();
        assert!(
            state == ComponentState::Disabled,
            "dependencies of {} may only be added while disabled (currently {state})",
            self.info()
        );
        let mut visited = AHashSet::new();
        if dependency.node.counter.depends_on(self.id(), &mut visited) {
            CYCLES_REJECTED_TOTAL.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                message = "component.cycle_rejected",
                component = %self.info(),
                dependency = %dependency.info()
            );
            panic!(
                "adding {} as a dependency of {} would create a cycle",
                dependency.info(),
                self.info()
            );
        }
        let link = StrongLink::new(Arc::clone(&dependency.node.counter));
        link.attach_owner(self.node.node_ref());
        self.node
            .machine()
            .dependencies
            .push(Arc::clone(&link) as Arc<dyn DependencyLink>);
        StrongDependency::new(link)
    }

    // ── Observers ───────────────────────────────────────────────────

    /// Register an observer, notified on `runner`.
    pub fn add_observer(
        &self,
        observer: Arc<dyn ComponentObserver>,
        runner: SharedRunner,
    ) -> ObserverId {
        self.node.observers.add_observer(observer, runner)
    }

    /// Unregister an observer. Pending deliveries to it are dropped.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.node.observers.remove_observer(id)
    }
}

impl<T: Lifecycle> Drop for Component<T> {
    fn drop(&mut self) {
        self.node.destroy_now();
    }
}

impl<T: Lifecycle> std::fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("info", &self.node.info)
            .field("state", &self.state())
            .field("counter", &self.node.counter)
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
