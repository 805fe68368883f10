#![forbid(unsafe_code)]

//! Dependency-gated component lifecycles.
//!
//! A [`Component`] enables only after every component it strongly depends on
//! is enabled, and disables only after every component depending on it has
//! disabled and every outstanding [`WeakLease`] has been returned. Enabling
//! and disabling are asynchronous: the component value is handed a
//! completion and answers when it is done.
//!
//! Components are driven on a [`TaskRunner`] sequence (see
//! [`depgate_core`]). Observers, weak references and controllers may be used
//! from any thread.

pub mod component;
#[cfg(feature = "policy-config")]
pub mod config;
pub mod controller;
pub mod counter;
pub mod dependency;
pub mod error;
mod node;
pub mod observer;
pub mod retry;
pub mod state;

pub use component::{
    Component, ComponentBuilder, DisableCompletion, EnableCompletion, Lifecycle,
    cycles_rejected_total, enable_failures_total,
};
pub use controller::ComponentController;
pub use counter::{COUNT_MASK, DependencyCounter, ENABLED_BIT};
pub use dependency::{LinkPhase, StrongDependency, WeakLease, WeakRef};
pub use error::{ConfigError, LifecycleError};
pub use observer::ComponentObserver;
pub use retry::{EnableRetrier, RetryPolicy};
pub use state::{ComponentId, ComponentInfo, ComponentState};

pub use depgate_core::{
    LabSequence, ObserverId, SequenceConfig, SequenceError, SequenceThread, SharedRunner,
    TaskRunner,
};
