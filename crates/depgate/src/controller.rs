#![forbid(unsafe_code)]

//! Thread-safe enable/disable requests.

use std::sync::Arc;

use depgate_core::SharedRunner;

use crate::error::LifecycleError;
use crate::node::{LifecycleNode, NodeRef};
use crate::state::{ComponentId, ComponentInfo};

/// A clonable, `Send + Sync` handle that asks a component to enable or
/// disable.
///
/// Requests are always posted to the component's sequence, so a controller
/// can be used from any thread and from inside observers and hooks without
/// re-entering the state machine.
#[derive(Clone)]
pub struct ComponentController {
    target: NodeRef,
    info: ComponentInfo,
}

impl ComponentController {
    pub(crate) fn new(target: NodeRef, info: ComponentInfo) -> Self {
        Self { target, info }
    }

    #[must_use]
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.info.id()
    }

    /// Runner of the controlled component.
    #[must_use]
    pub fn runner(&self) -> &SharedRunner {
        self.target.runner()
    }

    /// Whether the component still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.target.upgrade().is_some()
    }

    /// Post an enable request.
    pub fn enable(&self) -> Result<(), LifecycleError> {
        self.dispatch("enable", |node| node.enable())
    }

    /// Post a disable request.
    pub fn disable(&self) -> Result<(), LifecycleError> {
        self.dispatch("disable", |node| node.disable())
    }

    fn dispatch<F>(&self, op: &'static str, f: F) -> Result<(), LifecycleError>
    where
        F: FnOnce(Arc<dyn LifecycleNode>) + Send + 'static,
    {
        if !self.is_alive() {
            return Err(LifecycleError::Gone {
                component: self.info.to_string(),
            });
        }
        self.target.try_post(f)?;
        tracing::trace!(
            message = "component.request_posted",
            component = %self.info,
            op,
            sequence = %self.target.runner().sequence_id()
        );
        Ok(())
    }
}

impl std::fmt::Debug for ComponentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentController")
            .field("info", &self.info)
            .field("alive", &self.is_alive())
            .finish()
    }
}
