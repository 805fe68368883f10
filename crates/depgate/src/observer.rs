#![forbid(unsafe_code)]

//! Component lifecycle observers.

use crate::state::ComponentInfo;

/// Receives enable and disable events for a component.
///
/// Events are always posted to the runner the observer registered with,
/// never delivered inline from the component's transition.
pub trait ComponentObserver: Send + Sync + 'static {
    /// An enable attempt finished. `success == false` means `on_enable`
    /// reported failure and the component is disabling again.
    fn on_component_enabled(&self, component: &ComponentInfo, success: bool) {
        let _ = (component, success);
    }

    /// The component finished disabling after having been enabled.
    fn on_component_disabled(&self, component: &ComponentInfo) {
        let _ = component;
    }
}
