#![forbid(unsafe_code)]

use std::sync::Arc;

use depgate::{Component, ComponentInfo, ComponentObserver, Lifecycle, ObserverId, SharedRunner};

use crate::event_log::{Event, EventLog};

/// Observer that appends [`Event::Enabled`] / [`Event::Disabled`] to a log.
#[derive(Debug, Clone)]
pub struct RecordingObserver {
    log: EventLog,
}

impl RecordingObserver {
    #[must_use]
    pub fn new(log: &EventLog) -> Arc<Self> {
        Arc::new(Self { log: log.clone() })
    }

    /// Register a recorder on `component`, delivered on `runner`.
    pub fn attach<T: Lifecycle>(
        component: &Component<T>,
        log: &EventLog,
        runner: SharedRunner,
    ) -> ObserverId {
        component.add_observer(Self::new(log), runner)
    }
}

impl ComponentObserver for RecordingObserver {
    fn on_component_enabled(&self, component: &ComponentInfo, success: bool) {
        self.log.push(Event::Enabled {
            component: component.name().to_owned(),
            success,
        });
    }

    fn on_component_disabled(&self, component: &ComponentInfo) {
        self.log
            .push(Event::Disabled(component.name().to_owned()));
    }
}
