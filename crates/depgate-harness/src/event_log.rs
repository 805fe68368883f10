#![forbid(unsafe_code)]

//! Shared, ordered record of lifecycle events.
//!
//! Hooks and observers append to the same [`EventLog`], so a test can assert
//! on the global order in which things happened across components.

use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded event. Components are identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `on_enable` was invoked.
    EnableHook(String),
    /// `on_disable` was invoked.
    DisableHook(String),
    /// An observer heard `enabled(success)`.
    Enabled { component: String, success: bool },
    /// An observer heard `disabled`.
    Disabled(String),
    /// The component value was dropped.
    Dropped(String),
    /// `on_enable` ran while a strong dependency was not ready.
    PrematureEnable { component: String, dependency: usize },
}

impl Event {
    /// Component name the event is about.
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::EnableHook(name)
            | Self::DisableHook(name)
            | Self::Disabled(name)
            | Self::Dropped(name) => name,
            Self::Enabled { component, .. } | Self::PrematureEnable { component, .. } => component,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::EnableHook(_) => "enable_hook",
            Self::DisableHook(_) => "disable_hook",
            Self::Enabled { .. } => "enabled",
            Self::Disabled(_) => "disabled",
            Self::Dropped(_) => "dropped",
            Self::PrematureEnable { .. } => "premature_enable",
        }
    }
}

/// Cloneable handle to a shared event list.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        tracing::trace!(
            message = "harness.event",
            kind = event.kind(),
            component = event.component()
        );
        self.lock().push(event);
    }

    /// Copy of all events so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Index of the first event equal to `event`.
    #[must_use]
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.lock().iter().position(|e| e == event)
    }

    /// Number of events matching `pred`.
    #[must_use]
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.lock().iter().filter(|e| pred(e)).count()
    }

    /// Whether `first` was recorded, and recorded before `second` (if
    /// `second` was recorded at all).
    #[must_use]
    pub fn happened_before(&self, first: &Event, second: &Event) -> bool {
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Render the log as JSON Lines, one object per event.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for (seq, event) in self.lock().iter().enumerate() {
            let mut line = serde_json::json!({
                "seq": seq,
                "kind": event.kind(),
                "component": event.component(),
            });
            match event {
                Event::Enabled { success, .. } => line["success"] = (*success).into(),
                Event::PrematureEnable { dependency, .. } => {
                    line["dependency"] = (*dependency).into();
                }
                _ => {}
            }
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
