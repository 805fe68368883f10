#![forbid(unsafe_code)]

//! Component identity and lifecycle state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique component identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    pub(crate) fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value (for logging).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a component as reported to observers and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentInfo {
    id: ComponentId,
    name: Arc<str>,
}

impl ComponentInfo {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            id: ComponentId::next(),
            name: Arc::from(name),
        }
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Human-readable name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.id)
    }
}

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentState {
    /// Initial and resting state; the only state in which dependencies may be
    /// added and the component value may be freed.
    #[default]
    Disabled,
    /// Waiting for strong dependencies, or for `on_enable` to complete.
    Enabling,
    /// `on_enable` succeeded; weak leases may be acquired.
    Enabled,
    /// Dependents are being disabled, leases drained, or `on_disable` runs.
    Disabling,
    /// Disabling on the way to being freed; never enables again.
    Destroying,
}

impl ComponentState {
    /// Whether the component is enabled or on its way there.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Enabling | Self::Enabled)
    }

    /// Stable string tag for structured logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabling => "enabling",
            Self::Enabled => "enabled",
            Self::Disabling => "disabling",
            Self::Destroying => "destroying",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
