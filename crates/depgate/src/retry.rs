#![forbid(unsafe_code)]

//! Re-enabling components whose `on_enable` failed.
//!
//! The state machine itself never retries: a failed enable lands the
//! component back in `Disabled` and observers hear `enabled(false)`.
//! [`EnableRetrier`] is such an observer. It schedules another `enable()`
//! after an exponential backoff taken from a [`RetryPolicy`], and gives up
//! after [`RetryPolicy::max_attempts`] consecutive failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use depgate_core::ObserverId;
use web_time::Duration;

use crate::component::{Component, Lifecycle};
use crate::controller::ComponentController;
use crate::error::ConfigError;
use crate::observer::ComponentObserver;
use crate::state::ComponentInfo;

/// Exponential backoff for enable retries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "policy-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Retries allowed before giving up. `0` retries forever.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Check the policy for values the backoff math cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "initial_delay_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                field: "multiplier",
                reason: format!("must be a finite value >= 1.0, got {}", self.multiplier),
            });
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::Invalid {
                field: "max_delay_ms",
                reason: format!(
                    "must be at least initial_delay_ms ({})",
                    self.initial_delay_ms
                ),
            });
        }
        Ok(())
    }

    /// Whether retry number `attempt` (1-based) is allowed.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

// ─── EnableRetrier ───────────────────────────────────────────────────────────

/// Observer that re-enables a component after a failed enable.
pub struct EnableRetrier {
    policy: RetryPolicy,
    controller: ComponentController,
    attempts: AtomicU32,
}

impl std::fmt::Debug for EnableRetrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnableRetrier")
            .field("component", self.controller.info())
            .field("attempts", &self.attempts())
            .finish()
    }
}

impl EnableRetrier {
    /// A retrier for the component behind `controller`. Register it with
    /// [`Component::add_observer`], or use [`attach`](Self::attach).
    #[must_use]
    pub fn new(policy: RetryPolicy, controller: ComponentController) -> Arc<Self> {
        Arc::new(Self {
            policy,
            controller,
            attempts: AtomicU32::new(0),
        })
    }

    /// Create a retrier and register it on the component's own sequence.
    pub fn attach<T: Lifecycle>(
        component: &Component<T>,
        policy: RetryPolicy,
    ) -> (Arc<Self>, ObserverId) {
        let retrier = Self::new(policy, component.controller());
        let id = component.add_observer(retrier.clone(), Arc::clone(component.runner()));
        (retrier, id)
    }

    /// Consecutive failed enables since the last success.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl ComponentObserver for EnableRetrier {
    fn on_component_enabled(&self, component: &ComponentInfo, success: bool) {
        if component.id() != self.controller.id() {
            return;
        }
        if success {
            self.attempts.store(0, Ordering::Release);
            return;
        }
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.policy.allows(attempt) {
            tracing::warn!(
                message = "component.retry_exhausted",
                component = %component,
                attempts = attempt - 1
            );
            return;
        }
        let delay = self.policy.delay_for(attempt);
        tracing::info!(
            message = "component.retry_scheduled",
            component = %component,
            attempt,
            delay_ms = delay.as_millis() as u64
        );
        let controller = self.controller.clone();
        let posted = self.controller.runner().post_delayed_task(
            Box::new(move || {
                if let Err(err) = controller.enable() {
                    tracing::debug!(message = "component.retry_dropped", error = %err);
                }
            }),
            delay,
        );
        if let Err(err) = posted {
            tracing::debug!(message = "component.retry_dropped", error = %err);
        }
    }
}
