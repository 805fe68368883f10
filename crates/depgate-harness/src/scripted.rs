#![forbid(unsafe_code)]

//! A component value whose hook replies are scripted by the test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use depgate::{
    Component, ComponentBuilder, DisableCompletion, EnableCompletion, Lifecycle, SharedRunner,
    StrongDependency,
};

use crate::event_log::{Event, EventLog};

/// How a hook answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reply {
    /// Complete inline with success.
    #[default]
    Succeed,
    /// Complete inline with failure (treated as `Succeed` for `on_disable`).
    Fail,
    /// Park the completion until the test calls
    /// [`Scripted::finish_enable`] / [`Scripted::finish_disable`].
    Manual,
}

/// Lifecycle fixture that records every hook call into an [`EventLog`].
///
/// On every `on_enable` it checks that all of its strong dependencies are
/// ready and records [`Event::PrematureEnable`] for each that is not.
pub struct Scripted {
    name: String,
    log: EventLog,
    dependencies: Vec<StrongDependency<Scripted>>,
    enable_script: Mutex<VecDeque<Reply>>,
    enable_default: Reply,
    disable_reply: Reply,
    parked_enable: Mutex<Option<EnableCompletion>>,
    parked_disable: Mutex<Option<DisableCompletion>>,
    enable_calls: AtomicUsize,
    disable_calls: AtomicUsize,
}

impl std::fmt::Debug for Scripted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scripted")
            .field("name", &self.name)
            .field("enable_calls", &self.enable_calls())
            .field("disable_calls", &self.disable_calls())
            .finish()
    }
}

impl Scripted {
    #[must_use]
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_owned(),
            log: log.clone(),
            dependencies: Vec::new(),
            enable_script: Mutex::new(VecDeque::new()),
            enable_default: Reply::Succeed,
            disable_reply: Reply::Succeed,
            parked_enable: Mutex::new(None),
            parked_disable: Mutex::new(None),
            enable_calls: AtomicUsize::new(0),
            disable_calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<StrongDependency<Scripted>>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Replies used, in order, for the next `on_enable` calls.
    #[must_use]
    pub fn enable_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.enable_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(replies);
        self
    }

    /// Reply once the scripted replies run out.
    #[must_use]
    pub fn enable_default(mut self, reply: Reply) -> Self {
        self.enable_default = reply;
        self
    }

    #[must_use]
    pub fn disable_reply(mut self, reply: Reply) -> Self {
        self.disable_reply = reply;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dependency(&self, index: usize) -> Option<&StrongDependency<Scripted>> {
        self.dependencies.get(index)
    }

    #[must_use]
    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_parked_enable(&self) -> bool {
        self.parked_enable
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    #[must_use]
    pub fn has_parked_disable(&self) -> bool {
        self.parked_disable
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Complete a parked `on_enable`. Returns `false` if none was parked.
    pub fn finish_enable(&self, success: bool) -> bool {
        let parked = self
            .parked_enable
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        match parked {
            Some(done) => {
                done.complete(success);
                true
            }
            None => false,
        }
    }

    /// Complete a parked `on_disable`. Returns `false` if none was parked.
    pub fn finish_disable(&self) -> bool {
        let parked = self
            .parked_disable
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        match parked {
            Some(done) => {
                done.complete();
                true
            }
            None => false,
        }
    }

    fn next_enable_reply(&self) -> Reply {
        self.enable_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or(self.enable_default)
    }
}

impl Lifecycle for Scripted {
    fn on_enable(&self, done: EnableCompletion) {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::EnableHook(self.name.clone()));
        for (index, dependency) in self.dependencies.iter().enumerate() {
            if !dependency.is_ready() {
                self.log.push(Event::PrematureEnable {
                    component: self.name.clone(),
                    dependency: index,
                });
            }
        }
        match self.next_enable_reply() {
            Reply::Succeed => done.succeed(),
            Reply::Fail => done.fail(),
            Reply::Manual => {
                *self.parked_enable.lock().unwrap_or_else(|p| p.into_inner()) = Some(done);
            }
        }
    }

    fn on_disable(&self, done: DisableCompletion) {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::DisableHook(self.name.clone()));
        match self.disable_reply {
            Reply::Succeed | Reply::Fail => done.complete(),
            Reply::Manual => {
                *self.parked_disable.lock().unwrap_or_else(|p| p.into_inner()) = Some(done);
            }
        }
    }
}

impl Drop for Scripted {
    fn drop(&mut self) {
        self.log.push(Event::Dropped(self.name.clone()));
    }
}

/// Build a [`Scripted`] component with strong dependencies on `dependencies`.
pub fn scripted(
    runner: SharedRunner,
    log: &EventLog,
    name: &str,
    dependencies: &[&Component<Scripted>],
) -> Component<Scripted> {
    scripted_with(runner, log, name, dependencies, |s| s)
}

/// Like [`scripted`], with a hook to adjust the fixture before it is built.
pub fn scripted_with(
    runner: SharedRunner,
    log: &EventLog,
    name: &str,
    dependencies: &[&Component<Scripted>],
    configure: impl FnOnce(Scripted) -> Scripted,
) -> Component<Scripted> {
    let mut builder = ComponentBuilder::new(runner, name);
    let links = dependencies
        .iter()
        .map(|dependency| builder.depends_on(*dependency))
        .collect();
    builder.build(configure(Scripted::new(name, log).with_dependencies(links)))
}

/// Convenience accessor for the fixture behind a component.
///
/// # Panics
///
/// Panics if the component has already been destroyed.
#[must_use]
pub fn fixture(component: &Component<Scripted>) -> Arc<Scripted> {
    component
        .value()
        .expect("component value is present until destroy")
}
