#![forbid(unsafe_code)]

//! Dedicated OS thread backing a sequence.
//!
//! [`SequenceThread`] owns one worker thread and an unbounded channel of
//! messages. Every task posted through its [`TaskRunner`] handle runs on that
//! thread, in posting order. Delayed tasks wait in a deadline heap and are
//! released when their deadline passes.
//!
//! # Ordering Rules
//!
//! - Immediate tasks run strictly FIFO.
//! - Delayed tasks run no earlier than their deadline; ties run in posting
//!   order.
//! - On shutdown, immediate tasks queued before the shutdown message still
//!   run; delayed tasks that are not yet due are dropped.
//! - A panicking task is logged as `sequence.task_panicked` and the worker
//!   moves on to the next task.
//!
//! The channel is unbounded: tasks routinely post follow-up tasks to their
//! own sequence, and a bounded channel could block the only thread able to
//! drain it.
//!
//! # Example
//!
//! ```
//! use depgate_core::{SequenceConfig, SequenceThread, TaskRunner};
//! use std::sync::mpsc;
//!
//! let seq = SequenceThread::start(SequenceConfig::default().with_name("worker")).unwrap();
//! let (tx, rx) = mpsc::channel();
//! seq.runner()
//!     .post_task(Box::new(move || tx.send(7).unwrap()))
//!     .unwrap();
//! assert_eq!(rx.recv().unwrap(), 7);
//! seq.shutdown();
//! ```

use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use web_time::{Duration, Instant};

use crate::error::SequenceError;
use crate::sequence::{Delayed, SequenceId, SequenceScope, SharedRunner, Task, TaskRunner};

const DEFAULT_THREAD_NAME: &str = "depgate-sequence";

// ─── Configuration ───────────────────────────────────────────────────────────

/// Configuration for a [`SequenceThread`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceConfig {
    /// OS thread name (visible in debuggers and panic messages).
    pub name: String,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl SequenceConfig {
    /// Set the worker thread name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

// ─── Messages ────────────────────────────────────────────────────────────────

enum SeqMsg {
    Run(Task),
    RunAt(Instant, Task),
    Shutdown,
}

// ─── Runner handle ───────────────────────────────────────────────────────────

struct ThreadRunner {
    id: SequenceId,
    sender: mpsc::Sender<SeqMsg>,
}

impl ThreadRunner {
    fn send(&self, msg: SeqMsg) -> Result<(), SequenceError> {
        self.sender.send(msg).map_err(|_| SequenceError::Closed {
            sequence: self.id.raw(),
        })
    }
}

impl TaskRunner for ThreadRunner {
    fn sequence_id(&self) -> SequenceId {
        self.id
    }

    fn post_task(&self, task: Task) -> Result<(), SequenceError> {
        self.send(SeqMsg::Run(task))
    }

    fn post_delayed_task(&self, task: Task, delay: Duration) -> Result<(), SequenceError> {
        if delay.is_zero() {
            return self.post_task(task);
        }
        self.send(SeqMsg::RunAt(Instant::now() + delay, task))
    }
}

// ─── SequenceThread ──────────────────────────────────────────────────────────

/// Handle to a running sequence thread.
///
/// Dropping the handle shuts the thread down and joins it.
pub struct SequenceThread {
    runner: Arc<ThreadRunner>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SequenceThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceThread")
            .field("id", &self.runner.id)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl SequenceThread {
    /// Spawn the worker thread.
    pub fn start(config: SequenceConfig) -> Result<Self, SequenceError> {
        let id = SequenceId::next();
        let (tx, rx) = mpsc::channel::<SeqMsg>();
        let handle = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || sequence_loop(id, rx))?;
        tracing::debug!(message = "sequence.start", sequence = id.raw(), name = %config.name);
        Ok(Self {
            runner: Arc::new(ThreadRunner { id, sender: tx }),
            handle: Some(handle),
        })
    }

    /// Identity of this sequence.
    #[must_use]
    pub fn id(&self) -> SequenceId {
        self.runner.id
    }

    /// A shareable runner posting to this thread.
    #[must_use]
    pub fn runner(&self) -> SharedRunner {
        self.runner.clone()
    }

    /// Stop the worker after already-queued immediate tasks, then join it.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.runner.sender.send(SeqMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let joined = handle.join();
            if joined.is_err() {
                tracing::warn!(
                    message = "sequence.worker_panicked",
                    sequence = self.runner.id.raw()
                );
            }
        }
    }
}

impl Drop for SequenceThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// The worker's main loop.
///
/// Runs due delayed tasks, then blocks for the next message, waking early
/// when the earliest delayed deadline arrives.
fn sequence_loop(id: SequenceId, rx: mpsc::Receiver<SeqMsg>) {
    let _scope = SequenceScope::enter(id);
    let mut delayed: BinaryHeap<Delayed> = BinaryHeap::new();
    let mut order: u64 = 0;

    loop {
        let now = Instant::now();
        while let Some(next) = delayed.peek()
            && next.deadline <= now
        {
            if let Some(due) = delayed.pop() {
                run_task(id, due.task);
            }
        }

        let msg = match delayed.peek() {
            Some(next) => {
                let wait = next.deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(msg) => msg,
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };

        match msg {
            SeqMsg::Run(task) => run_task(id, task),
            SeqMsg::RunAt(deadline, task) => {
                delayed.push(Delayed {
                    deadline,
                    order,
                    task,
                });
                order += 1;
            }
            SeqMsg::Shutdown => break,
        }
    }

    if !delayed.is_empty() {
        tracing::debug!(
            message = "sequence.dropped_delayed",
            sequence = id.raw(),
            count = delayed.len()
        );
    }
}

fn run_task(id: SequenceId, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        tracing::error!(
            message = "sequence.task_panicked",
            sequence = id.raw(),
            reason = %reason
        );
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
