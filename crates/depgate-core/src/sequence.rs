#![forbid(unsafe_code)]

//! Sequenced execution contexts.
//!
//! A *sequence* is a single-threaded task queue: tasks posted to it run one
//! at a time, in posting order, never concurrently with each other. State
//! that is only touched from tasks on one sequence needs no further
//! synchronization.
//!
//! # Design
//!
//! [`TaskRunner`] is the narrow contract the lifecycle engine consumes:
//!
//! - `post_task`: enqueue a task to run later on the sequence.
//! - `post_delayed_task`: enqueue a task that becomes runnable after a delay.
//! - `runs_tasks_in_current_sequence`: whether the calling code is already
//!   executing on the sequence.
//!
//! [`run_or_post`] combines these into "run now if on this context, else
//! post", which is how cross-sequence calls are routed.
//!
//! The calling sequence is tracked in a thread-local that runner
//! implementations set while executing a task (see [`SequenceScope`]).

use std::cell::Cell;
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

use crate::error::SequenceError;

/// A unit of work posted to a sequence.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared, type-erased handle to a sequence.
pub type SharedRunner = Arc<dyn TaskRunner>;

// ─── Sequence identity ───────────────────────────────────────────────────────

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(u64);

impl SequenceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value (for logging).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seq#{}", self.0)
    }
}

thread_local! {
    static CURRENT_SEQUENCE: Cell<Option<SequenceId>> = const { Cell::new(None) };
}

/// The sequence whose task is executing on this thread, if any.
#[must_use]
pub fn current_sequence() -> Option<SequenceId> {
    CURRENT_SEQUENCE.with(Cell::get)
}

/// Marks the current thread as executing tasks for a sequence until dropped.
///
/// Scopes nest: dropping restores whatever sequence was current before.
pub(crate) struct SequenceScope {
    prev: Option<SequenceId>,
}

impl SequenceScope {
    pub(crate) fn enter(id: SequenceId) -> Self {
        let prev = CURRENT_SEQUENCE.with(|c| c.replace(Some(id)));
        Self { prev }
    }
}

impl Drop for SequenceScope {
    fn drop(&mut self) {
        CURRENT_SEQUENCE.with(|c| c.set(self.prev));
    }
}

// ─── TaskRunner ──────────────────────────────────────────────────────────────

/// A single-threaded task queue.
pub trait TaskRunner: Send + Sync {
    /// Identity of the sequence this runner feeds.
    fn sequence_id(&self) -> SequenceId;

    /// Post a task to run on the sequence after already-queued tasks.
    fn post_task(&self, task: Task) -> Result<(), SequenceError>;

    /// Post a task that becomes runnable once `delay` has elapsed.
    fn post_delayed_task(&self, task: Task, delay: Duration) -> Result<(), SequenceError>;

    /// Whether the caller is currently executing on this sequence.
    fn runs_tasks_in_current_sequence(&self) -> bool {
        current_sequence() == Some(self.sequence_id())
    }
}

/// Run `task` inline if the caller is on `runner`'s sequence, else post it.
pub fn run_or_post<F>(runner: &dyn TaskRunner, task: F) -> Result<(), SequenceError>
where
    F: FnOnce() + Send + 'static,
{
    if runner.runs_tasks_in_current_sequence() {
        task();
        Ok(())
    } else {
        runner.post_task(Box::new(task))
    }
}

// ─── Delayed task heap entry ─────────────────────────────────────────────────

/// A delayed task keyed by deadline, then by posting order.
///
/// `Ord` is reversed so that a `BinaryHeap` pops the earliest deadline first.
pub(crate) struct Delayed {
    pub(crate) deadline: Instant,
    pub(crate) order: u64,
    pub(crate) task: Task,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.order == other.order
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.order.cmp(&self.order))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
