#![forbid(unsafe_code)]

//! Deterministic, manually pumped sequences for tests and simulations.
//!
//! A [`LabSequence`] never runs anything on its own. Posted tasks wait in a
//! queue until the owner calls [`run_until_idle`](LabSequence::run_until_idle)
//! or [`advance`](LabSequence::advance). Delayed tasks are keyed against the
//! sequence's virtual clock, which only moves when the test advances it.
//!
//! # Sequence Affinity
//!
//! The thread that created the sequence is treated as being *on* the
//! sequence whenever it is not pumping some other sequence. This lets test
//! code call sequence-affine APIs directly, then pump to drain the follow-up
//! work. Any other thread is off-sequence and has its calls posted.

use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use web_time::{Duration, Instant};

use crate::error::SequenceError;
use crate::sequence::{
    Delayed, SequenceId, SequenceScope, SharedRunner, Task, TaskRunner, current_sequence,
};

/// Upper bound on tasks executed by a single `run_until_idle` call.
///
/// A task graph that keeps re-posting itself forever would otherwise hang the
/// test; hitting the bound panics with a clear message instead.
const MAX_TASKS_PER_PUMP: usize = 1_000_000;

// ─── LabSequence ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct LabQueue {
    ready: VecDeque<Task>,
    delayed: BinaryHeap<Delayed>,
    next_order: u64,
    executed: u64,
    /// Virtual time advanced since creation.
    elapsed: Duration,
}

impl LabQueue {
    fn now(&self, epoch: Instant) -> Instant {
        epoch + self.elapsed
    }
}

struct LabInner {
    id: SequenceId,
    owner: ThreadId,
    epoch: Instant,
    queue: Mutex<LabQueue>,
}

/// A sequence that only runs tasks when explicitly pumped.
///
/// Cheaply cloneable; clones share the queue.
#[derive(Clone)]
pub struct LabSequence {
    inner: Arc<LabInner>,
}

impl std::fmt::Debug for LabSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.queue();
        f.debug_struct("LabSequence")
            .field("id", &self.inner.id)
            .field("ready", &q.ready.len())
            .field("delayed", &q.delayed.len())
            .field("executed", &q.executed)
            .field("elapsed", &q.elapsed)
            .finish()
    }
}

impl Default for LabSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl LabSequence {
    /// Create a sequence owned by the calling thread. Its clock starts at
    /// `Instant::now()` and stands still until [`advance`](Self::advance).
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LabInner {
                id: SequenceId::next(),
                owner: thread::current().id(),
                epoch: Instant::now(),
                queue: Mutex::new(LabQueue::default()),
            }),
        }
    }

    /// Identity of this sequence.
    #[must_use]
    pub fn id(&self) -> SequenceId {
        self.inner.id
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.queue().now(self.inner.epoch)
    }

    /// Virtual time advanced since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.queue().elapsed
    }

    /// A shareable runner posting to this sequence.
    #[must_use]
    pub fn runner(&self) -> SharedRunner {
        Arc::new(self.clone())
    }

    /// Number of tasks runnable right now (including due delayed tasks).
    #[must_use]
    pub fn ready_len(&self) -> usize {
        let q = self.queue();
        let now = q.now(self.inner.epoch);
        q.ready.len() + q.delayed.iter().filter(|d| d.deadline <= now).count()
    }

    /// Number of delayed tasks whose deadline has not yet arrived.
    #[must_use]
    pub fn delayed_len(&self) -> usize {
        let q = self.queue();
        let now = q.now(self.inner.epoch);
        q.delayed.iter().filter(|d| d.deadline > now).count()
    }

    /// Total tasks executed so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.queue().executed
    }

    /// Run a single runnable task. Returns `false` if none was runnable.
    pub fn run_one(&self) -> bool {
        let Some(task) = self.pop_runnable() else {
            return false;
        };
        let _scope = SequenceScope::enter(self.inner.id);
        task();
        true
    }

    /// Run tasks until nothing is runnable, including tasks posted by the
    /// tasks being run. Returns the number of tasks executed.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
            assert!(
                ran < MAX_TASKS_PER_PUMP,
                "lab sequence {} did not go idle after {ran} tasks",
                self.inner.id
            );
        }
        ran
    }

    /// Advance the clock by `delta` and run everything that becomes runnable.
    pub fn advance(&self, delta: Duration) -> usize {
        {
            let mut q = self.queue();
            q.elapsed = q.elapsed.saturating_add(delta);
        }
        self.run_until_idle()
    }

    fn queue(&self) -> MutexGuard<'_, LabQueue> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pop_runnable(&self) -> Option<Task> {
        let mut q = self.queue();
        let now = q.now(self.inner.epoch);
        while let Some(next) = q.delayed.peek()
            && next.deadline <= now
        {
            if let Some(due) = q.delayed.pop() {
                q.ready.push_back(due.task);
            }
        }
        let task = q.ready.pop_front()?;
        q.executed += 1;
        Some(task)
    }
}

impl TaskRunner for LabSequence {
    fn sequence_id(&self) -> SequenceId {
        self.inner.id
    }

    fn post_task(&self, task: Task) -> Result<(), SequenceError> {
        self.queue().ready.push_back(task);
        Ok(())
    }

    fn post_delayed_task(&self, task: Task, delay: Duration) -> Result<(), SequenceError> {
        if delay.is_zero() {
            return self.post_task(task);
        }
        let mut q = self.queue();
        let deadline = q.now(self.inner.epoch) + delay;
        let order = q.next_order;
        q.next_order += 1;
        q.delayed.push(Delayed {
            deadline,
            order,
            task,
        });
        Ok(())
    }

    fn runs_tasks_in_current_sequence(&self) -> bool {
        match current_sequence() {
            Some(id) => id == self.inner.id,
            None => thread::current().id() == self.inner.owner,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::run_or_post;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        let make = move |tag: &'static str| -> Task {
            let log = Arc::clone(&log2);
            Box::new(move || log.lock().unwrap().push(tag))
        };
        (log, make)
    }

    #[test]
    fn nothing_runs_until_pumped() {
        let seq = LabSequence::new();
        let (log, task) = recorder();
        seq.post_task(task("a")).unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(seq.ready_len(), 1);
        assert_eq!(seq.run_until_idle(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn run_until_idle_drains_reposted_tasks() {
        let seq = LabSequence::new();
        let (log, task) = recorder();
        let again = seq.clone();
        let follow = task("second");
        let first = task("first");
        seq.post_task(Box::new(move || {
            first();
            again.post_task(follow).unwrap();
        }))
        .unwrap();
        assert_eq!(seq.run_until_idle(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn delayed_tasks_wait_for_clock() {
        let seq = LabSequence::new();
        let (log, task) = recorder();
        seq.post_delayed_task(task("late"), Duration::from_millis(50))
            .unwrap();
        seq.post_delayed_task(task("early"), Duration::from_millis(10))
            .unwrap();
        assert_eq!(seq.run_until_idle(), 0);
        assert_eq!(seq.delayed_len(), 2);

        assert_eq!(seq.advance(Duration::from_millis(10)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["early"]);

        assert_eq!(seq.advance(Duration::from_millis(40)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
        assert_eq!(seq.delayed_len(), 0);
    }

    #[test]
    fn owner_thread_is_on_sequence() {
        let seq = LabSequence::new();
        assert!(seq.runs_tasks_in_current_sequence());
        let other = seq.clone();
        let on = std::thread::spawn(move || other.runs_tasks_in_current_sequence())
            .join()
            .unwrap();
        assert!(!on);
    }

    #[test]
    fn pumping_one_sequence_is_off_another() {
        let a = LabSequence::new();
        let b = LabSequence::new();
        let (tx, rx) = std::sync::mpsc::channel();
        let b2 = b.clone();
        a.post_task(Box::new(move || {
            tx.send(b2.runs_tasks_in_current_sequence()).unwrap();
        }))
        .unwrap();
        a.run_until_idle();
        assert!(!rx.recv().unwrap());
    }

    #[test]
    fn run_or_post_runs_inline_on_owner() {
        let seq = LabSequence::new();
        let (log, _) = recorder();
        let l = Arc::clone(&log);
        run_or_post(&seq, move || l.lock().unwrap().push("inline")).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["inline"]);
        assert_eq!(seq.executed(), 0);
    }

    #[test]
    fn advance_accumulates_virtual_time() {
        let seq = LabSequence::new();
        let t0 = seq.now();
        seq.advance(Duration::from_millis(100));
        seq.advance(Duration::from_millis(200));
        assert_eq!(seq.now().duration_since(t0), Duration::from_millis(300));
        assert_eq!(seq.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn delay_is_measured_from_post_time() {
        let seq = LabSequence::new();
        let (log, task) = recorder();
        seq.advance(Duration::from_millis(30));
        seq.post_delayed_task(task("t"), Duration::from_millis(10))
            .unwrap();
        assert_eq!(seq.advance(Duration::from_millis(9)), 0);
        assert_eq!(seq.advance(Duration::from_millis(1)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["t"]);
    }
}
