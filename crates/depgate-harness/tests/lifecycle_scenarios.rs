//! End-to-end lifecycle scenarios on a deterministic lab sequence.
//!
//! Every test drives components on one or two [`LabSequence`]s and asserts on
//! the global [`EventLog`] order shared by hooks and observers.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use depgate::{
    Component, ComponentState, EnableRetrier, LifecycleError, LinkPhase, RetryPolicy,
    cycles_rejected_total,
};
use depgate_core::LabSequence;
use depgate_harness::{
    Event, EventLog, RecordingObserver, Reply, Scripted, fixture, scripted, scripted_with,
};

fn hook(name: &str) -> Event {
    Event::EnableHook(name.to_owned())
}

fn unhook(name: &str) -> Event {
    Event::DisableHook(name.to_owned())
}

fn disabled(name: &str) -> Event {
    Event::Disabled(name.to_owned())
}

fn dropped(name: &str) -> Event {
    Event::Dropped(name.to_owned())
}

fn enabled(name: &str, success: bool) -> Event {
    Event::Enabled {
        component: name.to_owned(),
        success,
    }
}

fn observe(seq: &LabSequence, log: &EventLog, components: &[&Component<Scripted>]) {
    for component in components {
        RecordingObserver::attach(component, log, seq.runner());
    }
}

fn assert_no_premature_enable(log: &EventLog) {
    let premature = log.count(|e| matches!(e, Event::PrematureEnable { .. }));
    assert_eq!(premature, 0, "events:\n{}", log.to_jsonl());
}

// ═════════════════════════════════════════════════════════════════════════
// Scenarios
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn leaf_enables_once_and_is_announced_once() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let b = scripted(seq.runner(), &log, "b", &[]);
    observe(&seq, &log, &[&b]);

    b.enable();
    seq.run_until_idle();

    assert_eq!(b.state(), ComponentState::Enabled);
    assert_eq!(fixture(&b).enable_calls(), 1);
    assert_eq!(log.count(|e| *e == enabled("b", true)), 1);
    assert!(b.weak_ref().is_enabled());
}

#[test]
fn enabling_dependent_enables_its_dependency_first() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let b = scripted_with(seq.runner(), &log, "b", &[], |s| {
        s.enable_default(Reply::Manual)
    });
    let a = scripted(seq.runner(), &log, "a", &[&b]);

    a.enable();
    seq.run_until_idle();
    assert_eq!(b.state(), ComponentState::Enabling);
    assert_eq!(a.state(), ComponentState::Enabling);
    assert!(fixture(&b).has_parked_enable());
    assert_eq!(fixture(&a).enable_calls(), 0);
    assert_eq!(fixture(&a).dependency(0).map(|d| d.phase()), Some(LinkPhase::Waiting));

    assert!(fixture(&b).finish_enable(true));
    seq.run_until_idle();

    assert_eq!(b.state(), ComponentState::Enabled);
    assert_eq!(a.state(), ComponentState::Enabled);
    assert!(log.happened_before(&hook("b"), &hook("a")));
    assert_no_premature_enable(&log);
    assert_eq!(b.lease_count(), 1);
    assert_eq!(b.dependent_count(), 1);
    let target = fixture(&a).dependency(0).and_then(|d| d.get());
    assert!(target.is_some_and(|t| t.name() == "b"));
}

#[test]
fn destroying_dependency_disables_dependent_first() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let b = scripted(seq.runner(), &log, "b", &[]);
    let a = scripted(seq.runner(), &log, "a", &[&b]);
    observe(&seq, &log, &[&a, &b]);
    a.enable();
    seq.run_until_idle();
    assert_eq!(a.state(), ComponentState::Enabled);

    b.destroy();
    seq.run_until_idle();

    assert_eq!(a.state(), ComponentState::Disabled);
    assert!(log.happened_before(&disabled("a"), &disabled("b")));
    assert!(log.happened_before(&unhook("a"), &unhook("b")));
    assert!(log.happened_before(&unhook("b"), &dropped("b")));
    assert_eq!(log.count(|e| *e == dropped("b")), 1);
    assert_eq!(log.count(|e| *e == dropped("a")), 0);
    assert_eq!(fixture(&a).dependency(0).map(|d| d.phase()), Some(LinkPhase::Idle));
}

#[test]
fn failed_enable_never_readies_dependents() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let b = scripted_with(seq.runner(), &log, "b", &[], |s| s.enable_default(Reply::Fail));
    let a = scripted(seq.runner(), &log, "a", &[&b]);
    observe(&seq, &log, &[&a, &b]);

    a.enable();
    seq.run_until_idle();

    assert_eq!(b.state(), ComponentState::Disabled);
    assert_eq!(a.state(), ComponentState::Disabled);
    assert_eq!(log.count(|e| *e == enabled("b", false)), 1);
    assert_eq!(fixture(&a).enable_calls(), 0);
    assert_eq!(fixture(&b).disable_calls(), 0);
    assert_eq!(log.count(|e| *e == disabled("b")), 0);
    assert!(b.weak_ref().try_acquire().is_none());
    assert_eq!(b.lease_count(), 0);
    assert_eq!(b.dependent_count(), 0);
}

// ═════════════════════════════════════════════════════════════════════════
// Transitions
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn repeated_enable_and_disable_run_each_hook_once() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted(seq.runner(), &log, "c", &[]);
    observe(&seq, &log, &[&c]);

    c.enable();
    c.enable();
    seq.run_until_idle();
    c.enable();
    c.disable();
    c.disable();
    seq.run_until_idle();
    c.disable();
    seq.run_until_idle();

    assert_eq!(c.state(), ComponentState::Disabled);
    assert_eq!(fixture(&c).enable_calls(), 1);
    assert_eq!(fixture(&c).disable_calls(), 1);
    assert_eq!(log.count(|e| *e == disabled("c")), 1);
}

#[test]
fn enable_during_disable_is_replayed() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted_with(seq.runner(), &log, "c", &[], |s| {
        s.disable_reply(Reply::Manual)
    });
    c.enable();
    seq.run_until_idle();
    c.disable();
    seq.run_until_idle();
    assert!(fixture(&c).has_parked_disable());

    c.enable();
    assert_eq!(c.state(), ComponentState::Disabling);
    assert!(fixture(&c).finish_disable());
    seq.run_until_idle();

    assert_eq!(c.state(), ComponentState::Enabled);
    assert_eq!(fixture(&c).enable_calls(), 2);
}

#[test]
fn disable_cancels_a_deferred_enable() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted_with(seq.runner(), &log, "c", &[], |s| {
        s.disable_reply(Reply::Manual)
    });
    c.enable();
    seq.run_until_idle();
    c.disable();
    seq.run_until_idle();
    c.enable();
    c.disable();
    assert!(fixture(&c).finish_disable());
    seq.run_until_idle();

    assert_eq!(c.state(), ComponentState::Disabled);
    assert_eq!(fixture(&c).enable_calls(), 1);
}

#[test]
fn weak_lease_holds_back_on_disable() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted(seq.runner(), &log, "c", &[]);
    let weak = c.weak_ref();
    c.enable();
    seq.run_until_idle();

    let lease = weak.try_acquire().expect("enabled component grants leases");
    assert_eq!(lease.name(), "c");
    c.disable();
    seq.run_until_idle();
    assert_eq!(c.state(), ComponentState::Disabling);
    assert_eq!(fixture(&c).disable_calls(), 0);
    assert!(weak.try_acquire().is_none());

    lease.release();
    seq.run_until_idle();
    assert_eq!(c.state(), ComponentState::Disabled);
    assert_eq!(fixture(&c).disable_calls(), 1);
    assert_eq!(weak.lease_count(), 0);
}

#[test]
fn destroy_during_on_enable_waits_for_the_hook() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted_with(seq.runner(), &log, "c", &[], |s| {
        s.enable_default(Reply::Manual)
    });
    let value = Arc::downgrade(&fixture(&c));
    c.enable();
    c.destroy();
    seq.run_until_idle();
    assert_eq!(log.count(|e| *e == dropped("c")), 0);

    let parked = value.upgrade().expect("value alive while on_enable is outstanding");
    assert!(parked.finish_enable(true));
    drop(parked);
    seq.run_until_idle();

    assert!(log.happened_before(&hook("c"), &unhook("c")));
    assert!(log.happened_before(&unhook("c"), &dropped("c")));
    assert!(value.upgrade().is_none());
}

#[test]
fn destroying_dependent_leaves_dependency_enabled() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let b = scripted(seq.runner(), &log, "b", &[]);
    let a = scripted(seq.runner(), &log, "a", &[&b]);
    a.enable();
    seq.run_until_idle();

    a.destroy();
    seq.run_until_idle();

    assert_eq!(b.state(), ComponentState::Enabled);
    assert_eq!(b.lease_count(), 0);
    assert_eq!(b.dependent_count(), 0);
    assert!(log.happened_before(&unhook("a"), &dropped("a")));
    assert_eq!(fixture(&b).disable_calls(), 0);
}

#[test]
fn shared_dependency_disables_after_all_dependents() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let base = scripted(seq.runner(), &log, "base", &[]);
    let left = scripted_with(seq.runner(), &log, "left", &[&base], |s| {
        s.disable_reply(Reply::Manual)
    });
    let right = scripted(seq.runner(), &log, "right", &[&base]);
    left.enable();
    right.enable();
    seq.run_until_idle();
    assert_eq!(base.lease_count(), 2);

    base.disable();
    seq.run_until_idle();
    assert_eq!(right.state(), ComponentState::Disabled);
    assert_eq!(left.state(), ComponentState::Disabling);
    assert_eq!(fixture(&base).disable_calls(), 0);

    assert!(fixture(&left).finish_disable());
    seq.run_until_idle();
    assert_eq!(base.state(), ComponentState::Disabled);
    assert!(log.happened_before(&unhook("left"), &unhook("base")));
    assert!(log.happened_before(&unhook("right"), &unhook("base")));
}

#[test]
fn stale_ready_delivery_is_ignored() {
    let seq_a = LabSequence::new();
    let seq_b = LabSequence::new();
    let log = EventLog::new();
    let b = scripted_with(seq_b.runner(), &log, "b", &[], |s| {
        s.enable_default(Reply::Manual)
    });
    let a = scripted(seq_a.runner(), &log, "a", &[&b]);

    a.enable();
    assert!(fixture(&b).finish_enable(true));
    // b enables and posts the ready notice to a's sequence.
    seq_b.run_until_idle();
    assert_eq!(b.state(), ComponentState::Enabled);

    a.disable();
    a.enable();
    seq_a.run_until_idle();
    seq_b.run_until_idle();

    assert_eq!(a.state(), ComponentState::Enabled);
    assert_eq!(fixture(&a).enable_calls(), 1);
    assert_eq!(b.lease_count(), 1);
    assert_no_premature_enable(&log);
}

#[test]
fn dependencies_added_after_construction_gate_enable() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let b = scripted(seq.runner(), &log, "b", &[]);
    let a = scripted(seq.runner(), &log, "a", &[]);
    let link = a.add_dependency(&b);
    assert_eq!(a.dependency_ids(), vec![b.id()]);
    assert!(a.depends_on(b.id()));

    a.enable();
    seq.run_until_idle();
    assert!(link.is_ready());
    assert!(log.happened_before(&hook("b"), &hook("a")));
}

#[test]
fn transitive_cycle_is_rejected() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let a = scripted(seq.runner(), &log, "a", &[]);
    let b = scripted(seq.runner(), &log, "b", &[&a]);
    let c = scripted(seq.runner(), &log, "c", &[&b]);
    let before = cycles_rejected_total();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = a.add_dependency(&c);
    }));
    assert!(outcome.is_err());
    assert!(cycles_rejected_total() > before);
    assert_eq!(a.dependency_count(), 0);
    assert!(!a.depends_on(c.id()));
}

// ═════════════════════════════════════════════════════════════════════════
// Controllers and retry
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn controller_posts_from_other_threads() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted(seq.runner(), &log, "c", &[]);
    let controller = c.controller();

    thread::spawn(move || controller.enable())
        .join()
        .expect("controller thread")
        .expect("component alive");
    assert_eq!(c.state(), ComponentState::Disabled);

    seq.run_until_idle();
    assert_eq!(c.state(), ComponentState::Enabled);
}

#[test]
fn controller_reports_gone_after_destroy() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted(seq.runner(), &log, "c", &[]);
    let controller = c.controller();
    let c_name = c.info().to_string();
    assert!(controller.is_alive());

    c.destroy();
    assert!(!controller.is_alive());
    let err = controller.enable().expect_err("destroyed component");
    assert!(matches!(err, LifecycleError::Gone { .. }));
    assert!(err.to_string().contains(&c_name));
}

#[test]
fn retrier_backs_off_then_succeeds() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted_with(seq.runner(), &log, "flaky", &[], |s| {
        s.enable_replies([Reply::Fail, Reply::Fail])
    });
    let policy = RetryPolicy::default()
        .with_initial_delay(Duration::from_millis(100))
        .with_multiplier(2.0);
    let (retrier, _id) = EnableRetrier::attach(&c, policy);

    c.enable();
    seq.run_until_idle();
    assert_eq!(c.state(), ComponentState::Disabled);
    assert_eq!(retrier.attempts(), 1);

    seq.advance(Duration::from_millis(99));
    assert_eq!(fixture(&c).enable_calls(), 1);
    seq.advance(Duration::from_millis(1));
    assert_eq!(fixture(&c).enable_calls(), 2);
    assert_eq!(retrier.attempts(), 2);

    seq.advance(Duration::from_millis(199));
    assert_eq!(c.state(), ComponentState::Disabled);
    seq.advance(Duration::from_millis(1));
    assert_eq!(c.state(), ComponentState::Enabled);
    assert_eq!(retrier.attempts(), 0);
}

#[test]
fn retrier_gives_up_after_max_attempts() {
    let seq = LabSequence::new();
    let log = EventLog::new();
    let c = scripted_with(seq.runner(), &log, "broken", &[], |s| {
        s.enable_default(Reply::Fail)
    });
    let policy = RetryPolicy::default()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_attempts(2);
    let (retrier, _id) = EnableRetrier::attach(&c, policy);

    c.enable();
    seq.run_until_idle();
    for _ in 0..5 {
        seq.advance(Duration::from_secs(1));
    }

    assert_eq!(fixture(&c).enable_calls(), 3);
    assert_eq!(retrier.attempts(), 3);
    assert_eq!(seq.delayed_len(), 0);
    assert_eq!(c.state(), ComponentState::Disabled);
}
