use super::*;
use shared::error::FailureCategory;
use std::sync::atomic::{AtomicU32, Ordering};

const WAIT: Duration = Duration::from_secs(5);

type Deliveries = Rc<RefCell<Vec<ProbeDelivery<u32>>>>;

/// Each call returns its 1-based call number; earlier calls take longer.
fn counting_probe() -> AsyncProbe<u32> {
    let calls = Arc::new(AtomicU32::new(0));
    AsyncProbe::new("counter", move || {
        let calls = Arc::clone(&calls);
        async move {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = 60u64.saturating_sub(u64::from(call) * 20);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, anyhow::Error>(call)
        }
    })
}

/// Listener that records every delivery and lets the probe filter them.
fn shared_probe(probe: AsyncProbe<u32>) -> (Rc<RefCell<AsyncProbe<u32>>>, Deliveries) {
    let probe = Rc::new(RefCell::new(probe));
    let seen: Deliveries = Rc::new(RefCell::new(Vec::new()));

    let weak = Rc::downgrade(&probe);
    let sink = Rc::clone(&seen);
    probe.borrow().set_listener(move |delivery: ProbeDelivery<u32>| {
        sink.borrow_mut().push(delivery.clone());
        if let Some(probe) = weak.upgrade() {
            probe.borrow_mut().accept(delivery);
        }
    });
    (probe, seen)
}

#[test]
fn start_moves_idle_probe_to_running_then_resolved() {
    let runner = TaskRunner::new(2).expect("runner");
    let (probe, seen) = shared_probe(counting_probe());
    assert_eq!(probe.borrow().state(), ProbeState::Idle);

    let version = probe.borrow_mut().start(&runner);
    assert_eq!(version, ProbeVersion(1));
    assert_eq!(probe.borrow().state(), ProbeState::Running);
    assert!(probe.borrow().latest().is_pending());

    assert!(runner.run_until_idle(WAIT));
    assert_eq!(seen.borrow().len(), 1);
    let probe = probe.borrow();
    assert_eq!(probe.state(), ProbeState::Resolved);
    assert_eq!(probe.latest(), &ProbeResult::Success(1));
}

#[test]
fn only_the_most_recent_start_is_applied() {
    let runner = TaskRunner::new(2).expect("runner");
    let (probe, seen) = shared_probe(counting_probe());

    probe.borrow_mut().start(&runner);
    probe.borrow_mut().start(&runner);
    let last = probe.borrow_mut().start(&runner);

    assert!(runner.run_until_idle(WAIT));
    runner.drain_timeout(Duration::from_millis(100));

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1, "superseded starts must not deliver");
    assert_eq!(seen[0].version, last);
    assert_eq!(probe.borrow().current_version(), ProbeVersion(3));
    assert_eq!(probe.borrow().latest(), &seen[0].result);
    assert!(probe.borrow().latest().success().is_some());
}

#[test]
fn stale_delivery_is_a_noop() {
    let runner = TaskRunner::new(1).expect("runner");
    let mut probe = counting_probe();
    probe.start(&runner);
    probe.start(&runner);

    let stale = ProbeDelivery {
        probe: probe.id().clone(),
        version: ProbeVersion(1),
        result: ProbeResult::Success(99),
    };
    assert!(!probe.accept(stale));
    assert!(probe.latest().is_pending());
    assert_eq!(probe.state(), ProbeState::Running);

    let current = ProbeDelivery {
        probe: probe.id().clone(),
        version: ProbeVersion(2),
        result: ProbeResult::Success(7),
    };
    assert!(probe.accept(current.clone()));
    assert_eq!(probe.latest(), &ProbeResult::Success(7));
    assert!(!probe.accept(current), "a version resolves once");
}

#[test]
fn cancel_keeps_result_pending_and_delivers_nothing() {
    let runner = TaskRunner::new(1).expect("runner");
    let (probe, seen) = shared_probe(counting_probe());

    probe.borrow_mut().start(&runner);
    probe.borrow_mut().cancel();
    probe.borrow_mut().cancel();

    runner.drain_timeout(Duration::from_millis(150));
    assert!(seen.borrow().is_empty());
    let probe = probe.borrow();
    assert_eq!(probe.state(), ProbeState::Cancelled);
    assert!(probe.latest().is_pending());
}

#[test]
fn failures_are_values() {
    let runner = TaskRunner::new(1).expect("runner");
    let failing = AsyncProbe::<u32>::new("auth", || async {
        Err::<u32, _>(anyhow!("HTTP 401 Unauthorized"))
    });
    let (probe, _seen) = shared_probe(failing);

    probe.borrow_mut().start(&runner);
    assert!(runner.run_until_idle(WAIT));

    let probe = probe.borrow();
    let failure = probe.latest().failure().expect("failure");
    assert_eq!(failure.category, FailureCategory::Auth);
    assert_eq!(probe.state(), ProbeState::Resolved);
}

#[test]
fn slow_checks_time_out() {
    let runner = TaskRunner::new(1).expect("runner");
    let slow = AsyncProbe::<u32>::new("session", || async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok::<u32, anyhow::Error>(1)
    })
    .with_timeout(Duration::from_millis(20));
    let (probe, _seen) = shared_probe(slow);

    probe.borrow_mut().start(&runner);
    assert!(runner.run_until_idle(WAIT));

    let probe = probe.borrow();
    let failure = probe.latest().failure().expect("timeout failure");
    assert!(failure.is_timeout(), "unexpected failure: {failure}");
}

#[test]
fn refresh_policy_decides_reruns() {
    let runner = TaskRunner::new(1).expect("runner");
    let (probe, _seen) = shared_probe(counting_probe());

    assert!(probe.borrow().needs_refresh(RefreshPolicy::Once));
    probe.borrow_mut().start(&runner);
    assert!(!probe.borrow().needs_refresh(RefreshPolicy::Always));
    assert!(runner.run_until_idle(WAIT));

    let probe = probe.borrow();
    assert!(probe.needs_refresh(RefreshPolicy::Always));
    assert!(!probe.needs_refresh(RefreshPolicy::Once));
    assert!(!probe.needs_refresh(RefreshPolicy::MaxAge(Duration::from_secs(60))));
    assert!(probe.needs_refresh(RefreshPolicy::MaxAge(Duration::ZERO)));
}

#[test]
fn failed_probe_is_retried_even_under_once() {
    let runner = TaskRunner::new(1).expect("runner");
    let failing = AsyncProbe::<u32>::new("bucket", || async {
        Err::<u32, _>(anyhow!("connection refused"))
    });
    let (probe, _seen) = shared_probe(failing);

    probe.borrow_mut().start(&runner);
    assert!(runner.run_until_idle(WAIT));
    assert!(probe.borrow().needs_refresh(RefreshPolicy::Once));
}

fn hanging_probe() -> AsyncProbe<u32> {
    AsyncProbe::new("hung", || async {
        futures::future::pending::<()>().await;
        Ok::<u32, anyhow::Error>(0)
    })
}

#[test]
fn untimed_check_that_hangs_is_replaced_after_stall_limit() {
    let runner = TaskRunner::new(1).expect("runner");
    let mut probe = hanging_probe().with_stall_limit(Duration::from_millis(40));

    probe.start(&runner);
    assert!(!probe.needs_refresh(RefreshPolicy::Always));
    std::thread::sleep(Duration::from_millis(60));
    assert!(probe.needs_refresh(RefreshPolicy::Always));
    assert!(probe.needs_refresh(RefreshPolicy::Once));

    let version = probe.start(&runner);
    assert_eq!(version, ProbeVersion(2));
    assert_eq!(runner.pending_count(), 1, "the hung run is cancelled");
    assert!(!probe.needs_refresh(RefreshPolicy::Always));
}

#[test]
fn max_age_shortens_the_stall_limit() {
    let runner = TaskRunner::new(1).expect("runner");
    let mut probe = hanging_probe();

    probe.start(&runner);
    std::thread::sleep(Duration::from_millis(30));
    assert!(!probe.needs_refresh(RefreshPolicy::Always));
    assert!(probe.needs_refresh(RefreshPolicy::MaxAge(Duration::from_millis(10))));
}

#[test]
fn timed_checks_are_never_treated_as_stalled() {
    let runner = TaskRunner::new(1).expect("runner");
    let mut probe = hanging_probe()
        .with_timeout(Duration::from_secs(30))
        .with_stall_limit(Duration::ZERO);

    probe.start(&runner);
    std::thread::sleep(Duration::from_millis(10));
    assert!(!probe.needs_refresh(RefreshPolicy::Always));
    probe.cancel();
}
