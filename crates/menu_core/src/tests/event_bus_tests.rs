use super::*;
use anyhow::anyhow;
use shared::domain::{DocumentState, ResourceId};

type BoxedHandler = Box<dyn FnMut(&Event) -> anyhow::Result<()>>;

fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> BoxedHandler) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let make = move |name: &'static str| {
        let sink = Rc::clone(&sink);
        Box::new(move |event: &Event| {
            sink.borrow_mut().push(format!("{name}:{:?}", event.kind()));
            Ok(())
        }) as BoxedHandler
    };
    (log, make)
}

fn document(id: &str) -> Event {
    Event::document(DocumentState::new(id))
}

#[test]
fn delivers_in_registration_order() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    bus.subscribe(EventKind::DocumentChanged, make("first"));
    bus.subscribe(EventKind::DocumentChanged, make("second"));

    let report = bus.publish(&document("hg38"));

    assert_eq!(report.delivered, 2);
    assert!(report.faults.is_empty());
    assert_eq!(
        *log.borrow(),
        vec!["first:DocumentChanged", "second:DocumentChanged"]
    );
}

#[test]
fn only_matching_kind_is_delivered() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    bus.subscribe(EventKind::SessionStatusChanged, make("session"));

    let report = bus.publish(&Event::resource(ResourceId::EXTRAS, true));

    assert_eq!(report.delivered, 0);
    assert!(log.borrow().is_empty());
}

#[test]
fn failing_and_panicking_subscribers_are_isolated() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    bus.subscribe(EventKind::DocumentChanged, make("first"));
    bus.subscribe(EventKind::DocumentChanged, |_event: &Event| {
        Err(anyhow!("catalog lookup failed"))
    });
    bus.subscribe(EventKind::DocumentChanged, |_event: &Event| -> anyhow::Result<()> {
        panic!("subscriber bug")
    });
    bus.subscribe(EventKind::DocumentChanged, make("fourth"));

    let report = bus.publish(&document("hg19"));

    assert_eq!(report.delivered, 2);
    assert_eq!(report.faults.len(), 2);
    assert!(matches!(
        &report.faults[0],
        SubscriberFault::Failed { message, .. } if message.contains("catalog lookup failed")
    ));
    assert!(matches!(
        &report.faults[1],
        SubscriberFault::Panicked { message, .. } if message.contains("subscriber bug")
    ));
    assert_eq!(
        *log.borrow(),
        vec!["first:DocumentChanged", "fourth:DocumentChanged"]
    );
}

#[test]
fn late_subscribers_see_no_history() {
    let bus = EventBus::new();
    bus.publish(&document("hg38"));

    let (log, make) = recorder();
    bus.subscribe(EventKind::DocumentChanged, make("late"));
    assert!(log.borrow().is_empty());

    bus.publish(&document("mm10"));
    assert_eq!(*log.borrow(), vec!["late:DocumentChanged"]);
}

#[test]
fn unsubscribe_is_idempotent() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    let token = bus.subscribe(EventKind::DocumentChanged, make("gone"));

    assert!(bus.unsubscribe(token));
    assert!(!bus.unsubscribe(token));
    bus.publish(&document("hg38"));

    assert!(log.borrow().is_empty());
    assert_eq!(bus.subscriber_count(EventKind::DocumentChanged), 0);
}

#[test]
fn subscriber_removed_mid_publish_receives_nothing_further() {
    let bus = Rc::new(EventBus::new());
    let (log, make) = recorder();
    let victim = Rc::new(Cell::new(None::<SubscriptionToken>));

    let bus_for_handler = Rc::clone(&bus);
    let victim_for_handler = Rc::clone(&victim);
    bus.subscribe(EventKind::DocumentChanged, move |_event: &Event| {
        if let Some(token) = victim_for_handler.get() {
            bus_for_handler.unsubscribe(token);
        }
        Ok(())
    });
    victim.set(Some(bus.subscribe(EventKind::DocumentChanged, make("victim"))));

    let report = bus.publish(&document("hg38"));

    assert_eq!(report.delivered, 1);
    assert!(log.borrow().is_empty());
}

#[test]
fn subscriber_added_mid_publish_waits_for_next_event() {
    let bus = Rc::new(EventBus::new());
    let (log, make) = recorder();

    let bus_for_handler = Rc::clone(&bus);
    let added = Cell::new(false);
    bus.subscribe(EventKind::DocumentChanged, move |_event: &Event| {
        if !added.replace(true) {
            bus_for_handler.subscribe(EventKind::DocumentChanged, make("added"));
        }
        Ok(())
    });

    bus.publish(&document("hg38"));
    assert!(log.borrow().is_empty());

    bus.publish(&document("mm10"));
    assert_eq!(*log.borrow(), vec!["added:DocumentChanged"]);
}

#[test]
fn nested_publish_reaches_busy_handler_after_it_returns() {
    let bus = Rc::new(EventBus::new());
    let seen = Rc::new(RefCell::new(Vec::<String>::new()));
    let nested = Rc::new(RefCell::new(None::<PublishReport>));

    let bus_for_handler = Rc::clone(&bus);
    let seen_by_handler = Rc::clone(&seen);
    let nested_for_handler = Rc::clone(&nested);
    bus.subscribe(EventKind::DocumentChanged, move |event: &Event| {
        if let Event::DocumentChanged(Some(document)) = event {
            seen_by_handler.borrow_mut().push(document.id.to_string());
        }
        if nested_for_handler.borrow().is_none() {
            let report = bus_for_handler.publish(&document("mm10"));
            *nested_for_handler.borrow_mut() = Some(report);
        }
        Ok(())
    });
    let (log, make) = recorder();
    bus.subscribe(EventKind::DocumentChanged, make("other"));

    let outer = bus.publish(&document("hg38"));

    assert_eq!(*seen.borrow(), vec!["hg38", "mm10"]);
    assert_eq!(
        *log.borrow(),
        vec!["other:DocumentChanged", "other:DocumentChanged"]
    );
    assert_eq!(outer.delivered, 3);
    assert!(outer.faults.is_empty());

    let nested = nested.borrow();
    let nested = nested.as_ref().expect("nested publish ran");
    assert_eq!(nested.delivered, 1);
    assert_eq!(nested.deferred, 1);
    assert!(nested.faults.is_empty());
}

#[test]
fn deferred_event_skips_handler_removed_before_flush() {
    let bus = Rc::new(EventBus::new());
    let calls = Rc::new(Cell::new(0));
    let token = Rc::new(Cell::new(None::<SubscriptionToken>));

    let bus_for_handler = Rc::clone(&bus);
    let calls_in_handler = Rc::clone(&calls);
    let token_in_handler = Rc::clone(&token);
    let own = bus.subscribe(EventKind::DocumentChanged, move |_event: &Event| {
        calls_in_handler.set(calls_in_handler.get() + 1);
        bus_for_handler.publish(&document("mm10"));
        if let Some(own) = token_in_handler.get() {
            bus_for_handler.unsubscribe(own);
        }
        Ok(())
    });
    token.set(Some(own));

    let report = bus.publish(&document("hg38"));
    assert_eq!(calls.get(), 1);
    assert_eq!(report.delivered, 1);
    assert!(!bus.is_subscribed(own));
}

#[test]
fn queued_events_from_other_threads_dispatch_in_order() {
    let bus = EventBus::new();
    let (log, make) = recorder();
    bus.subscribe(EventKind::DocumentChanged, make("doc"));
    bus.subscribe(EventKind::ResourceAvailabilityChanged, make("res"));

    let publisher = bus.publisher();
    std::thread::spawn(move || {
        publisher.publish(document("hg38"));
        publisher.publish(Event::resource(ResourceId::SESSION_FILE, true));
    })
    .join()
    .expect("publisher thread");

    assert!(log.borrow().is_empty());
    assert_eq!(bus.dispatch_queued(), 2);
    assert_eq!(
        *log.borrow(),
        vec!["doc:DocumentChanged", "res:ResourceAvailabilityChanged"]
    );
    assert_eq!(bus.dispatch_queued(), 0);
}
