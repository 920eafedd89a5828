//! Synchronous, kind-keyed publish/subscribe for menu state events.
//!
//! Delivery happens on the caller's thread, in registration order. A
//! subscriber that fails or panics is reported and skipped; the rest still
//! see the event. A handler that publishes an event it is itself subscribed
//! to gets that event after its current call returns, before the outermost
//! `publish` does. Other threads hand events over through an
//! [`EventPublisher`], and the UI loop forwards them with
//! [`EventBus::dispatch_queued`].

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use shared::events::{Event, EventKind};
use thiserror::Error;

use crate::task_runner::panic_message;

type Handler = Rc<RefCell<dyn FnMut(&Event) -> anyhow::Result<()>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

struct Subscription {
    token: SubscriptionToken,
    kind: EventKind,
    handler: Handler,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriberFault {
    #[error("subscriber {token:?} failed: {message}")]
    Failed {
        token: SubscriptionToken,
        message: String,
    },
    #[error("subscriber {token:?} panicked: {message}")]
    Panicked {
        token: SubscriptionToken,
        message: String,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub faults: Vec<SubscriberFault>,
    /// Subscribers that were mid-call; they get the event once they return.
    pub deferred: usize,
}

pub struct EventBus {
    subscriptions: RefCell<Vec<Subscription>>,
    next_token: Cell<u64>,
    depth: Cell<usize>,
    deferred: RefCell<VecDeque<(SubscriptionToken, Event)>>,
    queue_tx: Sender<Event>,
    queue_rx: Receiver<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = unbounded();
        Self {
            subscriptions: RefCell::new(Vec::new()),
            next_token: Cell::new(1),
            depth: Cell::new(0),
            deferred: RefCell::new(VecDeque::new()),
            queue_tx,
            queue_rx,
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: FnMut(&Event) -> anyhow::Result<()> + 'static,
    {
        let token = SubscriptionToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        self.subscriptions.borrow_mut().push(Subscription {
            token,
            kind,
            handler: Rc::new(RefCell::new(handler)),
        });
        tracing::trace!(?kind, token = token.0, "subscribed");
        token
    }

    /// Returns `false` when the token was not (or no longer) registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscriptions = self.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.token != token);
        before != subscriptions.len()
    }

    pub fn is_subscribed(&self, token: SubscriptionToken) -> bool {
        self.subscriptions.borrow().iter().any(|s| s.token == token)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .borrow()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    pub fn publish(&self, event: &Event) -> PublishReport {
        let kind = event.kind();
        // Snapshot so handlers may (un)subscribe while we deliver.
        let targets: Vec<(SubscriptionToken, Handler)> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| (s.token, Rc::clone(&s.handler)))
            .collect();

        let mut report = PublishReport::default();
        self.depth.set(self.depth.get() + 1);
        for (token, handler) in targets {
            if !self.is_subscribed(token) {
                continue;
            }
            match deliver(token, &handler, event) {
                Some(outcome) => record(&mut report, kind, outcome),
                None => {
                    self.deferred.borrow_mut().push_back((token, event.clone()));
                    report.deferred += 1;
                }
            }
        }
        if self.depth.get() == 1 {
            self.flush_deferred(&mut report);
        }
        self.depth.set(self.depth.get() - 1);
        tracing::trace!(
            ?kind,
            delivered = report.delivered,
            deferred = report.deferred,
            "event published"
        );
        report
    }

    /// Hand nested publishes to the subscribers that were busy when they
    /// happened. Runs only at the outermost publish.
    fn flush_deferred(&self, report: &mut PublishReport) {
        loop {
            let Some((token, event)) = self.deferred.borrow_mut().pop_front() else {
                return;
            };
            let handler = self
                .subscriptions
                .borrow()
                .iter()
                .find(|s| s.token == token)
                .map(|s| Rc::clone(&s.handler));
            let Some(handler) = handler else {
                continue;
            };
            match deliver(token, &handler, &event) {
                Some(outcome) => record(report, event.kind(), outcome),
                None => {
                    tracing::warn!(token = token.0, "subscriber still busy; deferred event dropped");
                }
            }
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.queue_tx.clone(),
        }
    }

    /// Publish every event queued by [`EventPublisher`]s, in enqueue order.
    pub fn dispatch_queued(&self) -> usize {
        let mut dispatched = 0;
        while let Ok(event) = self.queue_rx.try_recv() {
            self.publish(&event);
            dispatched += 1;
        }
        dispatched
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn record(report: &mut PublishReport, kind: EventKind, outcome: Result<(), SubscriberFault>) {
    match outcome {
        Ok(()) => report.delivered += 1,
        Err(fault) => {
            tracing::warn!(?kind, %fault, "event subscriber fault isolated");
            report.faults.push(fault);
        }
    }
}

/// `None` when the handler is already running further up the stack.
fn deliver(
    token: SubscriptionToken,
    handler: &Handler,
    event: &Event,
) -> Option<Result<(), SubscriberFault>> {
    let Ok(mut handler) = handler.try_borrow_mut() else {
        return None;
    };
    Some(
        match panic::catch_unwind(AssertUnwindSafe(|| (*handler)(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SubscriberFault::Failed {
                token,
                message: format!("{err:#}"),
            }),
            Err(payload) => Err(SubscriberFault::Panicked {
                token,
                message: panic_message(payload.as_ref()),
            }),
        },
    )
}

/// Cloneable, thread-safe handle for queueing events onto the bus.
#[derive(Clone)]
pub struct EventPublisher {
    sender: Sender<Event>,
}

impl EventPublisher {
    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            tracing::debug!("event bus dropped; queued event discarded");
        }
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
