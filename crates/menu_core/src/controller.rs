//! One controller per menu: owns the menu's controls, keeps them in step
//! with bus events and probe results, and starts probes when the menu opens.

use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    rc::{Rc, Weak},
};

use shared::{
    domain::{Affordance, ControlId, ProbeId},
    events::{Event, EventKind},
};

use crate::{
    binding::{AffordanceBinding, BoundControl, Control, KnownState, ProbeOutcome, ProbeResults},
    error::ControllerError,
    event_bus::{EventBus, SubscriptionToken},
    probe::{AsyncProbe, ProbeDelivery, ProbeResult, ProbeState, RefreshPolicy},
    task_runner::TaskRunner,
};

pub type MenuProbe = AsyncProbe<ProbeOutcome>;

/// How a controller schedules one of its probes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSpec {
    restart_on: Vec<EventKind>,
    policy: Option<RefreshPolicy>,
}

impl ProbeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-run the probe immediately whenever an event of `kind` arrives.
    pub fn restart_on(mut self, kind: EventKind) -> Self {
        if !self.restart_on.contains(&kind) {
            self.restart_on.push(kind);
        }
        self
    }

    /// Override the controller-wide refresh policy for this probe.
    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

struct ProbeEntry {
    probe: MenuProbe,
    spec: ProbeSpec,
}

struct ControllerInner {
    menu: String,
    known: KnownState,
    results: ProbeResults,
    controls: Vec<BoundControl>,
    probes: BTreeMap<ProbeId, ProbeEntry>,
    policy: RefreshPolicy,
    torn_down: bool,
}

impl ControllerInner {
    fn refresh<P>(&mut self, affected: P) -> usize
    where
        P: Fn(&AffordanceBinding) -> bool,
    {
        let Self {
            known,
            results,
            controls,
            ..
        } = self;
        let mut changed = 0;
        for control in controls.iter_mut().filter(|c| affected(c.binding())) {
            let next = control.binding().evaluate(known, results);
            if control.apply(next) {
                changed += 1;
            }
        }
        changed
    }

    fn start_probe(&mut self, id: &ProbeId, runner: &TaskRunner) {
        if let Some(entry) = self.probes.get_mut(id) {
            entry.probe.start(runner);
            self.results.set(id.clone(), ProbeResult::Pending);
        }
    }

    fn on_event(&mut self, event: &Event, runner: Option<&TaskRunner>) {
        if self.torn_down {
            tracing::trace!(menu = %self.menu, kind = ?event.kind(), "event after teardown dropped");
            return;
        }
        let kind = event.kind();
        self.known.apply(event);

        let restart: Vec<ProbeId> = self
            .probes
            .iter()
            .filter(|(_, entry)| entry.spec.restart_on.contains(&kind))
            .map(|(id, _)| id.clone())
            .collect();
        match runner {
            Some(runner) => {
                for id in &restart {
                    self.start_probe(id, runner);
                }
            }
            None if !restart.is_empty() => {
                tracing::debug!(menu = %self.menu, "task runner gone; probes not restarted");
            }
            None => {}
        }

        let changed = self.refresh(|binding| {
            binding.depends_on_event(kind) || restart.iter().any(|p| binding.depends_on_probe(p))
        });
        tracing::debug!(menu = %self.menu, ?kind, changed, "menu state updated from event");
    }

    fn on_probe_delivery(&mut self, delivery: ProbeDelivery<ProbeOutcome>) {
        if self.torn_down {
            tracing::trace!(menu = %self.menu, probe = %delivery.probe, "probe result after teardown dropped");
            return;
        }
        let id = delivery.probe.clone();
        let Some(entry) = self.probes.get_mut(&id) else {
            tracing::warn!(menu = %self.menu, probe = %id, "result for unknown probe");
            return;
        };
        if !entry.probe.accept(delivery) {
            return;
        }
        let latest = entry.probe.latest().clone();
        self.results.set(id.clone(), latest);
        let changed = self.refresh(|binding| binding.depends_on_probe(&id));
        tracing::debug!(menu = %self.menu, probe = %id, changed, "menu state updated from probe");
    }

    fn handle(&mut self, update: Deferred, runner: Option<&TaskRunner>) {
        match update {
            Deferred::Event(event) => self.on_event(&event, runner),
            Deferred::Delivery(delivery) => self.on_probe_delivery(delivery),
        }
    }
}

/// An update that reached the controller while it was mid-update.
enum Deferred {
    Event(Event),
    Delivery(ProbeDelivery<ProbeOutcome>),
}

/// Hands bus events and probe completions to a controller. Anything that
/// arrives while the controller is borrowed (a control pumping the UI loop
/// from inside a setter) is queued and replayed once the borrow ends.
#[derive(Clone)]
struct Router {
    menu: Rc<str>,
    inner: Weak<RefCell<ControllerInner>>,
    runner: Weak<TaskRunner>,
    backlog: Rc<RefCell<VecDeque<Deferred>>>,
}

impl Router {
    fn route(&self, update: Deferred) {
        let Some(inner) = self.inner.upgrade() else {
            tracing::trace!(menu = %self.menu, "controller dropped before update");
            return;
        };
        match inner.try_borrow_mut() {
            Ok(mut state) => {
                let runner = self.runner.upgrade();
                state.handle(update, runner.as_deref());
            }
            Err(_) => {
                tracing::debug!(menu = %self.menu, "menu controller busy; update deferred");
                self.backlog.borrow_mut().push_back(update);
                return;
            }
        }
        self.replay(&inner);
    }

    /// Apply queued updates in arrival order while the controller is free.
    fn replay(&self, inner: &RefCell<ControllerInner>) {
        loop {
            let Ok(mut state) = inner.try_borrow_mut() else {
                return;
            };
            let Some(update) = self.backlog.borrow_mut().pop_front() else {
                return;
            };
            let runner = self.runner.upgrade();
            state.handle(update, runner.as_deref());
        }
    }

    fn pending(&self) -> usize {
        self.backlog.borrow().len()
    }
}

pub struct MenuStateControllerBuilder {
    menu: String,
    known: KnownState,
    policy: RefreshPolicy,
    bindings: Vec<(Rc<dyn Control>, AffordanceBinding)>,
    probes: Vec<(MenuProbe, ProbeSpec)>,
}

impl MenuStateControllerBuilder {
    pub fn known_state(mut self, known: KnownState) -> Self {
        self.known = known;
        self
    }

    pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn bind(mut self, control: Rc<dyn Control>, binding: AffordanceBinding) -> Self {
        self.bindings.push((control, binding));
        self
    }

    pub fn probe(mut self, probe: MenuProbe, spec: ProbeSpec) -> Self {
        self.probes.push((probe, spec));
        self
    }

    fn validate(&self) -> Result<(), ControllerError> {
        let mut seen_probes: Vec<&ProbeId> = Vec::new();
        for (probe, _) in &self.probes {
            if seen_probes.contains(&probe.id()) {
                return Err(ControllerError::DuplicateProbe {
                    menu: self.menu.clone(),
                    probe: probe.id().clone(),
                });
            }
            seen_probes.push(probe.id());
        }

        let mut seen_controls: Vec<&ControlId> = Vec::new();
        for (_, binding) in &self.bindings {
            if seen_controls.contains(&binding.control()) {
                return Err(ControllerError::DuplicateBinding {
                    menu: self.menu.clone(),
                    control: binding.control().clone(),
                });
            }
            seen_controls.push(binding.control());

            if let Some(missing) = binding.probes().iter().find(|p| !seen_probes.contains(p)) {
                return Err(ControllerError::UnknownProbe {
                    control: binding.control().clone(),
                    probe: missing.clone(),
                });
            }
        }
        Ok(())
    }

    /// Wire the controller to `bus` and apply every binding once.
    pub fn build(
        self,
        bus: &Rc<EventBus>,
        runner: &Rc<TaskRunner>,
    ) -> Result<MenuStateController, ControllerError> {
        if let Err(err) = self.validate() {
            tracing::error!(menu = %self.menu, %err, "invalid menu controller definition");
            return Err(err);
        }

        let mut kinds: Vec<EventKind> = Vec::new();
        for kind in self
            .bindings
            .iter()
            .flat_map(|(_, b)| b.events().iter())
            .chain(self.probes.iter().flat_map(|(_, s)| s.restart_on.iter()))
        {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }

        let menu = self.menu;
        let inner = Rc::new(RefCell::new(ControllerInner {
            menu: menu.clone(),
            known: self.known,
            results: ProbeResults::default(),
            controls: self
                .bindings
                .into_iter()
                .map(|(control, binding)| BoundControl::new(control, binding))
                .collect(),
            probes: self
                .probes
                .into_iter()
                .map(|(probe, spec)| (probe.id().clone(), ProbeEntry { probe, spec }))
                .collect(),
            policy: self.policy,
            torn_down: false,
        }));

        let router = Router {
            menu: Rc::from(menu.as_str()),
            inner: Rc::downgrade(&inner),
            runner: Rc::downgrade(runner),
            backlog: Rc::new(RefCell::new(VecDeque::new())),
        };

        for entry in inner.borrow().probes.values() {
            let router = router.clone();
            entry
                .probe
                .set_listener(move |delivery| router.route(Deferred::Delivery(delivery)));
        }

        let subscriptions: Vec<SubscriptionToken> = kinds
            .into_iter()
            .map(|kind| {
                let router = router.clone();
                bus.subscribe(kind, move |event| {
                    router.route(Deferred::Event(event.clone()));
                    Ok(())
                })
            })
            .collect();

        let applied = inner.borrow_mut().refresh(|_| true);
        router.replay(&inner);
        tracing::debug!(menu = %menu, applied, "menu controller built");

        Ok(MenuStateController {
            menu,
            inner,
            router,
            bus: Rc::clone(bus),
            runner: Rc::clone(runner),
            subscriptions: RefCell::new(subscriptions),
        })
    }
}

/// Keeps one menu's controls consistent with events and probe results.
///
/// Lives on the UI thread. Dropping the controller tears it down.
pub struct MenuStateController {
    menu: String,
    inner: Rc<RefCell<ControllerInner>>,
    router: Router,
    bus: Rc<EventBus>,
    runner: Rc<TaskRunner>,
    subscriptions: RefCell<Vec<SubscriptionToken>>,
}

impl MenuStateController {
    pub fn builder(menu: impl Into<String>) -> MenuStateControllerBuilder {
        MenuStateControllerBuilder {
            menu: menu.into(),
            known: KnownState::default(),
            policy: RefreshPolicy::default(),
            bindings: Vec::new(),
            probes: Vec::new(),
        }
    }

    pub fn menu(&self) -> &str {
        &self.menu
    }

    /// Run `f` against the live controller, then replay anything that was
    /// deferred while it ran.
    fn with_state<R>(
        &self,
        f: impl FnOnce(&mut ControllerInner) -> R,
    ) -> Result<R, ControllerError> {
        debug_assert!(
            self.runner.is_ui_thread(),
            "menu controllers must be driven from the UI thread"
        );
        let out = {
            let mut inner = self.inner.try_borrow_mut().map_err(|_| ControllerError::Busy {
                menu: self.menu.clone(),
            })?;
            if inner.torn_down {
                return Err(ControllerError::TornDown {
                    menu: self.menu.clone(),
                });
            }
            f(&mut inner)
        };
        self.router.replay(&self.inner);
        Ok(out)
    }

    /// Start every probe whose result is missing or stale under its refresh
    /// policy. Never blocks; results arrive through later drains.
    pub fn menu_about_to_show(&self) -> Result<Vec<ProbeId>, ControllerError> {
        self.with_state(|inner| {
            let default_policy = inner.policy;
            let stale: Vec<ProbeId> = inner
                .probes
                .iter()
                .filter(|(_, entry)| {
                    entry
                        .probe
                        .needs_refresh(entry.spec.policy.unwrap_or(default_policy))
                })
                .map(|(id, _)| id.clone())
                .collect();

            for id in &stale {
                inner.start_probe(id, &self.runner);
            }
            let changed = inner.refresh(|_| true);
            tracing::debug!(menu = %self.menu, started = stale.len(), changed, "menu about to show");
            stale
        })
    }

    /// Re-evaluate every binding against the current state.
    pub fn refresh_all(&self) -> Result<usize, ControllerError> {
        self.with_state(|inner| inner.refresh(|_| true))
    }

    /// Updates waiting for the controller to finish its current one.
    pub fn deferred_updates(&self) -> usize {
        self.router.pending()
    }

    /// Unsubscribe from the bus and cancel all probes. Safe to call again.
    pub fn teardown(&self) {
        let tokens: Vec<SubscriptionToken> = match self.subscriptions.try_borrow_mut() {
            Ok(mut subscriptions) => subscriptions.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for token in tokens {
            self.bus.unsubscribe(token);
        }

        match self.inner.try_borrow_mut() {
            Ok(mut inner) if !inner.torn_down => {
                for entry in inner.probes.values_mut() {
                    entry.probe.cancel();
                }
                inner.torn_down = true;
                self.router.backlog.borrow_mut().clear();
                tracing::debug!(menu = %self.menu, "menu controller torn down");
            }
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(menu = %self.menu, "teardown while controller busy; probes left running")
            }
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.try_borrow().map_or(false, |inner| inner.torn_down)
    }

    /// Last affordance written to `control`, if any.
    pub fn applied(&self, control: &str) -> Option<Affordance> {
        let inner = self.inner.try_borrow().ok()?;
        inner
            .controls
            .iter()
            .find(|c| c.binding().control().as_str() == control)
            .and_then(|c| c.applied().cloned())
    }

    pub fn snapshot(&self) -> BTreeMap<ControlId, Affordance> {
        let Ok(inner) = self.inner.try_borrow() else {
            return BTreeMap::new();
        };
        inner
            .controls
            .iter()
            .filter_map(|c| Some((c.binding().control().clone(), c.applied()?.clone())))
            .collect()
    }

    pub fn probe_result(&self, probe: &str) -> Option<ProbeResult<ProbeOutcome>> {
        let inner = self.inner.try_borrow().ok()?;
        Some(inner.results.get(probe).clone())
    }

    pub fn probe_state(&self, probe: &str) -> Option<ProbeState> {
        let inner = self.inner.try_borrow().ok()?;
        inner.probes.get(probe).map(|entry| entry.probe.state())
    }

    pub fn controls(&self) -> Vec<ControlId> {
        self.inner
            .try_borrow()
            .map(|inner| {
                inner
                    .controls
                    .iter()
                    .map(|c| c.binding().control().clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Drop for MenuStateController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
