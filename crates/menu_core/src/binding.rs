//! Declarative rules mapping known state and probe results to one control.

use std::collections::BTreeMap;

use shared::{
    domain::{Affordance, ControlId, DocumentState, ProbeId, ResourceId, SessionStatus},
    events::{Event, EventKind},
};

use crate::probe::ProbeResult;

/// Value produced by the probes a menu controller owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Session(SessionStatus),
    Available(bool),
}

impl ProbeOutcome {
    pub fn as_session(&self) -> Option<&SessionStatus> {
        match self {
            ProbeOutcome::Session(status) => Some(status),
            ProbeOutcome::Available(_) => None,
        }
    }

    pub fn as_available(&self) -> Option<bool> {
        match self {
            ProbeOutcome::Available(available) => Some(*available),
            ProbeOutcome::Session(_) => None,
        }
    }
}

/// Synchronously known state, updated from bus events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownState {
    pub document: Option<DocumentState>,
    pub resources: BTreeMap<ResourceId, bool>,
}

impl KnownState {
    pub fn with_document(mut self, document: Option<DocumentState>) -> Self {
        self.document = document;
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>, available: bool) -> Self {
        self.resources.insert(ResourceId(resource.into()), available);
        self
    }

    /// Fold an event into the known state. Returns `true` if anything changed.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::DocumentChanged(document) => {
                if &self.document == document {
                    return false;
                }
                self.document = document.clone();
                true
            }
            Event::ResourceAvailabilityChanged {
                resource,
                available,
            } => self.resources.insert(resource.clone(), *available) != Some(*available),
            Event::SessionStatusChanged { .. } => false,
        }
    }

    pub fn is_available(&self, resource: &str) -> bool {
        self.resources.get(resource).copied().unwrap_or(false)
    }

    pub fn availability(&self, resource: &str) -> Option<bool> {
        self.resources.get(resource).copied()
    }
}

static PENDING: ProbeResult<ProbeOutcome> = ProbeResult::Pending;

/// Latest non-stale result of every probe a controller owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResults {
    results: BTreeMap<ProbeId, ProbeResult<ProbeOutcome>>,
}

impl ProbeResults {
    pub fn set(&mut self, probe: ProbeId, result: ProbeResult<ProbeOutcome>) {
        self.results.insert(probe, result);
    }

    /// Probes that never ran read as `Pending`.
    pub fn get(&self, probe: &str) -> &ProbeResult<ProbeOutcome> {
        self.results.get(probe).unwrap_or(&PENDING)
    }

    pub fn session(&self, probe: &str) -> Option<&SessionStatus> {
        self.get(probe).success().and_then(ProbeOutcome::as_session)
    }

    pub fn availability(&self, probe: &str) -> Option<bool> {
        self.get(probe).success().and_then(ProbeOutcome::as_available)
    }
}

type DeriveFn = Box<dyn Fn(&KnownState, &ProbeResults) -> Affordance>;

pub struct AffordanceBinding {
    control: ControlId,
    events: Vec<EventKind>,
    probes: Vec<ProbeId>,
    derive: DeriveFn,
}

impl AffordanceBinding {
    pub fn new<F>(control: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&KnownState, &ProbeResults) -> Affordance + 'static,
    {
        Self {
            control: ControlId(control.into()),
            events: Vec::new(),
            probes: Vec::new(),
            derive: Box::new(derive),
        }
    }

    /// Re-evaluate whenever an event of `kind` arrives.
    pub fn on(mut self, kind: EventKind) -> Self {
        if !self.events.contains(&kind) {
            self.events.push(kind);
        }
        self
    }

    /// Re-evaluate whenever `probe` starts or resolves.
    pub fn on_probe(mut self, probe: impl Into<String>) -> Self {
        let probe = ProbeId(probe.into());
        if !self.probes.contains(&probe) {
            self.probes.push(probe);
        }
        self
    }

    pub fn control(&self) -> &ControlId {
        &self.control
    }

    pub fn events(&self) -> &[EventKind] {
        &self.events
    }

    pub fn probes(&self) -> &[ProbeId] {
        &self.probes
    }

    pub fn depends_on_event(&self, kind: EventKind) -> bool {
        self.events.contains(&kind)
    }

    pub fn depends_on_probe(&self, probe: &ProbeId) -> bool {
        self.probes.contains(probe)
    }

    pub fn evaluate(&self, known: &KnownState, probes: &ProbeResults) -> Affordance {
        (self.derive)(known, probes)
    }
}

impl std::fmt::Debug for AffordanceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffordanceBinding")
            .field("control", &self.control)
            .field("events", &self.events)
            .field("probes", &self.probes)
            .finish_non_exhaustive()
    }
}

/// Handle to a widget owned by the toolkit.
pub trait Control {
    fn set_enabled(&self, enabled: bool);
    fn set_visible(&self, visible: bool);
    fn set_label(&self, label: &str);
    fn set_tooltip(&self, _tooltip: &str) {}
}

/// A control together with its rule and the last affordance written to it.
pub(crate) struct BoundControl {
    control: std::rc::Rc<dyn Control>,
    binding: AffordanceBinding,
    applied: Option<Affordance>,
}

impl BoundControl {
    pub(crate) fn new(control: std::rc::Rc<dyn Control>, binding: AffordanceBinding) -> Self {
        Self {
            control,
            binding,
            applied: None,
        }
    }

    pub(crate) fn binding(&self) -> &AffordanceBinding {
        &self.binding
    }

    pub(crate) fn applied(&self) -> Option<&Affordance> {
        self.applied.as_ref()
    }

    /// Write only the fields that differ from what was last applied.
    /// Returns `false` when nothing changed.
    pub(crate) fn apply(&mut self, next: Affordance) -> bool {
        let previous = self.applied.as_ref();
        if previous == Some(&next) {
            return false;
        }
        if previous.map(|p| p.enabled) != Some(next.enabled) {
            self.control.set_enabled(next.enabled);
        }
        if previous.map(|p| p.visible) != Some(next.visible) {
            self.control.set_visible(next.visible);
        }
        if let Some(label) = &next.label {
            if previous.and_then(|p| p.label.as_ref()) != Some(label) {
                self.control.set_label(label);
            }
        }
        if let Some(tooltip) = &next.tooltip {
            if previous.and_then(|p| p.tooltip.as_ref()) != Some(tooltip) {
                self.control.set_tooltip(tooltip);
            }
        }
        tracing::trace!(control = %self.binding.control(), ?next, "affordance applied");
        self.applied = Some(next);
        true
    }
}
