//! Keeps menu items of the genome browser in step with application state.
//!
//! Everything here is owned by the UI thread. Remote checks run on the
//! [`TaskRunner`]'s workers and come back through [`TaskRunner::drain`].

pub mod binding;
pub mod config;
pub mod controller;
pub mod error;
pub mod event_bus;
pub mod menus;
pub mod probe;
pub mod providers;
pub mod task_runner;

pub use binding::{AffordanceBinding, Control, KnownState, ProbeOutcome, ProbeResults};
pub use config::{load_settings, Settings};
pub use controller::{MenuProbe, MenuStateController, ProbeSpec};
pub use error::{ControllerError, SettingsError};
pub use event_bus::{EventBus, EventPublisher, PublishReport, SubscriberFault, SubscriptionToken};
pub use menus::{MenuBar, MenuServices};
pub use probe::{AsyncProbe, ProbeResult, ProbeState, ProbeVersion, RefreshPolicy};
pub use providers::{AuthProvider, CatalogChecker, DocumentProvider, HttpCatalogChecker};
pub use task_runner::{TaskHandle, TaskRunner};
