//! Scripted sessions that drive the menu bar the way a user would.

use std::{
    collections::BTreeMap,
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use menu_core::{
    menus::{ids, AWS, GENOMES, GOOGLE, TRACKS},
    AuthProvider, CatalogChecker, DocumentProvider, EventBus, HttpCatalogChecker, MenuBar,
    MenuServices, Settings, TaskRunner,
};
use shared::{
    domain::{Affordance, AuthProviderId, ControlId, DocumentState, ResourceId},
    events::Event,
};
use tracing::{info, warn};

use crate::{
    actions,
    controls::logging_controls,
    simulated::{SimulatedAuth, SimulatedCatalog, SimulatedDocuments},
};

const FRAME: Duration = Duration::from_millis(16);
const TIMEOUT_SCENARIO_PROBE_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Load a genome, open every dynamic menu, log in to AWS.
    Demo,
    /// Open the Amazon menu against an identity provider that never answers.
    Timeout,
}

struct Ui {
    bus: Rc<EventBus>,
    runner: Rc<TaskRunner>,
    bar: MenuBar,
    documents: SimulatedDocuments,
    aws: Arc<dyn AuthProvider>,
}

impl Ui {
    /// Run the event loop for `window`, forwarding queued events and
    /// background completions.
    fn pump(&self, window: Duration) {
        let deadline = Instant::now() + window;
        loop {
            self.bus.dispatch_queued();
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.runner.drain_timeout((deadline - now).min(FRAME));
        }
    }

    /// Run the loop until no background work is left, or `limit` passes.
    fn settle(&self, limit: Duration) {
        if !self.runner.run_until_idle(limit) {
            warn!(
                pending = self.runner.pending_count(),
                "background work still running"
            );
        }
        self.bus.dispatch_queued();
    }

    fn open(&self, menu: &str) -> Result<()> {
        let started = self
            .bar
            .about_to_show(menu)
            .with_context(|| format!("failed to open menu {menu}"))?;
        info!(menu, probes = started.len(), "menu opened");
        Ok(())
    }

    fn report(&self, control: &str) {
        match self.bar.affordance(control) {
            Some(affordance) => info!(control, ?affordance, "control state"),
            None => warn!(control, "control has no state"),
        }
    }
}

pub fn run(scenario: Scenario, mut settings: Settings) -> Result<BTreeMap<ControlId, Affordance>> {
    // Both scripts sign in through Cognito.
    settings.cognito = true;
    let aws: Arc<dyn AuthProvider> = match scenario {
        Scenario::Demo => Arc::new(SimulatedAuth::new(
            AuthProviderId::AWS,
            "researcher@example.org",
            Duration::from_millis(120),
        )),
        Scenario::Timeout => {
            let timeout = settings.probe_timeout_ms;
            if timeout == 0 || timeout > TIMEOUT_SCENARIO_PROBE_MS {
                settings.probe_timeout_ms = TIMEOUT_SCENARIO_PROBE_MS;
            }
            Arc::new(SimulatedAuth::unresponsive(AuthProviderId::AWS))
        }
    };
    let google: Arc<dyn AuthProvider> = Arc::new(SimulatedAuth::new(
        AuthProviderId::GOOGLE,
        "researcher@gmail.com",
        Duration::from_millis(80),
    ));
    let catalog: Arc<dyn CatalogChecker> = match settings.catalog_url()? {
        Some(url) => {
            info!(%url, "checking the genome server over http");
            Arc::new(HttpCatalogChecker::new(url))
        }
        None => Arc::new(SimulatedCatalog::new(
            Duration::from_millis(150),
            &[ResourceId::GENOME_SERVER],
        )),
    };

    let runner = Rc::new(TaskRunner::new(settings.worker_threads)?);
    let bus = Rc::new(EventBus::new());
    let documents = SimulatedDocuments::new(Rc::clone(&bus));
    let services = MenuServices {
        aws_auth: Some(Arc::clone(&aws)),
        google_auth: Some(google),
        catalog: Some(catalog),
    };
    let bar = MenuBar::build(
        &settings,
        services,
        documents.current(),
        logging_controls(),
        &bus,
        &runner,
    )?;

    let ui = Ui {
        bus,
        runner,
        bar,
        documents,
        aws,
    };
    let limit = settings
        .probe_timeout()
        .map_or(Duration::from_secs(10), |t| t + Duration::from_secs(1));

    match scenario {
        Scenario::Demo => demo(&ui, limit)?,
        Scenario::Timeout => session_timeout(&ui, limit)?,
    }

    let snapshot = ui.bar.snapshot();
    ui.bar.teardown();
    Ok(snapshot)
}

fn demo(ui: &Ui, limit: Duration) -> Result<()> {
    ui.open(TRACKS)?;
    ui.report(ids::TRACKS_LOAD_HOSTED);

    ui.documents.load(Some(
        DocumentState::new("hg38")
            .with_hub(true)
            .with_hosted_tracks(true)
            .with_encode_support(true),
    ));
    ui.bus
        .publisher()
        .publish(Event::resource(ResourceId::SESSION_FILE, true));
    ui.pump(FRAME);
    ui.report(ids::TRACKS_LOAD_HOSTED);
    ui.report(ids::FILE_RELOAD_SESSION);

    ui.open(GENOMES)?;
    ui.settle(limit);
    ui.report(ids::GENOMES_LOAD_HOSTED_GENOME);

    ui.open(AWS)?;
    ui.report(ids::AWS_LOGIN);
    ui.settle(limit);
    ui.report(ids::AWS_LOGIN);

    actions::login(AuthProviderId::AWS, Arc::clone(&ui.aws), &ui.runner, &ui.bus);
    ui.settle(limit);
    ui.report(ids::AWS_LOGIN);
    ui.report(ids::AWS_LOAD_S3);

    ui.open(GOOGLE)?;
    ui.settle(limit);
    ui.report(ids::GOOGLE_LOGIN);

    actions::logout(AuthProviderId::AWS, Arc::clone(&ui.aws), &ui.runner, &ui.bus);
    ui.settle(limit);
    ui.report(ids::AWS_LOGIN);
    Ok(())
}

fn session_timeout(ui: &Ui, limit: Duration) -> Result<()> {
    ui.open(AWS)?;
    ui.report(ids::AWS_LOGIN);
    ui.settle(limit);
    ui.report(ids::AWS_LOGIN);
    ui.report(ids::AWS_LOGOUT);

    actions::login(AuthProviderId::AWS, Arc::clone(&ui.aws), &ui.runner, &ui.bus);
    ui.settle(limit);
    ui.report(ids::AWS_LOGIN);
    Ok(())
}
