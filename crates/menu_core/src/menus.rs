//! The genome browser's dynamic menus, declared as bindings.

use std::{collections::BTreeMap, rc::Rc, sync::Arc};

use shared::{
    domain::{Affordance, ControlId, DocumentState, ProbeId, ResourceId},
    events::EventKind,
};

use crate::{
    binding::{AffordanceBinding, Control, KnownState, ProbeResults},
    config::Settings,
    controller::{MenuProbe, MenuStateController, MenuStateControllerBuilder, ProbeSpec},
    error::ControllerError,
    event_bus::EventBus,
    probe::ProbeResult,
    providers::{availability_probe, session_probe, AuthProvider, CatalogChecker},
    task_runner::TaskRunner,
};

pub mod ids {
    pub const FILE_RELOAD_SESSION: &str = "file.reload_session";
    pub const GENOMES_SELECT_ANNOTATIONS: &str = "genomes.select_annotations";
    pub const GENOMES_LOAD_HOSTED_GENOME: &str = "genomes.load_hosted_genome";
    pub const TRACKS_LOAD_HOSTED: &str = "tracks.load_hosted";
    pub const TRACKS_LOAD_ENCODE: &str = "tracks.load_encode";
    pub const TRACKS_LOAD_DATABASE: &str = "tracks.load_database";
    pub const AWS_MENU: &str = "aws.menu";
    pub const AWS_LOGIN: &str = "aws.login";
    pub const AWS_LOGOUT: &str = "aws.logout";
    pub const AWS_LOAD_S3: &str = "aws.load_s3";
    pub const GOOGLE_MENU: &str = "google.menu";
    pub const GOOGLE_LOGIN: &str = "google.login";
    pub const GOOGLE_LOGOUT: &str = "google.logout";
    pub const EXTRAS_MENU: &str = "extras.menu";
}

pub mod probe_ids {
    pub const AWS_SESSION: &str = "aws-session";
    pub const GOOGLE_SESSION: &str = "google-session";
    pub const GENOME_SERVER: &str = "genome-server";
}

pub const FILE: &str = "file";
pub const GENOMES: &str = "genomes";
pub const TRACKS: &str = "tracks";
pub const AWS: &str = "aws";
pub const GOOGLE: &str = "google";
pub const MENU_BAR: &str = "menubar";

pub const LOGIN_LABEL: &str = "Login ...";
pub const GENOME_SERVER_TOOLTIP: &str = "Select genomes available on the server";
pub const GENOME_SERVER_UNREACHABLE_TOOLTIP: &str =
    "Could not reach the genome server. Check the network connection.";

/// Remote collaborators; menus whose collaborator is missing fall back to
/// their synchronous rules.
#[derive(Clone, Default)]
pub struct MenuServices {
    pub aws_auth: Option<Arc<dyn AuthProvider>>,
    pub google_auth: Option<Arc<dyn AuthProvider>>,
    pub catalog: Option<Arc<dyn CatalogChecker>>,
}

fn document(known: &KnownState) -> Option<&DocumentState> {
    known.document.as_ref()
}

fn file_menu(
    builder: MenuStateControllerBuilder,
    controls: &mut ControlSource<'_>,
) -> MenuStateControllerBuilder {
    builder.bind(
        controls.get(ids::FILE_RELOAD_SESSION),
        AffordanceBinding::new(ids::FILE_RELOAD_SESSION, |known, _| {
            Affordance::shown(known.is_available(ResourceId::SESSION_FILE))
        })
        .on(EventKind::ResourceAvailabilityChanged),
    )
}

fn genome_server_reachable(known: &KnownState, results: &ProbeResults, probed: bool) -> bool {
    if probed {
        match results.get(probe_ids::GENOME_SERVER) {
            ProbeResult::Success(outcome) => return outcome.as_available().unwrap_or(false),
            ProbeResult::Failure(_) => return false,
            ProbeResult::Pending => {}
        }
    }
    known
        .availability(ResourceId::GENOME_SERVER)
        .unwrap_or(true)
}

fn genomes_menu(
    builder: MenuStateControllerBuilder,
    controls: &mut ControlSource<'_>,
    genome_server: Option<MenuProbe>,
) -> MenuStateControllerBuilder {
    let probed = genome_server.is_some();
    let mut load_hosted =
        AffordanceBinding::new(ids::GENOMES_LOAD_HOSTED_GENOME, move |known, results| {
            if genome_server_reachable(known, results, probed) {
                Affordance::shown(true).with_tooltip(GENOME_SERVER_TOOLTIP)
            } else {
                Affordance::shown(false).with_tooltip(GENOME_SERVER_UNREACHABLE_TOOLTIP)
            }
        })
        .on(EventKind::ResourceAvailabilityChanged);

    let mut builder = builder.bind(
        controls.get(ids::GENOMES_SELECT_ANNOTATIONS),
        AffordanceBinding::new(ids::GENOMES_SELECT_ANNOTATIONS, |known, _| {
            Affordance::shown(document(known).is_some_and(|d| d.has_hub))
        })
        .on(EventKind::DocumentChanged),
    );
    if let Some(probe) = genome_server {
        load_hosted = load_hosted.on_probe(probe_ids::GENOME_SERVER);
        builder = builder.probe(probe, ProbeSpec::new());
    }
    builder.bind(controls.get(ids::GENOMES_LOAD_HOSTED_GENOME), load_hosted)
}

fn tracks_menu(
    builder: MenuStateControllerBuilder,
    controls: &mut ControlSource<'_>,
) -> MenuStateControllerBuilder {
    builder
        .bind(
            controls.get(ids::TRACKS_LOAD_HOSTED),
            AffordanceBinding::new(ids::TRACKS_LOAD_HOSTED, |known, _| {
                Affordance::visible_if(document(known).is_some_and(|d| d.has_hosted_tracks))
            })
            .on(EventKind::DocumentChanged),
        )
        .bind(
            controls.get(ids::TRACKS_LOAD_ENCODE),
            AffordanceBinding::new(ids::TRACKS_LOAD_ENCODE, |known, _| {
                Affordance::visible_if(document(known).is_some_and(|d| d.encode_supported))
            })
            .on(EventKind::DocumentChanged),
        )
        .bind(
            controls.get(ids::TRACKS_LOAD_DATABASE),
            AffordanceBinding::new(ids::TRACKS_LOAD_DATABASE, |known, _| {
                Affordance::visible_if(known.is_available(ResourceId::DATABASE))
            })
            .on(EventKind::ResourceAvailabilityChanged),
        )
}

/// Login item: principal name once logged in, a disabled `Login ...` while
/// the session is unknown or the check failed.
fn login_affordance(results: &ProbeResults, probe: &str) -> Affordance {
    match results.session(probe) {
        Some(status) if status.logged_in => {
            let label = status.principal.as_deref().unwrap_or(LOGIN_LABEL);
            Affordance::shown(false).with_label(label)
        }
        Some(_) => Affordance::shown(true).with_label(LOGIN_LABEL),
        None => Affordance::shown(false).with_label(LOGIN_LABEL),
    }
}

fn logged_in(results: &ProbeResults, probe: &str) -> bool {
    results.session(probe).is_some_and(|s| s.logged_in)
}

fn session_spec() -> ProbeSpec {
    ProbeSpec::new().restart_on(EventKind::SessionStatusChanged)
}

fn aws_menu(
    builder: MenuStateControllerBuilder,
    controls: &mut ControlSource<'_>,
    session: Option<MenuProbe>,
) -> MenuStateControllerBuilder {
    let Some(session) = session else {
        // Without Cognito, S3 access uses ambient credentials.
        return builder
            .bind(
                controls.get(ids::AWS_LOGIN),
                AffordanceBinding::new(ids::AWS_LOGIN, |_, _| Affordance::hidden()),
            )
            .bind(
                controls.get(ids::AWS_LOGOUT),
                AffordanceBinding::new(ids::AWS_LOGOUT, |_, _| Affordance::hidden()),
            )
            .bind(
                controls.get(ids::AWS_LOAD_S3),
                AffordanceBinding::new(ids::AWS_LOAD_S3, |_, _| Affordance::shown(true)),
            );
    };

    builder
        .probe(session, session_spec())
        .bind(
            controls.get(ids::AWS_LOGIN),
            AffordanceBinding::new(ids::AWS_LOGIN, |_, results| {
                login_affordance(results, probe_ids::AWS_SESSION)
            })
            .on_probe(probe_ids::AWS_SESSION),
        )
        .bind(
            controls.get(ids::AWS_LOGOUT),
            AffordanceBinding::new(ids::AWS_LOGOUT, |_, results| {
                Affordance::shown(logged_in(results, probe_ids::AWS_SESSION))
            })
            .on_probe(probe_ids::AWS_SESSION),
        )
        .bind(
            controls.get(ids::AWS_LOAD_S3),
            AffordanceBinding::new(ids::AWS_LOAD_S3, |_, results| {
                Affordance::shown(logged_in(results, probe_ids::AWS_SESSION))
            })
            .on_probe(probe_ids::AWS_SESSION),
        )
}

fn google_menu(
    builder: MenuStateControllerBuilder,
    controls: &mut ControlSource<'_>,
    session: Option<MenuProbe>,
) -> MenuStateControllerBuilder {
    let Some(session) = session else {
        return builder
            .bind(
                controls.get(ids::GOOGLE_LOGIN),
                AffordanceBinding::new(ids::GOOGLE_LOGIN, |_, _| {
                    Affordance::shown(false).with_label(LOGIN_LABEL)
                }),
            )
            .bind(
                controls.get(ids::GOOGLE_LOGOUT),
                AffordanceBinding::new(ids::GOOGLE_LOGOUT, |_, _| Affordance::shown(false)),
            );
    };

    builder
        .probe(session, session_spec())
        .bind(
            controls.get(ids::GOOGLE_LOGIN),
            AffordanceBinding::new(ids::GOOGLE_LOGIN, |_, results| {
                login_affordance(results, probe_ids::GOOGLE_SESSION)
            })
            .on_probe(probe_ids::GOOGLE_SESSION),
        )
        .bind(
            controls.get(ids::GOOGLE_LOGOUT),
            AffordanceBinding::new(ids::GOOGLE_LOGOUT, |_, results| {
                Affordance::shown(logged_in(results, probe_ids::GOOGLE_SESSION))
            })
            .on_probe(probe_ids::GOOGLE_SESSION),
        )
}

fn menu_bar(
    builder: MenuStateControllerBuilder,
    controls: &mut ControlSource<'_>,
) -> MenuStateControllerBuilder {
    let flag = |control: &'static str, resource: &'static str| {
        AffordanceBinding::new(control, move |known, _| {
            Affordance::visible_if(known.is_available(resource))
        })
        .on(EventKind::ResourceAvailabilityChanged)
    };
    builder
        .bind(
            controls.get(ids::AWS_MENU),
            flag(ids::AWS_MENU, ResourceId::AWS_PROVIDER),
        )
        .bind(
            controls.get(ids::GOOGLE_MENU),
            flag(ids::GOOGLE_MENU, ResourceId::GOOGLE_MENU),
        )
        .bind(
            controls.get(ids::EXTRAS_MENU),
            flag(ids::EXTRAS_MENU, ResourceId::EXTRAS),
        )
}

struct ControlSource<'a> {
    make: &'a mut dyn FnMut(&ControlId) -> Rc<dyn Control>,
}

impl ControlSource<'_> {
    fn get(&mut self, id: &str) -> Rc<dyn Control> {
        (self.make)(&ControlId::new(id))
    }
}

/// Every dynamic menu of the main window, one controller per menu.
pub struct MenuBar {
    controllers: Vec<MenuStateController>,
}

impl MenuBar {
    /// `controls` is asked once for the widget behind each control id.
    pub fn build<F>(
        settings: &Settings,
        services: MenuServices,
        document: Option<DocumentState>,
        mut controls: F,
        bus: &Rc<EventBus>,
        runner: &Rc<TaskRunner>,
    ) -> Result<Self, ControllerError>
    where
        F: FnMut(&ControlId) -> Rc<dyn Control>,
    {
        let known = settings.initial_state().with_document(document);
        let policy = settings.refresh_policy();
        let timeout = settings.probe_timeout();
        let stall_limit = settings.probe_stall_limit();
        let with_timeout = |probe: MenuProbe| match timeout {
            Some(limit) => probe.with_timeout(limit),
            None => probe.with_stall_limit(stall_limit),
        };

        let genome_server = services.catalog.clone().map(|checker| {
            with_timeout(availability_probe(
                probe_ids::GENOME_SERVER,
                checker,
                ResourceId::GENOME_SERVER,
            ))
        });
        let aws_session = services
            .aws_auth
            .clone()
            .filter(|_| settings.cognito)
            .map(|auth| with_timeout(session_probe(probe_ids::AWS_SESSION, auth)));
        let google_session = services
            .google_auth
            .clone()
            .map(|auth| with_timeout(session_probe(probe_ids::GOOGLE_SESSION, auth)));

        let mut source = ControlSource {
            make: &mut controls,
        };
        let start = |menu: &str| {
            MenuStateController::builder(menu)
                .known_state(known.clone())
                .refresh_policy(policy)
        };

        let builders = vec![
            file_menu(start(FILE), &mut source),
            genomes_menu(start(GENOMES), &mut source, genome_server),
            tracks_menu(start(TRACKS), &mut source),
            aws_menu(start(AWS), &mut source, aws_session),
            google_menu(start(GOOGLE), &mut source, google_session),
            menu_bar(start(MENU_BAR), &mut source),
        ];

        let controllers = builders
            .into_iter()
            .map(|builder| builder.build(bus, runner))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(menus = controllers.len(), "menu bar ready");
        Ok(Self { controllers })
    }

    pub fn controller(&self, menu: &str) -> Option<&MenuStateController> {
        self.controllers.iter().find(|c| c.menu() == menu)
    }

    pub fn menus(&self) -> impl Iterator<Item = &str> {
        self.controllers.iter().map(MenuStateController::menu)
    }

    /// Forward a menu-selected notification to the owning controller.
    pub fn about_to_show(&self, menu: &str) -> Result<Vec<ProbeId>, ControllerError> {
        match self.controller(menu) {
            Some(controller) => controller.menu_about_to_show(),
            None => {
                tracing::warn!(menu, "no controller for menu");
                Ok(Vec::new())
            }
        }
    }

    pub fn affordance(&self, control: &str) -> Option<Affordance> {
        self.controllers.iter().find_map(|c| c.applied(control))
    }

    pub fn snapshot(&self) -> BTreeMap<ControlId, Affordance> {
        self.controllers
            .iter()
            .flat_map(|c| c.snapshot())
            .collect()
    }

    pub fn teardown(&self) {
        for controller in &self.controllers {
            controller.teardown();
        }
    }
}

#[cfg(test)]
#[path = "tests/menus_tests.rs"]
mod tests;
