use super::*;

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{domain::SessionStatus, events::Event};

const WAIT: Duration = Duration::from_secs(5);

struct NullControl;

impl Control for NullControl {
    fn set_enabled(&self, _enabled: bool) {}
    fn set_visible(&self, _visible: bool) {}
    fn set_label(&self, _label: &str) {}
}

struct ScriptedAuth {
    logged_in: AtomicBool,
    delay: Duration,
}

impl ScriptedAuth {
    fn new(logged_in: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            logged_in: AtomicBool::new(logged_in),
            delay,
        })
    }
}

#[async_trait]
impl AuthProvider for ScriptedAuth {
    async fn is_logged_in(&self) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(self.logged_in.load(Ordering::SeqCst))
    }

    async fn current_principal_name(&self) -> Result<Option<String>> {
        Ok(Some("ana@example.org".into()))
    }

    async fn login(&self) -> Result<SessionStatus> {
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(SessionStatus::logged_in_as("ana@example.org"))
    }

    async fn logout(&self) -> Result<()> {
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct DownCatalog;

#[async_trait]
impl CatalogChecker for DownCatalog {
    async fn is_available(&self, _resource: &ResourceId) -> Result<bool> {
        Err(anyhow!("connection refused"))
    }
}

struct Fixture {
    bus: Rc<EventBus>,
    runner: Rc<TaskRunner>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            bus: Rc::new(EventBus::new()),
            runner: Rc::new(TaskRunner::new(2).expect("runner")),
        }
    }

    fn menu_bar(
        &self,
        settings: &Settings,
        services: MenuServices,
        document: Option<DocumentState>,
    ) -> MenuBar {
        MenuBar::build(
            settings,
            services,
            document,
            |_id: &ControlId| -> Rc<dyn Control> { Rc::new(NullControl) },
            &self.bus,
            &self.runner,
        )
        .expect("menu bar")
    }
}

fn cognito_settings() -> Settings {
    Settings {
        cognito: true,
        ..Settings::default()
    }
}

#[test]
fn builds_one_controller_per_menu() {
    let fx = Fixture::new();
    let bar = fx.menu_bar(&Settings::default(), MenuServices::default(), None);

    let menus: Vec<&str> = bar.menus().collect();
    assert_eq!(menus, vec![FILE, GENOMES, TRACKS, AWS, GOOGLE, MENU_BAR]);
    assert_eq!(bar.snapshot().len(), 14);
}

#[test]
fn feature_flags_drive_top_level_menus() {
    let fx = Fixture::new();
    let settings = Settings {
        extras: true,
        aws_provider: false,
        ..Settings::default()
    };
    let bar = fx.menu_bar(&settings, MenuServices::default(), None);

    assert_eq!(bar.affordance(ids::EXTRAS_MENU), Some(Affordance::visible_if(true)));
    assert_eq!(bar.affordance(ids::AWS_MENU), Some(Affordance::visible_if(false)));
    assert_eq!(bar.affordance(ids::GOOGLE_MENU), Some(Affordance::visible_if(false)));

    fx.bus.publish(&Event::resource(ResourceId::GOOGLE_MENU, true));
    assert_eq!(bar.affordance(ids::GOOGLE_MENU), Some(Affordance::visible_if(true)));
}

#[test]
fn document_changes_update_genome_and_track_items() {
    let fx = Fixture::new();
    let bar = fx.menu_bar(&Settings::default(), MenuServices::default(), None);
    assert_eq!(
        bar.affordance(ids::TRACKS_LOAD_HOSTED),
        Some(Affordance::visible_if(false))
    );
    assert_eq!(
        bar.affordance(ids::GENOMES_SELECT_ANNOTATIONS),
        Some(Affordance::shown(false))
    );

    fx.bus.publish(&Event::document(
        DocumentState::new("hg38")
            .with_hub(true)
            .with_hosted_tracks(true)
            .with_encode_support(true),
    ));

    assert_eq!(
        bar.affordance(ids::TRACKS_LOAD_HOSTED),
        Some(Affordance::visible_if(true))
    );
    assert_eq!(
        bar.affordance(ids::TRACKS_LOAD_ENCODE),
        Some(Affordance::visible_if(true))
    );
    assert_eq!(
        bar.affordance(ids::GENOMES_SELECT_ANNOTATIONS),
        Some(Affordance::shown(true))
    );
}

#[test]
fn reload_session_follows_session_file() {
    let fx = Fixture::new();
    let bar = fx.menu_bar(&Settings::default(), MenuServices::default(), None);
    assert_eq!(
        bar.affordance(ids::FILE_RELOAD_SESSION),
        Some(Affordance::shown(false))
    );

    fx.bus
        .publish(&Event::resource(ResourceId::SESSION_FILE, true));
    assert_eq!(
        bar.affordance(ids::FILE_RELOAD_SESSION),
        Some(Affordance::shown(true))
    );
}

#[test]
fn aws_login_shows_principal_after_probe() {
    let fx = Fixture::new();
    let services = MenuServices {
        aws_auth: Some(ScriptedAuth::new(true, Duration::from_millis(10))),
        ..MenuServices::default()
    };
    let bar = fx.menu_bar(&cognito_settings(), services, None);

    let started = bar.about_to_show(AWS).expect("open aws");
    assert_eq!(started, vec![ProbeId::new(probe_ids::AWS_SESSION)]);
    assert_eq!(
        bar.affordance(ids::AWS_LOGIN),
        Some(Affordance::shown(false).with_label(LOGIN_LABEL))
    );

    assert!(fx.runner.run_until_idle(WAIT));
    assert_eq!(
        bar.affordance(ids::AWS_LOGIN),
        Some(Affordance::shown(false).with_label("ana@example.org"))
    );
    assert_eq!(bar.affordance(ids::AWS_LOGOUT), Some(Affordance::shown(true)));
    assert_eq!(bar.affordance(ids::AWS_LOAD_S3), Some(Affordance::shown(true)));
}

#[test]
fn aws_without_cognito_hides_login() {
    let fx = Fixture::new();
    let services = MenuServices {
        aws_auth: Some(ScriptedAuth::new(false, Duration::ZERO)),
        ..MenuServices::default()
    };
    let bar = fx.menu_bar(&Settings::default(), services, None);

    assert!(bar.about_to_show(AWS).expect("open aws").is_empty());
    assert_eq!(bar.affordance(ids::AWS_LOGIN), Some(Affordance::hidden()));
    assert_eq!(bar.affordance(ids::AWS_LOAD_S3), Some(Affordance::shown(true)));
}

#[test]
fn logged_out_session_offers_login() {
    let fx = Fixture::new();
    let services = MenuServices {
        google_auth: Some(ScriptedAuth::new(false, Duration::ZERO)),
        ..MenuServices::default()
    };
    let bar = fx.menu_bar(&Settings::default(), services, None);

    bar.about_to_show(GOOGLE).expect("open google");
    assert!(fx.runner.run_until_idle(WAIT));
    assert_eq!(
        bar.affordance(ids::GOOGLE_LOGIN),
        Some(Affordance::shown(true).with_label(LOGIN_LABEL))
    );
    assert_eq!(bar.affordance(ids::GOOGLE_LOGOUT), Some(Affordance::shown(false)));
}

#[test]
fn session_change_restarts_session_probes() {
    let fx = Fixture::new();
    let auth = ScriptedAuth::new(false, Duration::ZERO);
    let services = MenuServices {
        google_auth: Some(auth.clone()),
        ..MenuServices::default()
    };
    let bar = fx.menu_bar(&Settings::default(), services, None);
    bar.about_to_show(GOOGLE).expect("open google");
    assert!(fx.runner.run_until_idle(WAIT));

    auth.logged_in.store(true, Ordering::SeqCst);
    fx.bus.publish(&Event::session(
        shared::domain::AuthProviderId::GOOGLE,
        SessionStatus::logged_in_as("ana@example.org"),
    ));
    assert!(fx.runner.run_until_idle(WAIT));

    assert_eq!(
        bar.affordance(ids::GOOGLE_LOGIN),
        Some(Affordance::shown(false).with_label("ana@example.org"))
    );
}

#[test]
fn unreachable_genome_server_disables_item_with_tooltip() {
    let fx = Fixture::new();
    let services = MenuServices {
        catalog: Some(Arc::new(DownCatalog)),
        ..MenuServices::default()
    };
    let bar = fx.menu_bar(&Settings::default(), services, None);
    assert_eq!(
        bar.affordance(ids::GENOMES_LOAD_HOSTED_GENOME),
        Some(Affordance::shown(true).with_tooltip(GENOME_SERVER_TOOLTIP))
    );

    bar.about_to_show(GENOMES).expect("open genomes");
    assert!(fx.runner.run_until_idle(WAIT));
    assert_eq!(
        bar.affordance(ids::GENOMES_LOAD_HOSTED_GENOME),
        Some(Affordance::shown(false).with_tooltip(GENOME_SERVER_UNREACHABLE_TOOLTIP))
    );
}

#[test]
fn unknown_menu_is_ignored_and_teardown_is_shared() {
    let fx = Fixture::new();
    let bar = fx.menu_bar(&Settings::default(), MenuServices::default(), None);
    assert!(bar.about_to_show("help").expect("unknown menu").is_empty());

    bar.teardown();
    assert_eq!(fx.bus.subscriber_count(EventKind::DocumentChanged), 0);
    assert_eq!(
        bar.about_to_show(TRACKS),
        Err(ControllerError::TornDown {
            menu: TRACKS.into()
        })
    );
}
