//! Menu actions that change session state.

use std::{rc::Rc, sync::Arc};

use menu_core::{AuthProvider, EventBus, TaskHandle, TaskRunner};
use shared::{domain::SessionStatus, events::Event};
use tracing::{info, warn};

pub fn login(
    provider: &'static str,
    auth: Arc<dyn AuthProvider>,
    runner: &TaskRunner,
    bus: &Rc<EventBus>,
) -> TaskHandle {
    let bus = Rc::clone(bus);
    runner.run(
        format!("{provider} login"),
        async move { auth.login().await },
        move |result| match result {
            Ok(status) => {
                info!(provider, principal = ?status.principal, "login finished");
                bus.publish(&Event::session(provider, status));
            }
            Err(err) => warn!(provider, error = %format!("{err:#}"), "login failed"),
        },
    )
}

pub fn logout(
    provider: &'static str,
    auth: Arc<dyn AuthProvider>,
    runner: &TaskRunner,
    bus: &Rc<EventBus>,
) -> TaskHandle {
    let bus = Rc::clone(bus);
    runner.run(
        format!("{provider} logout"),
        async move { auth.logout().await },
        move |result| match result {
            Ok(()) => {
                info!(provider, "logout finished");
                bus.publish(&Event::session(provider, SessionStatus::logged_out()));
            }
            Err(err) => warn!(provider, error = %format!("{err:#}"), "logout failed"),
        },
    )
}
