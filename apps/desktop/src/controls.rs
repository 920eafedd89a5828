use std::rc::Rc;

use menu_core::Control;
use shared::domain::ControlId;
use tracing::info;

/// Stand-in for a toolkit widget: every write is logged.
pub struct LoggingControl {
    id: ControlId,
}

impl Control for LoggingControl {
    fn set_enabled(&self, enabled: bool) {
        info!(control = %self.id, enabled, "control updated");
    }

    fn set_visible(&self, visible: bool) {
        info!(control = %self.id, visible, "control updated");
    }

    fn set_label(&self, label: &str) {
        info!(control = %self.id, label, "control updated");
    }

    fn set_tooltip(&self, tooltip: &str) {
        info!(control = %self.id, tooltip, "control updated");
    }
}

pub fn logging_controls() -> impl FnMut(&ControlId) -> Rc<dyn Control> {
    |id: &ControlId| -> Rc<dyn Control> { Rc::new(LoggingControl { id: id.clone() }) }
}
