use serde::{Deserialize, Serialize};

use crate::domain::{AuthProviderId, DocumentState, ResourceId, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DocumentChanged,
    SessionStatusChanged,
    ResourceAvailabilityChanged,
}

/// A state change of interest to menu controllers.
///
/// Events are created by the owner of the changed state and handed to
/// subscribers by shared reference only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    DocumentChanged(Option<DocumentState>),
    SessionStatusChanged {
        provider: AuthProviderId,
        status: SessionStatus,
    },
    ResourceAvailabilityChanged {
        resource: ResourceId,
        available: bool,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DocumentChanged(_) => EventKind::DocumentChanged,
            Event::SessionStatusChanged { .. } => EventKind::SessionStatusChanged,
            Event::ResourceAvailabilityChanged { .. } => EventKind::ResourceAvailabilityChanged,
        }
    }

    pub fn document(document: DocumentState) -> Self {
        Event::DocumentChanged(Some(document))
    }

    pub fn resource(resource: impl Into<String>, available: bool) -> Self {
        Event::ResourceAvailabilityChanged {
            resource: ResourceId(resource.into()),
            available,
        }
    }

    pub fn session(provider: impl Into<String>, status: SessionStatus) -> Self {
        Event::SessionStatusChanged {
            provider: AuthProviderId(provider.into()),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            Event::document(DocumentState::new("hg38")).kind(),
            EventKind::DocumentChanged
        );
        assert_eq!(
            Event::session(AuthProviderId::AWS, SessionStatus::logged_out()).kind(),
            EventKind::SessionStatusChanged
        );
        assert_eq!(
            Event::resource(ResourceId::SESSION_FILE, true).kind(),
            EventKind::ResourceAvailabilityChanged
        );
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = Event::resource(ResourceId::GOOGLE_MENU, true);
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "resource_availability_changed");
        assert_eq!(json["payload"]["resource"], "google-menu");
        assert_eq!(json["payload"]["available"], true);
    }
}
