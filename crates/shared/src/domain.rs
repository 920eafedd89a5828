use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(DocumentId);
id_newtype!(ControlId);
id_newtype!(ResourceId);
id_newtype!(AuthProviderId);
id_newtype!(ProbeId);

impl ResourceId {
    pub const SESSION_FILE: &'static str = "session-file";
    pub const GENOME_SERVER: &'static str = "genome-server";
    pub const AWS_PROVIDER: &'static str = "aws-provider";
    pub const COGNITO: &'static str = "cognito";
    pub const GOOGLE_MENU: &'static str = "google-menu";
    pub const DATABASE: &'static str = "database";
    pub const EXTRAS: &'static str = "extras";
}

impl AuthProviderId {
    pub const AWS: &'static str = "aws";
    pub const GOOGLE: &'static str = "google";
}

/// Snapshot of the active genome, as reported by the document provider.
///
/// The provider resolves catalog membership when the genome is loaded, so the
/// flags here are already-known synchronous facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    pub id: DocumentId,
    pub display_name: String,
    #[serde(default)]
    pub has_hub: bool,
    #[serde(default)]
    pub has_hosted_tracks: bool,
    #[serde(default)]
    pub encode_supported: bool,
}

impl DocumentState {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id: DocumentId(id),
            has_hub: false,
            has_hosted_tracks: false,
            encode_supported: false,
        }
    }

    pub fn with_hub(mut self, has_hub: bool) -> Self {
        self.has_hub = has_hub;
        self
    }

    pub fn with_hosted_tracks(mut self, has_hosted_tracks: bool) -> Self {
        self.has_hosted_tracks = has_hosted_tracks;
        self
    }

    pub fn with_encode_support(mut self, encode_supported: bool) -> Self {
        self.encode_supported = encode_supported;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub logged_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

impl SessionStatus {
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn logged_in_as(principal: impl Into<String>) -> Self {
        Self {
            logged_in: true,
            principal: Some(principal.into()),
        }
    }
}

/// Desired visible state of one control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    pub enabled: bool,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

impl Affordance {
    pub fn shown(enabled: bool) -> Self {
        Self {
            enabled,
            visible: true,
            label: None,
            tooltip: None,
        }
    }

    pub fn visible_if(visible: bool) -> Self {
        Self {
            enabled: true,
            visible,
            label: None,
            tooltip: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            enabled: false,
            visible: false,
            label: None,
            tooltip: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }
}

impl Default for Affordance {
    fn default() -> Self {
        Self::shown(true)
    }
}
