use shared::domain::{ControlId, ProbeId};
use thiserror::Error;

/// Misuse of the controller API.
///
/// These are defects in the caller, not runtime conditions: they are logged at
/// `error!` and returned so development builds fail loudly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("control {control} already has a binding in menu {menu}")]
    DuplicateBinding { menu: String, control: ControlId },
    #[error("binding for {control} depends on unregistered probe {probe}")]
    UnknownProbe { control: ControlId, probe: ProbeId },
    #[error("probe {probe} registered twice in menu {menu}")]
    DuplicateProbe { menu: String, probe: ProbeId },
    #[error("menu {menu} was already torn down")]
    TornDown { menu: String },
    #[error("menu {menu} is already updating its controls")]
    Busy { menu: String },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid catalog url: {0}")]
    CatalogUrl(#[from] url::ParseError),
}
