use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use shared::domain::ResourceId;
use url::Url;

use crate::{binding::KnownState, error::SettingsError, probe::RefreshPolicy};

pub const DEFAULT_SETTINGS_FILE: &str = "menubar.toml";
const ENV_PREFIX: &str = "APP__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicyName {
    Always,
    Once,
    MaxAge,
}

impl RefreshPolicyName {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "once" => Some(Self::Once),
            "max_age" | "max-age" => Some(Self::MaxAge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worker_threads: usize,
    pub probe_timeout_ms: u64,
    pub probe_stall_ms: u64,
    pub refresh_policy: RefreshPolicyName,
    pub refresh_max_age_ms: u64,
    pub catalog_base_url: Option<String>,
    pub google_menu: bool,
    pub database: bool,
    pub extras: bool,
    pub aws_provider: bool,
    pub cognito: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            probe_timeout_ms: 5_000,
            probe_stall_ms: 30_000,
            refresh_policy: RefreshPolicyName::Always,
            refresh_max_age_ms: 60_000,
            catalog_base_url: None,
            google_menu: false,
            database: false,
            extras: false,
            aws_provider: true,
            cognito: false,
        }
    }
}

impl Settings {
    /// Strict parse: unknown policy names and bad URLs are errors.
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.worker_threads == 0 {
            return Err(SettingsError::InvalidValue {
                key: "worker_threads",
                value: "0".into(),
            });
        }
        self.catalog_url()?;
        Ok(())
    }

    /// Overlay `APP__<FIELD>` variables. Unparseable values are logged and
    /// leave the current value in place.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("WORKER_THREADS") {
            match v.trim().parse::<usize>() {
                Ok(parsed) if parsed > 0 => self.worker_threads = parsed,
                _ => ignored("worker_threads", &v),
            }
        }
        if let Some(v) = var("PROBE_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(parsed) => self.probe_timeout_ms = parsed,
                Err(_) => ignored("probe_timeout_ms", &v),
            }
        }
        if let Some(v) = var("PROBE_STALL_MS") {
            match v.trim().parse::<u64>() {
                Ok(parsed) => self.probe_stall_ms = parsed,
                Err(_) => ignored("probe_stall_ms", &v),
            }
        }
        if let Some(v) = var("REFRESH_POLICY") {
            match RefreshPolicyName::parse(&v) {
                Some(parsed) => self.refresh_policy = parsed,
                None => ignored("refresh_policy", &v),
            }
        }
        if let Some(v) = var("REFRESH_MAX_AGE_MS") {
            match v.trim().parse::<u64>() {
                Ok(parsed) => self.refresh_max_age_ms = parsed,
                Err(_) => ignored("refresh_max_age_ms", &v),
            }
        }
        if let Some(v) = var("CATALOG_BASE_URL") {
            let v = v.trim();
            self.catalog_base_url = (!v.is_empty()).then(|| v.to_string());
        }

        for (name, flag) in [
            ("GOOGLE_MENU", &mut self.google_menu),
            ("DATABASE", &mut self.database),
            ("EXTRAS", &mut self.extras),
            ("AWS_PROVIDER", &mut self.aws_provider),
            ("COGNITO", &mut self.cognito),
        ] {
            if let Some(v) = var(name) {
                match parse_flag(&v) {
                    Some(parsed) => *flag = parsed,
                    None => ignored(name, &v),
                }
            }
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        match self.refresh_policy {
            RefreshPolicyName::Always => RefreshPolicy::Always,
            RefreshPolicyName::Once => RefreshPolicy::Once,
            RefreshPolicyName::MaxAge => {
                RefreshPolicy::MaxAge(Duration::from_millis(self.refresh_max_age_ms))
            }
        }
    }

    /// `None` when probes may run without a deadline.
    pub fn probe_timeout(&self) -> Option<Duration> {
        (self.probe_timeout_ms > 0).then(|| Duration::from_millis(self.probe_timeout_ms))
    }

    /// How long an untimed probe may run before the next menu open replaces it.
    pub fn probe_stall_limit(&self) -> Duration {
        Duration::from_millis(self.probe_stall_ms)
    }

    pub fn catalog_url(&self) -> Result<Option<Url>, SettingsError> {
        match self.catalog_base_url.as_deref() {
            None => Ok(None),
            Some(raw) => Ok(Some(Url::parse(raw)?)),
        }
    }

    /// Feature flags as resource availability, the state menus start from.
    pub fn initial_state(&self) -> KnownState {
        KnownState::default()
            .with_resource(ResourceId::GOOGLE_MENU, self.google_menu)
            .with_resource(ResourceId::DATABASE, self.database)
            .with_resource(ResourceId::EXTRAS, self.extras)
            .with_resource(ResourceId::AWS_PROVIDER, self.aws_provider)
            .with_resource(ResourceId::COGNITO, self.cognito)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn ignored(key: &str, value: &str) {
    tracing::warn!(key, value, "ignoring invalid settings override");
}

/// Defaults, then the settings file if it can be read, then the environment.
/// A broken file is logged and skipped.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path: PathBuf = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

    let mut settings = if path.exists() {
        match Settings::from_file(&path) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "settings file ignored");
                Settings::default()
            }
        }
    } else {
        Settings::default()
    };

    settings.apply_env_overrides(|name| std::env::var(name).ok());
    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
