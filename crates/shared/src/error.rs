use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Timeout,
    Transport,
    Auth,
    Cancelled,
    Unknown,
}

/// A background check that did not produce a value.
///
/// Probe failures are data, not control flow: bindings receive them and
/// degrade the affected controls.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{category:?}: {message}")]
pub struct ProbeFailure {
    pub category: FailureCategory,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Classify an arbitrary error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let category = if lower.contains("timed out") || lower.contains("timeout") {
            FailureCategory::Timeout
        } else if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("expired")
            || lower.contains("invalid token")
            || lower.contains("credential")
        {
            FailureCategory::Auth
        } else if lower.contains("connection")
            || lower.contains("connect")
            || lower.contains("network")
            || lower.contains("dns")
            || lower.contains("unreachable")
            || lower.contains("transport")
        {
            FailureCategory::Transport
        } else if lower.contains("cancelled") || lower.contains("canceled") {
            FailureCategory::Cancelled
        } else {
            FailureCategory::Unknown
        };

        Self { category, message }
    }

    /// Classify an error, keeping its full context chain in the message.
    pub fn from_error(err: &dyn std::fmt::Display) -> Self {
        Self::from_message(format!("{err:#}"))
    }

    pub fn is_timeout(&self) -> bool {
        self.category == FailureCategory::Timeout
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == FailureCategory::Auth
    }
}
