//! Collaborators the menus consult, and the probes built on top of them.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::domain::{DocumentState, ResourceId, SessionStatus};
use url::Url;

use crate::{binding::ProbeOutcome, controller::MenuProbe, probe::AsyncProbe};

/// Source of the active genome. Changes are announced on the event bus.
pub trait DocumentProvider {
    fn current(&self) -> Option<DocumentState>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn is_logged_in(&self) -> anyhow::Result<bool>;
    async fn current_principal_name(&self) -> anyhow::Result<Option<String>>;
    async fn login(&self) -> anyhow::Result<SessionStatus>;
    async fn logout(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CatalogChecker: Send + Sync {
    async fn is_available(&self, resource: &ResourceId) -> anyhow::Result<bool>;
}

/// Checks resources against `GET {base_url}/{resource}`.
#[derive(Debug, Clone)]
pub struct HttpCatalogChecker {
    http: Client,
    base_url: Url,
}

impl HttpCatalogChecker {
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resource_url(&self, resource: &ResourceId) -> anyhow::Result<Url> {
        self.base_url
            .join(resource.as_str())
            .with_context(|| format!("invalid resource name {resource}"))
    }
}

#[async_trait]
impl CatalogChecker for HttpCatalogChecker {
    async fn is_available(&self, resource: &ResourceId) -> anyhow::Result<bool> {
        let url = self.resource_url(resource)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("catalog request to {url} failed"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::info!(%resource, "catalog: resource not found");
            return Ok(false);
        }
        response
            .error_for_status()
            .with_context(|| format!("catalog check for {resource} failed"))?;
        tracing::debug!(%resource, %status, "catalog: resource available");
        Ok(true)
    }
}

/// Probe reporting whether `auth` has a logged-in principal.
pub fn session_probe(id: impl Into<String>, auth: Arc<dyn AuthProvider>) -> MenuProbe {
    AsyncProbe::new(id, move || {
        let auth = Arc::clone(&auth);
        async move {
            if !auth.is_logged_in().await? {
                return Ok(ProbeOutcome::Session(SessionStatus::logged_out()));
            }
            let principal = auth.current_principal_name().await?;
            Ok(ProbeOutcome::Session(SessionStatus {
                logged_in: true,
                principal,
            }))
        }
    })
}

/// Probe reporting whether `resource` is reachable through `checker`.
pub fn availability_probe(
    id: impl Into<String>,
    checker: Arc<dyn CatalogChecker>,
    resource: impl Into<String>,
) -> MenuProbe {
    let resource = ResourceId(resource.into());
    AsyncProbe::new(id, move || {
        let checker = Arc::clone(&checker);
        let resource = resource.clone();
        async move {
            let available = checker.is_available(&resource).await?;
            Ok(ProbeOutcome::Available(available))
        }
    })
}

#[cfg(test)]
#[path = "tests/providers_tests.rs"]
mod tests;
