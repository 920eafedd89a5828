//! In-process collaborators with configurable latency.

use std::{
    cell::RefCell,
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use menu_core::{AuthProvider, CatalogChecker, DocumentProvider, EventBus};
use shared::{
    domain::{DocumentState, ResourceId, SessionStatus},
    events::Event,
};
use tracing::info;

pub struct SimulatedAuth {
    provider: &'static str,
    principal: String,
    latency: Duration,
    logged_in: AtomicBool,
    unresponsive: bool,
}

impl SimulatedAuth {
    pub fn new(provider: &'static str, principal: impl Into<String>, latency: Duration) -> Self {
        Self {
            provider,
            principal: principal.into(),
            latency,
            logged_in: AtomicBool::new(false),
            unresponsive: false,
        }
    }

    /// Identity provider whose session checks never come back.
    pub fn unresponsive(provider: &'static str) -> Self {
        Self {
            unresponsive: true,
            ..Self::new(provider, "", Duration::ZERO)
        }
    }
}

#[async_trait]
impl AuthProvider for SimulatedAuth {
    async fn is_logged_in(&self) -> Result<bool> {
        if self.unresponsive {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(self.latency).await;
        Ok(self.logged_in.load(Ordering::SeqCst))
    }

    async fn current_principal_name(&self) -> Result<Option<String>> {
        Ok(self
            .logged_in
            .load(Ordering::SeqCst)
            .then(|| self.principal.clone()))
    }

    async fn login(&self) -> Result<SessionStatus> {
        if self.unresponsive {
            bail!("{} identity provider unreachable", self.provider);
        }
        tokio::time::sleep(self.latency).await;
        self.logged_in.store(true, Ordering::SeqCst);
        info!(provider = self.provider, principal = %self.principal, "logged in");
        Ok(SessionStatus::logged_in_as(self.principal.clone()))
    }

    async fn logout(&self) -> Result<()> {
        tokio::time::sleep(self.latency).await;
        self.logged_in.store(false, Ordering::SeqCst);
        info!(provider = self.provider, "logged out");
        Ok(())
    }
}

pub struct SimulatedCatalog {
    latency: Duration,
    available: Vec<String>,
}

impl SimulatedCatalog {
    pub fn new(latency: Duration, available: &[&str]) -> Self {
        Self {
            latency,
            available: available.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CatalogChecker for SimulatedCatalog {
    async fn is_available(&self, resource: &ResourceId) -> Result<bool> {
        tokio::time::sleep(self.latency).await;
        Ok(self.available.iter().any(|r| r == resource.as_str()))
    }
}

/// Owns the loaded genome and announces every change on the bus.
pub struct SimulatedDocuments {
    bus: Rc<EventBus>,
    current: RefCell<Option<DocumentState>>,
}

impl SimulatedDocuments {
    pub fn new(bus: Rc<EventBus>) -> Self {
        Self {
            bus,
            current: RefCell::new(None),
        }
    }

    pub fn load(&self, document: Option<DocumentState>) {
        let genome = document
            .as_ref()
            .map_or("none", |d| d.display_name.as_str())
            .to_string();
        *self.current.borrow_mut() = document.clone();
        let report = self.bus.publish(&Event::DocumentChanged(document));
        info!(%genome, delivered = report.delivered, faults = report.faults.len(), "genome changed");
    }
}

impl DocumentProvider for SimulatedDocuments {
    fn current(&self) -> Option<DocumentState> {
        self.current.borrow().clone()
    }
}
