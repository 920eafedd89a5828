//! Versioned, cancellable wrapper around one recurring remote check.
//!
//! Every [`AsyncProbe::start`] bumps the probe's version and cancels the
//! previous submission. Completions carry the version they were started
//! with; [`AsyncProbe::accept`] only stores a result whose version is still
//! current, so a slow older check can never overwrite a newer one.

use std::{
    cell::RefCell,
    fmt,
    future::Future,
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use futures::{future::BoxFuture, FutureExt};
use shared::{domain::ProbeId, error::ProbeFailure};

use crate::task_runner::{TaskHandle, TaskRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProbeVersion(pub u64);

impl ProbeVersion {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ProbeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult<T> {
    Pending,
    Success(T),
    Failure(ProbeFailure),
}

impl<T> ProbeResult<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, ProbeResult::Pending)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            ProbeResult::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ProbeFailure> {
        match self {
            ProbeResult::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn from_outcome(outcome: anyhow::Result<T>) -> Self {
        match outcome {
            Ok(value) => ProbeResult::Success(value),
            Err(err) => ProbeResult::Failure(ProbeFailure::from_error(&err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Running,
    Resolved,
    Cancelled,
}

/// When a menu-open should re-run a probe that already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Re-check on every open.
    #[default]
    Always,
    /// Check once; only failures are retried.
    Once,
    /// Re-check when the last result is older than the given age.
    MaxAge(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDelivery<T> {
    pub probe: ProbeId,
    pub version: ProbeVersion,
    pub result: ProbeResult<T>,
}

/// How long a check without a timeout may run before a menu-open replaces it.
const DEFAULT_STALL_LIMIT: Duration = Duration::from_secs(30);

type CheckFn<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;
type Listener<T> = Rc<RefCell<Option<Box<dyn FnMut(ProbeDelivery<T>)>>>>;

pub struct AsyncProbe<T> {
    id: ProbeId,
    check: CheckFn<T>,
    timeout: Option<Duration>,
    stall_limit: Duration,
    current_version: ProbeVersion,
    state: ProbeState,
    latest: ProbeResult<T>,
    started_at: Option<Instant>,
    resolved_at: Option<Instant>,
    handle: Option<TaskHandle>,
    listener: Listener<T>,
}

impl<T> AsyncProbe<T>
where
    T: Send + 'static,
{
    pub fn new<F, Fut>(id: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            id: ProbeId(id.into()),
            check: Arc::new(move || check().boxed()),
            timeout: None,
            stall_limit: DEFAULT_STALL_LIMIT,
            current_version: ProbeVersion::default(),
            state: ProbeState::Idle,
            latest: ProbeResult::Pending,
            started_at: None,
            resolved_at: None,
            handle: None,
            listener: Rc::new(RefCell::new(None)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Only consulted when the probe has no timeout.
    pub fn with_stall_limit(mut self, limit: Duration) -> Self {
        self.stall_limit = limit;
        self
    }

    pub fn id(&self) -> &ProbeId {
        &self.id
    }

    pub fn current_version(&self) -> ProbeVersion {
        self.current_version
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn latest(&self) -> &ProbeResult<T> {
        &self.latest
    }

    /// Register the single listener that receives every completion,
    /// current or stale. Replaces any previous listener.
    pub fn set_listener<L>(&self, listener: L)
    where
        L: FnMut(ProbeDelivery<T>) + 'static,
    {
        *self.listener.borrow_mut() = Some(Box::new(listener));
    }

    pub fn start(&mut self, runner: &TaskRunner) -> ProbeVersion {
        self.current_version = self.current_version.next();
        let version = self.current_version;
        if let Some(previous) = self.handle.take() {
            previous.cancel();
        }
        self.state = ProbeState::Running;
        self.latest = ProbeResult::Pending;
        self.started_at = Some(Instant::now());

        // Built here so checks are created in start order.
        let fut = (self.check)();
        let timeout = self.timeout;
        let probe_id = self.id.clone();
        let work = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(anyhow!("probe {probe_id} timed out after {limit:?}")),
                },
                None => fut.await,
            }
        };

        let listener = Rc::clone(&self.listener);
        let probe = self.id.clone();
        let handle = runner.run(
            format!("probe {} {version}", self.id),
            work,
            move |outcome: anyhow::Result<T>| {
                let delivery = ProbeDelivery {
                    probe,
                    version,
                    result: ProbeResult::from_outcome(outcome),
                };
                match listener.borrow_mut().as_mut() {
                    Some(listener) => listener(delivery),
                    None => tracing::debug!(
                        probe = %delivery.probe,
                        version = %delivery.version,
                        "probe completed without a listener"
                    ),
                }
            },
        );
        self.handle = Some(handle);
        tracing::debug!(probe = %self.id, %version, "probe started");
        version
    }

    /// Store `delivery` if it belongs to the running version. Returns whether
    /// it was applied; anything else is stale and ignored.
    pub fn accept(&mut self, delivery: ProbeDelivery<T>) -> bool {
        if delivery.version != self.current_version {
            tracing::debug!(
                probe = %self.id,
                stale = %delivery.version,
                current = %self.current_version,
                "discarding stale probe result"
            );
            return false;
        }
        if self.state != ProbeState::Running {
            tracing::debug!(probe = %self.id, state = ?self.state, "probe not running; result ignored");
            return false;
        }
        if let ProbeResult::Failure(failure) = &delivery.result {
            tracing::info!(probe = %self.id, %failure, "probe failed");
        }
        self.latest = delivery.result;
        self.state = ProbeState::Resolved;
        self.resolved_at = Some(Instant::now());
        self.handle = None;
        true
    }

    /// Stop waiting for the in-flight check. The result stays `Pending`.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
        if self.state == ProbeState::Running {
            self.state = ProbeState::Cancelled;
            tracing::debug!(probe = %self.id, version = %self.current_version, "probe cancelled");
        }
    }

    /// Whether a menu-open should start this probe under `policy`.
    pub fn needs_refresh(&self, policy: RefreshPolicy) -> bool {
        match self.state {
            ProbeState::Idle | ProbeState::Cancelled => true,
            ProbeState::Running => self.is_stalled(policy),
            ProbeState::Resolved => {
                if self.latest.failure().is_some() {
                    return true;
                }
                match policy {
                    RefreshPolicy::Always => true,
                    RefreshPolicy::Once => false,
                    RefreshPolicy::MaxAge(max_age) => self
                        .resolved_at
                        .map_or(true, |resolved| resolved.elapsed() >= max_age),
                }
            }
        }
    }

    /// A running check with no timeout that has outlived its stall limit, or
    /// the policy's max age if that is shorter. Checks with a timeout always
    /// resolve on their own.
    fn is_stalled(&self, policy: RefreshPolicy) -> bool {
        if self.timeout.is_some() {
            return false;
        }
        let limit = match policy {
            RefreshPolicy::MaxAge(max_age) => max_age.min(self.stall_limit),
            RefreshPolicy::Always | RefreshPolicy::Once => self.stall_limit,
        };
        let stalled = self
            .started_at
            .is_some_and(|started| started.elapsed() >= limit);
        if stalled {
            tracing::info!(probe = %self.id, version = %self.current_version, ?limit, "probe stalled");
        }
        stalled
    }
}

#[cfg(test)]
#[path = "tests/probe_tests.rs"]
mod tests;
