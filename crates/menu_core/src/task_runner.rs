//! Runs work off the UI thread and hands each completion back to it.
//!
//! Work executes on a tokio multi-thread runtime. Its result crosses back
//! over a crossbeam channel and is only turned into a callback when the UI
//! loop calls [`TaskRunner::drain`] (or one of its variants), so callbacks
//! always run on the thread that owns the runner. Cancellation removes the
//! pending callback on the UI side, which makes suppression exact even when
//! the background future has already finished.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    rc::{Rc, Weak},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use futures::FutureExt;
use tokio::{
    runtime::{Handle, Runtime},
    task::AbortHandle,
};

const WORKER_THREAD_NAME: &str = "probe-worker";

type Payload = Box<dyn Any + Send>;
type Callback = Box<dyn FnOnce(Payload)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

struct Completion {
    id: TaskId,
    payload: Payload,
}

struct PendingTask {
    label: String,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    pending: RefCell<HashMap<TaskId, PendingTask>>,
}

enum RuntimeHost {
    Owned(Option<Runtime>),
    Borrowed(Handle),
}

pub struct TaskRunner {
    host: RuntimeHost,
    handle: Handle,
    registry: Rc<Registry>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    next_id: Cell<u64>,
    ui_thread: ThreadId,
}

impl TaskRunner {
    /// Build a runner with its own runtime. The calling thread becomes the
    /// UI-owning thread.
    pub fn new(worker_threads: usize) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()
            .context("failed to build background runtime")?;
        let handle = runtime.handle().clone();
        Ok(Self::with_host(RuntimeHost::Owned(Some(runtime)), handle))
    }

    /// Build a runner on top of an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self::with_host(RuntimeHost::Borrowed(handle.clone()), handle)
    }

    fn with_host(host: RuntimeHost, handle: Handle) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            host,
            handle,
            registry: Rc::new(Registry::default()),
            completion_tx,
            completion_rx,
            next_id: Cell::new(1),
            ui_thread: thread::current().id(),
        }
    }

    pub fn ui_thread(&self) -> ThreadId {
        self.ui_thread
    }

    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.ui_thread
    }

    /// Submit `work`; `on_complete` runs exactly once on the UI thread during
    /// a later drain, unless the returned handle is cancelled first.
    pub fn run<T, F, C>(&self, label: impl Into<String>, work: F, on_complete: C) -> TaskHandle
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        C: FnOnce(anyhow::Result<T>) + 'static,
    {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let label = label.into();

        let callback_label = label.clone();
        let callback: Callback = Box::new(move |payload: Payload| {
            match payload.downcast::<anyhow::Result<T>>() {
                Ok(result) => on_complete(*result),
                Err(_) => tracing::error!(
                    task = id.0,
                    label = %callback_label,
                    "completion payload has unexpected type"
                ),
            }
        });
        self.registry
            .pending
            .borrow_mut()
            .insert(id, PendingTask { label: label.clone(), callback });

        let tx = self.completion_tx.clone();
        let join = self.handle.spawn(async move {
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(anyhow!(
                    "background task panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            let payload: Payload = Box::new(result);
            if tx.send(Completion { id, payload }).is_err() {
                tracing::trace!(task = id.0, "runner gone before completion");
            }
        });
        tracing::debug!(task = id.0, label = %label, "background task submitted");

        TaskHandle {
            id,
            registry: Rc::downgrade(&self.registry),
            abort: join.abort_handle(),
        }
    }

    /// Like [`TaskRunner::run`] for synchronous, possibly blocking work.
    pub fn run_blocking<T, W, C>(
        &self,
        label: impl Into<String>,
        work: W,
        on_complete: C,
    ) -> TaskHandle
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
        C: FnOnce(anyhow::Result<T>) + 'static,
    {
        let work = async move {
            match tokio::task::spawn_blocking(work).await {
                Ok(result) => result,
                Err(err) => Err(anyhow!("blocking task did not complete: {err}")),
            }
        };
        self.run(label, work, on_complete)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending.borrow().len()
    }

    /// Deliver every completion that has already arrived. Never blocks.
    pub fn drain(&self) -> usize {
        self.assert_ui_thread();
        let mut delivered = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.deliver(completion) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait up to `timeout` for a completion, then deliver everything queued.
    pub fn drain_timeout(&self, timeout: Duration) -> usize {
        self.assert_ui_thread();
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => usize::from(self.deliver(completion)) + self.drain(),
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Keep draining until no callbacks are pending or `timeout` elapses.
    /// Returns `true` when the runner went idle.
    pub fn run_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if self.pending_count() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.drain_timeout(deadline - now);
        }
    }

    fn deliver(&self, completion: Completion) -> bool {
        let pending = self.registry.pending.borrow_mut().remove(&completion.id);
        match pending {
            Some(task) => {
                tracing::debug!(task = completion.id.0, label = %task.label, "delivering completion");
                (task.callback)(completion.payload);
                true
            }
            None => {
                tracing::trace!(task = completion.id.0, "completion for cancelled task dropped");
                false
            }
        }
    }

    fn assert_ui_thread(&self) {
        debug_assert!(
            self.is_ui_thread(),
            "task completions must be drained on the UI thread"
        );
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        let abandoned = self.registry.pending.borrow().len();
        if abandoned > 0 {
            tracing::debug!(abandoned, "task runner dropped with pending work");
        }
        if let RuntimeHost::Owned(runtime) = &mut self.host {
            if let Some(runtime) = runtime.take() {
                runtime.shutdown_background();
            }
        }
    }
}

/// Handle to one submitted task. Dropping it does not cancel the task.
pub struct TaskHandle {
    id: TaskId,
    registry: Weak<Registry>,
    abort: AbortHandle,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the completion callback is still due.
    pub fn is_pending(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.pending.borrow().contains_key(&self.id))
    }

    /// Suppress the completion callback and abort the work if it is still
    /// running. Returns `false` when the callback was already delivered or
    /// the handle was cancelled before.
    pub fn cancel(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.pending.borrow_mut().remove(&self.id);
        match removed {
            Some(task) => {
                self.abort.abort();
                tracing::debug!(task = self.id.0, label = %task.label, "background task cancelled");
                true
            }
            None => false,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "tests/task_runner_tests.rs"]
mod tests;
