//! Restartable background tasks.
//!
//! A `RestartableTask` owns one job body and guarantees that at most one
//! instance of it runs at a time. Restarting a running task cancels the
//! current run cooperatively and schedules exactly one fresh run once the
//! current body returns, no matter how many restarts arrived in between.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

pub mod pool;
pub mod timer;

pub use pool::WorkerPool;
pub use timer::{StepTimeout, StepTimer, TimeoutScope};

/// Anything a long-running job can poll for cooperative cancellation.
pub trait Interruptible {
    /// `true` once the current run should stop and discard its partial work.
    fn interrupted(&self) -> bool;
}

impl Interruptible for CancellationToken {
    fn interrupted(&self) -> bool {
        self.is_cancelled()
    }
}

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Never started.
    Idle,
    /// A body is executing on the pool.
    Running,
    /// The last run returned without being interrupted.
    Completed,
    /// The last run was stopped before it could finish.
    Cancelled,
}

/// Body signature shared by every restartable task.
type TaskBody = dyn Fn(&TaskContext<'_>) + Send + Sync;

/// Mutable lifecycle bookkeeping, guarded by `TaskInner::control`.
struct Control {
    state: TaskState,
    pending_restart: bool,
    token: CancellationToken,
    generation: u64,
    finished_runs: u64,
}

struct TaskInner {
    name: String,
    handle: Handle,
    body: Box<TaskBody>,
    control: Mutex<Control>,
    idle: Condvar,
}

impl TaskInner {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_stop(&self) {
        let mut ctl = self.lock();
        ctl.pending_restart = false;
        if ctl.state == TaskState::Running {
            ctl.token.cancel();
        }
    }
}

/// What: View of the task handed to each run of the body.
///
/// Details:
/// - `interrupted()` answers for this run only; a later run gets a fresh token.
/// - `stop()` lets the body end its own run after a fault that retrying would
///   only repeat; restarts requested by others are kept.
pub struct TaskContext<'a> {
    task: &'a TaskInner,
    token: CancellationToken,
    generation: u64,
}

impl TaskContext<'_> {
    /// Name of the owning task, for log fields.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.task.name
    }

    /// Sequence number of this run, starting at 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` once a restart or stop was requested for this run.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// What: End this run without asking for a retry.
    ///
    /// Details:
    /// - Cancels this run's token only. A `restart()` issued by another caller
    ///   during this run still schedules its fresh run.
    pub fn stop(&self) {
        tracing::debug!(task = %self.task.name, run = self.generation, "[Task] run stopped by body");
        self.token.cancel();
    }
}

impl Interruptible for TaskContext<'_> {
    fn interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// What: Named, cancellable unit of background work.
///
/// Inputs:
/// - Constructed with a name, a pool handle and a body closure.
///
/// Output:
/// - Cheap to clone; clones control the same task.
///
/// Details:
/// - `restart()` while idle starts a run; while running it cancels the run and
///   sets a pending flag so exactly one fresh run follows.
/// - A body that panics is logged and counted as a finished run.
#[derive(Clone)]
pub struct RestartableTask {
    inner: Arc<TaskInner>,
}

impl std::fmt::Debug for RestartableTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartableTask")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RestartableTask {
    /// Create an idle task whose runs execute on `handle`'s blocking pool.
    pub fn new<F>(name: impl Into<String>, handle: Handle, body: F) -> Self
    where
        F: Fn(&TaskContext<'_>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                handle,
                body: Box::new(body),
                control: Mutex::new(Control {
                    state: TaskState::Idle,
                    pending_restart: false,
                    token: CancellationToken::new(),
                    generation: 0,
                    finished_runs: 0,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// What: Start the task, or cancel and re-run it if already running.
    ///
    /// Details:
    /// - Idle/finished: moves to `Running` and schedules a run immediately.
    /// - Running: sets the pending-restart flag and cancels the current run's
    ///   token. Repeated calls collapse into the same single pending run.
    pub fn restart(&self) {
        let mut ctl = self.inner.lock();
        if ctl.state == TaskState::Running {
            ctl.pending_restart = true;
            ctl.token.cancel();
            tracing::trace!(task = %self.inner.name, "[Task] restart requested while running");
            return;
        }
        ctl.state = TaskState::Running;
        ctl.token = CancellationToken::new();
        ctl.generation += 1;
        drop(ctl);

        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn_blocking(move || run_loop(&inner));
    }

    /// Cancel the current run without scheduling another one.
    pub fn stop(&self) {
        self.inner.request_stop();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    /// `true` while a body is executing or about to be re-run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Number of runs that have returned (completed, cancelled or panicked).
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.lock().finished_runs
    }

    /// What: Block the calling thread until the task is no longer running.
    ///
    /// Inputs:
    /// - `timeout`: Maximum time to wait.
    ///
    /// Output:
    /// - `true` if the task went idle within `timeout`.
    #[must_use]
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let ctl = self.inner.lock();
        let (ctl, _) = self
            .inner
            .idle
            .wait_timeout_while(ctl, timeout, |c| c.state == TaskState::Running)
            .unwrap_or_else(PoisonError::into_inner);
        ctl.state != TaskState::Running
    }
}

/// Execute runs back to back until no restart is pending.
fn run_loop(inner: &TaskInner) {
    loop {
        let ctx = {
            let ctl = inner.lock();
            TaskContext {
                task: inner,
                token: ctl.token.clone(),
                generation: ctl.generation,
            }
        };
        tracing::debug!(task = %inner.name, run = ctx.generation, "[Task] run started");

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (inner.body)(&ctx))) {
            let msg = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(task = %inner.name, run = ctx.generation, panic = %msg, "[Task] body panicked");
        }

        let mut ctl = inner.lock();
        ctl.finished_runs += 1;
        if ctl.pending_restart {
            ctl.pending_restart = false;
            ctl.token = CancellationToken::new();
            ctl.generation += 1;
            tracing::debug!(task = %inner.name, "[Task] re-running after restart");
            continue;
        }
        ctl.state = if ctx.token.is_cancelled() {
            tracing::debug!(task = %inner.name, run = ctx.generation, "[Task] run cancelled");
            TaskState::Cancelled
        } else {
            TaskState::Completed
        };
        drop(ctl);
        inner.idle.notify_all();
        return;
    }
}
