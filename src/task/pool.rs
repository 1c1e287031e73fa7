//! Fixed-size worker pool for restartable task bodies.

use std::io;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

/// Process-wide pool shared by every engine that does not bring its own.
static SHARED_POOL: OnceLock<WorkerPool> = OnceLock::new();

/// What: Dedicated runtime whose blocking threads execute task bodies.
///
/// Details:
/// - Task bodies are synchronous, CPU-bound and poll for interruption, so they
///   run through `spawn_blocking` on a pool capped at `size` threads.
/// - The runtime is separate from any async runtime the host may run, so a
///   long catalog rebuild never starves the host's executor.
pub struct WorkerPool {
    runtime: Runtime,
    size: usize,
}

impl WorkerPool {
    /// What: Build a pool with at most `size` concurrent bodies.
    ///
    /// Inputs:
    /// - `size`: Thread cap; values below one are raised to one.
    ///
    /// Output:
    /// - The pool, or the I/O error reported by the runtime builder.
    ///
    /// # Errors
    /// - Propagates the runtime builder failure (thread spawn errors).
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(size)
            .thread_name("catalog-worker")
            .enable_time()
            .build()?;
        tracing::debug!(size, "[Pool] worker pool started");
        Ok(Self { runtime, size })
    }

    /// Two thirds of the available cores, at least one.
    #[must_use]
    pub fn default_size() -> usize {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        (cores * 2 / 3).max(1)
    }

    /// What: Access the process-wide pool, creating it on first use.
    ///
    /// Inputs:
    /// - `size`: Thread cap used only when the pool is created by this call;
    ///   `None` uses `default_size()`.
    ///
    /// Output:
    /// - A `'static` reference to the shared pool.
    ///
    /// # Errors
    /// - Runtime construction failure on first use.
    pub fn shared(size: Option<usize>) -> io::Result<&'static Self> {
        if let Some(pool) = SHARED_POOL.get() {
            return Ok(pool);
        }
        let pool = Self::new(size.unwrap_or_else(Self::default_size))?;
        Ok(SHARED_POOL.get_or_init(|| pool))
    }

    /// Maximum number of bodies running at once.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Handle used by tasks to schedule their runs.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }
}
