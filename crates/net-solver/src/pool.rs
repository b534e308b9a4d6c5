//! Process-scoped worker pool for superposition's per-layer dispatch
//! (spec §5, §4.8: "dispatched across a worker pool (scheduling model is
//! pool-if-present else sequential)").

use std::sync::OnceLock;

static GLOBAL_POOL: OnceLock<WorkerPool> = OnceLock::new();

/// Thin wrapper over a `rayon::ThreadPool` handle. Installed once before the
/// simulation loop starts (spec §5: "the worker pool handle, if any, is
/// process-scoped, installed once"); ticks read it but never reconfigure it.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    fn build(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("net-solver-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Installs the process-wide worker pool. A second call is a no-op: the
    /// pool is process-scoped and only the first installation takes effect.
    pub fn install_global(threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
        if GLOBAL_POOL.get().is_some() {
            return Ok(());
        }
        let pool = Self::build(threads)?;
        let _ = GLOBAL_POOL.set(pool);
        Ok(())
    }

    /// The installed pool, if any. `None` means the superposition driver
    /// must dispatch layers sequentially (spec §4.8 step 3).
    pub fn global() -> Option<&'static WorkerPool> {
        GLOBAL_POOL.get()
    }

    /// Runs `work` inside this pool and returns its result.
    pub fn install<R: Send>(&self, work: impl FnOnce() -> R + Send) -> R {
        self.pool.install(work)
    }
}
