use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tokio::runtime::{Builder as TokioRuntimeBuilder, Handle as TokioRuntimeHandle, Runtime as TokioRuntime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::{Result, WorkerPoolError};

const WORKER_POOL_THREAD_ID_PREFIX: &str = "speedtest-worker"; // thread names will be speedtest-worker-0, -1, etc.
const WORKER_POOL_STACK_SIZE: usize = 8_000_000; // 8MB stack size
const WORKER_POOL_MAX_BLOCKING_THREADS: usize = 16;

/// A fixed-size pool of worker threads backed by a dedicated tokio runtime.
///
/// One pool is created per transfer session, sized to the number of streams, so every
/// stream's I/O and event callbacks run on a pool worker rather than on the caller's thread.
///
/// # Example
///
/// ```rust
/// use worker_pool::WorkerPool;
///
/// let pool = WorkerPool::new(2).expect("Error initializing worker pool.");
/// let task = pool.spawn(async { 42 }).expect("Pool shut down.");
/// pool.shutdown();
/// # drop(task);
/// ```
///
/// # Shutdown
///
/// `shutdown` never waits for in-flight tasks; they are dropped at their next `.await`.
/// It is safe to call from any thread, including one of the pool's own workers, and
/// more than once.
#[derive(Debug)]
pub struct WorkerPool {
    // Taken out on shutdown; None afterwards.
    runtime: RwLock<Option<TokioRuntime>>,

    // Used to spawn work without holding the runtime lock.
    handle: TokioRuntimeHandle,

    num_workers: usize,

    is_shut_down: AtomicBool,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Result<Arc<Self>> {
        if num_workers == 0 {
            return Err(WorkerPoolError::ZeroWorkers);
        }

        let thread_id = AtomicUsize::new(0);
        let get_thread_name = move || {
            let id = thread_id.fetch_add(1, Ordering::Relaxed);
            format!("{WORKER_POOL_THREAD_ID_PREFIX}-{id}")
        };

        let runtime = TokioRuntimeBuilder::new_multi_thread()
            .thread_name_fn(get_thread_name)
            .worker_threads(num_workers)
            .thread_stack_size(WORKER_POOL_STACK_SIZE) // 8MB stack size, default is 2MB
            .max_blocking_threads(WORKER_POOL_MAX_BLOCKING_THREADS)
            .enable_all() // enable all features, including IO/Timer/Signal/Reactor
            .build()
            .map_err(WorkerPoolError::RuntimeInitializationError)?;

        let handle = runtime.handle().clone();

        debug!(num_workers, "Worker pool started.");

        Ok(Arc::new(Self {
            runtime: RwLock::new(Some(runtime)),
            handle,
            num_workers,
            is_shut_down: AtomicBool::new(false),
        }))
    }

    /// A handle to the underlying runtime, for components that spawn their own tasks.
    #[inline]
    pub fn handle(&self) -> TokioRuntimeHandle {
        self.handle.clone()
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn is_shut_down(&self) -> bool {
        self.is_shut_down.load(Ordering::SeqCst)
    }

    /// Spawns a task on one of the pool workers.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(WorkerPoolError::PoolShutDown);
        }
        Ok(self.handle.spawn(future))
    }

    /// Stops the pool without waiting for running tasks.  Returns true if this call
    /// performed the shutdown, false if the pool was already shut down.
    pub fn shutdown(&self) -> bool {
        if self.is_shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        let maybe_runtime = match self.runtime.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(runtime) = maybe_runtime else {
            return false;
        };

        // shutdown_background does not block, so this is allowed from within an async
        // context, including from a task running on this same runtime.
        runtime.shutdown_background();
        debug!(num_workers = self.num_workers, "Worker pool shut down.");
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Display for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Need to be careful that this doesn't acquire locks eagerly, as this function can be called
        // from some weird places like displaying the backtrace of a panic.
        let Ok(runtime_rlg) = self.runtime.try_read() else {
            return write!(f, "Locked worker pool.");
        };

        let Some(ref runtime) = *runtime_rlg else {
            return write!(f, "Terminated worker pool; shutdown called.");
        };

        let metrics = runtime.metrics();
        write!(
            f,
            "worker pool: num_workers: {:?}, num_alive_tasks: {:?}, global_queue_depth: {:?}",
            metrics.num_workers(),
            metrics.num_alive_tasks(),
            metrics.global_queue_depth()
        )
    }
}
