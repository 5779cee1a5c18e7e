/// Fork-join worker pool.
///
/// Wraps a dedicated rayon thread pool. The only way to use it is
/// `run_all`: submit a fixed batch of independent tasks and block until
/// every one of them has completed. Nothing outlives the call.
///
/// # Example
///
/// ```ignore
/// let pool = TaskPool::new(4)?;
/// let squares = pool.run_all(vec![1, 2, 3], |x| x * x);
/// assert_eq!(squares, vec![1, 4, 9]);
/// ```

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use crate::error::{Error, Result};
use crate::engine_debug;

pub struct TaskPool {
    pool: ThreadPool,
}

impl TaskPool {
    /// Create a pool with `num_threads` workers (0 = available parallelism).
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("galaxy3d-worker-{}", index))
            .build()
            .map_err(|e| Error::InitializationFailed(format!("Worker pool: {}", e)))?;

        engine_debug!("galaxy3d::TaskPool", "Created worker pool with {} threads",
            pool.current_num_threads());

        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run one task per input and wait for all of them.
    ///
    /// Results come back in input order regardless of completion order.
    pub fn run_all<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        match tasks.len() {
            0 => Vec::new(),
            1 => tasks.into_iter().map(f).collect(),
            _ => self.pool.install(|| tasks.into_par_iter().map(f).collect()),
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("num_threads", &self.num_threads())
            .finish()
    }
}

#[cfg(test)]
#[path = "task_pool_tests.rs"]
mod tests;
