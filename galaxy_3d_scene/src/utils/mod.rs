//! Utility types shared across modules.

mod task_pool;

pub use task_pool::TaskPool;
