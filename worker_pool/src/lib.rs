pub mod errors;
pub mod pool;

pub use errors::WorkerPoolError;
pub use pool::WorkerPool;
