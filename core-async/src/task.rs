//! Task spawning and execution abstractions.
//!
//! Thin re-exports over `tokio::task` so downstream crates keep a single
//! import path for runtime primitives.

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the runtime.
///
/// The spawned task runs concurrently with other tasks and may run on a
/// different thread.
///
/// # Examples
///
/// ```rust
/// use core_async::task::spawn;
///
/// # async fn example() {
/// let handle = spawn(async { 42 });
/// let result = handle.await.unwrap();
/// assert_eq!(result, 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
