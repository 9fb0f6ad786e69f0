//! Async abstraction layer for the workbench auth core.
//!
//! This crate concentrates the runtime touch points (task spawning, timers,
//! sleeping) so the core crates depend on a small, stable surface instead of
//! reaching into tokio directly at every call site.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Time-related operations (sleep, duration, timestamps)
//! - `timer`: Cancellable scheduled tasks (the `setTimeout`/`clearTimeout`
//!   replacement used for auto-refresh and backoff)
//!
//! # Examples
//!
//! ```rust
//! use core_async::timer::schedule;
//! use core_async::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let task = schedule(Duration::from_millis(10), async {
//!     // fires unless cancelled first
//! });
//! task.cancel();
//! # }
//! ```

pub mod task;
pub mod time;
pub mod timer;

// Re-export commonly used types at crate root for convenience
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
pub use timer::{schedule, ScheduledTask};
