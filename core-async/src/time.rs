//! Time-related abstractions.
//!
//! Re-exports tokio's timer primitives plus a couple of wall-clock helpers.
//! Under `#[tokio::test(start_paused = true)]` the sleep-based functions run
//! on virtual time, which is how the timer-driven auth paths are tested.

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Returns the current time as milliseconds since UNIX_EPOCH.
///
/// # Examples
///
/// ```rust
/// use core_async::time::now_millis;
///
/// let timestamp = now_millis();
/// ```
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_millis() as u64
}

/// Returns the current time as seconds since UNIX_EPOCH.
///
/// # Examples
///
/// ```rust
/// use core_async::time::now_secs;
///
/// let timestamp = now_secs();
/// ```
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_secs()
}
