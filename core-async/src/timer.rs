//! Cancellable scheduled tasks.
//!
//! Callback-style timer chains (`setTimeout`/`clearTimeout`) become explicit
//! handles here: [`schedule`] arms a delayed task and returns a
//! [`ScheduledTask`] whose `cancel()` disarms it. The auth core uses this for
//! proactive token refresh and for the refresh retry/backoff chain, where a
//! stale timer firing after state has moved on would be a correctness bug.
//!
//! Dropping a handle does NOT cancel the task; the owner must cancel
//! explicitly, matching the semantics of a timer id that simply goes out of
//! scope.

use crate::time::{sleep, Duration};
use tokio::task::JoinHandle;

/// Handle to a task scheduled with [`schedule`].
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancel the task.
    ///
    /// A task that has not fired yet will never fire; a task currently
    /// running is aborted at its next await point. Cancelling an already
    /// finished task is a no-op.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task has run to completion or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Schedule `task` to run once after `delay`.
///
/// The returned handle can be used to cancel the task before (or while) it
/// runs. The task itself runs on the runtime's executor.
///
/// # Examples
///
/// ```rust
/// use core_async::timer::schedule;
/// use core_async::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pending = schedule(Duration::from_secs(300), async {
///     // refresh the token
/// });
///
/// // State changed before the timer fired; disarm it.
/// pending.cancel();
/// # }
/// ```
pub fn schedule<F>(delay: Duration, task: F) -> ScheduledTask
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handle = tokio::task::spawn(async move {
        sleep(delay).await;
        task.await;
    });
    ScheduledTask { handle }
}
