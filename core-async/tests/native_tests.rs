//! Integration tests exercising the runtime surface end to end.

use core_async::time::{sleep, timeout, Duration};
use core_async::timer::schedule;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn spawn_and_join() {
    let handle = core_async::spawn(async { 2 + 2 });
    assert_eq!(handle.await.unwrap(), 4);
}

#[tokio::test]
async fn timeout_expires() {
    let result = timeout(Duration::from_millis(10), async {
        sleep(Duration::from_secs(60)).await;
    })
    .await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn rescheduling_cancels_previous_timer() {
    // Mirrors the auth-core pattern: every token update disarms the previous
    // refresh timer before arming a new one.
    let fires = Arc::new(AtomicU32::new(0));

    let first = {
        let fires = fires.clone();
        schedule(Duration::from_secs(10), async move {
            fires.fetch_add(1, Ordering::SeqCst);
        })
    };

    first.cancel();

    let _second = {
        let fires = fires.clone();
        schedule(Duration::from_secs(20), async move {
            fires.fetch_add(1, Ordering::SeqCst);
        })
    };

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1);
}
