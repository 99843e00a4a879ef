//! Smoke tests for the native runtime facade.

use core_async::sync::{CancellationToken, Mutex};
use core_async::time::{sleep, timeout, Duration};
use std::collections::VecDeque;
use std::sync::Arc;

#[tokio::test]
async fn test_spawn_returns_value() {
    let handle = core_async::spawn(async { 7 * 6 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[tokio::test]
async fn test_shared_queue_drains_once() {
    let queue = Arc::new(Mutex::new((0..10).collect::<VecDeque<u32>>()));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let queue = Arc::clone(&queue);
        handles.push(core_async::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(item) = queue.lock().await.pop_front() {
                claimed.push(item);
                core_async::task::yield_now().await;
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort_unstable();
    assert_eq!(all, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_cancellation_token_propagates_to_children() {
    let parent = CancellationToken::new();
    let child = parent.child_token();
    assert!(!child.is_cancelled());

    parent.cancel();
    assert!(child.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_elapses() {
    let result = timeout(Duration::from_millis(10), sleep(Duration::from_secs(1))).await;
    assert!(result.is_err());
}

#[test]
fn test_block_on_outside_runtime() {
    let value = core_async::runtime::block_on(async { "done" }).unwrap();
    assert_eq!(value, "done");
}
