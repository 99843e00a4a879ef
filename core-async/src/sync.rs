//! Synchronization primitives.
//!
//! Async-aware locks never block the executor, which matters for the batch
//! dispatcher: its workers share one work queue and hold the lock only long
//! enough to claim the next batch.
//!
//! ```rust
//! use core_async::sync::Mutex;
//! use std::collections::VecDeque;
//!
//! async fn claim(queue: &Mutex<VecDeque<u32>>) -> Option<u32> {
//!     queue.lock().await.pop_front()
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

/// Cooperative cancellation signal shared between a job and its caller.
pub use tokio_util::sync::CancellationToken;
