//! Runtime abstraction layer for the list sync engine.
//!
//! Every other crate in the workspace depends on this crate instead of
//! reaching for Tokio directly, so the executor can be swapped in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and cooperative yielding
//! - `time`: Sleep, timeouts and instants
//! - `sync`: Async-aware locks, semaphores and the cancellation token
//! - `runtime`: Blocking entry point for synchronous callers
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = core_async::task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
