//! Runtime utilities for callers that live outside an async context.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs `future` to completion on a fresh current-thread runtime.
///
/// # Errors
///
/// Returns the I/O error raised while building the runtime (out of file
/// descriptors or threads).
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
