//! Panic guard for handler invocations.
//!
//! Handlers are user code; a panic inside one must become an error result for
//! that message instead of unwinding the worker that called it.

use crate::error::{ProtocolError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Poll `fut` to completion, converting a panic into [`ProtocolError::HandlerPanic`].
pub async fn guarded<F, T>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ProtocolError::HandlerPanic(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
