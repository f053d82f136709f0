//! Worker loop - executes queued work units one at a time

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_channel::Receiver;
use futures::FutureExt;
use tracing::{debug, error};

use super::WorkUnit;

/// Pull units until the queue is closed and drained
///
/// A panicking unit is caught here so the worker keeps its slot in the pool.
pub(super) async fn run(worker_id: usize, queue: Receiver<WorkUnit>, in_flight: Arc<AtomicUsize>) {
    debug!(worker_id, "Worker started");

    while let Ok(unit) = queue.recv().await {
        in_flight.fetch_add(1, Ordering::Relaxed);
        let outcome = AssertUnwindSafe(unit).catch_unwind().await;
        in_flight.fetch_sub(1, Ordering::Relaxed);

        if let Err(panic) = outcome {
            error!(worker_id, reason = panic_message(&*panic), "Work unit panicked");
        }
    }

    debug!(worker_id, "Worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
