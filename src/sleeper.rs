//! The wait between delivery attempts, behind a trait.
//!
//! `RetryingSender` never calls `tokio::time::sleep` directly. Swapping the sleeper lets
//! tests run a full retry schedule instantly and assert on the exact delays requested.

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Boxed wait returned by a [`Sleeper`]. Must be droppable mid-wait so cancellation works.
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Produces the backoff wait for a given delay.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Waits on the tokio timer. Used outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Resolves immediately whatever delay is asked for.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> SleepFuture {
        Box::pin(future::ready(()))
    }
}

/// Resolves immediately and remembers each requested delay.
///
/// Clones share the same record, so a handle kept by the test observes the waits made
/// through the handle given to a sender.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Forget recorded delays.
    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
        Box::pin(future::ready(()))
    }
}
