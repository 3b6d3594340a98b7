//! Named, optionally jittered, renewable timeouts.
//!
//! A timeout is armed when created and fires at most once per arming. `renew()` re-arms it with a
//! fresh deadline, `cancel()` disarms it without firing. Both may be called from any thread.

mod controlled;
mod scheduled;
mod stamped;


use std::sync::Arc;
use std::time::Duration;

pub use controlled::ControlledTimeoutService;
pub use scheduled::ScheduledTimeoutService;
pub use stamped::StampedTimeout;

/// Identifies what a timeout is for; handlers receive it when the timeout fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(derive_more::Display)]
pub enum TimeoutName {
    Election,
    Heartbeat,
    ShippingRetry,
}

/// Called when a timeout fires. It runs on the timer's context and must not block.
pub type TimeoutHandler = Arc<dyn Fn(TimeoutName) + Send + Sync + 'static>;

/// A handle to a timeout created by a [`TimeoutService`]. Dropping it removes the timeout.
pub trait RenewableTimeout: Send + Sync {
    /// Re-arm with a new deadline computed from now.
    fn renew(&self);

    /// Disarm without firing.
    fn cancel(&self);
}

pub trait TimeoutService: Send + Sync + 'static {
    /// Create an armed timeout that calls `handler` after `timeout` plus a random jitter in
    /// `[0, jitter)`.
    fn create(
        &self,
        name: TimeoutName,
        timeout: Duration,
        jitter: Duration,
        handler: TimeoutHandler,
    ) -> Box<dyn RenewableTimeout>;

    /// Start firing timeouts in the background, if the service does so.
    fn start(&self) {}

    /// Stop firing timeouts.
    fn shutdown(&self) {}
}
