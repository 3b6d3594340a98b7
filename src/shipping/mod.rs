//! Log shipping: one replication channel per follower of a leader.
//!
//! A shipper starts in [`ShipMode::Mismatch`], probing for the last index it shares with its
//! follower. Once a probe matches it switches to [`ShipMode::Pipeline`] and streams batches of
//! up to `max_payload_entries`, each sent once the previous one is confirmed. A rejected append
//! rewinds the shipper, and the retry timer resends after the fixed `retry_time` backoff.

mod manager;
mod shipper;


pub use manager::LogShippingManager;
pub use manager::RetryNotify;
pub use shipper::LogShipper;
pub use shipper::ShipMode;
