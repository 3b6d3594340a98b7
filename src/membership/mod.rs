//! Voting and replication member sets, and the two-phase admission of new members.
//!
//! A new member first joins the replication set so that the leader ships it the log. It becomes
//! a voter only once it is within `catchup_lag_threshold` entries of the leader's append index,
//! by appending a membership entry. The admission completes when that entry is committed, or
//! fails if the member does not catch up within `catchup_timeout`.

mod event;
mod manager;


pub use event::MembershipEvent;
pub use manager::MembershipManager;
