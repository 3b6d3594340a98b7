//! Durable single-value stores for the current term and the vote cast in it.

mod file;
mod in_memory;


pub use file::FileTermStore;
pub use file::FileVoteStore;
pub use in_memory::InMemoryTermStore;
pub use in_memory::InMemoryVoteStore;

use crate::error::StorageError;

/// Persists the current term. `update` returns only once the term is durable.
pub trait TermStore: Send + 'static {
    fn current_term(&self) -> u64;

    fn update(&mut self, term: u64) -> Result<(), StorageError>;
}

/// Persists the member voted for in the current term.
pub trait VoteStore<MID>: Send + 'static {
    fn voted_for(&self) -> Option<MID>;

    fn update(&mut self, voted_for: Option<MID>) -> Result<(), StorageError>;
}
