use crate::error::StorageError;
use crate::store::TermStore;
use crate::store::VoteStore;
use crate::MemberId;

#[derive(Debug, Clone, Default)]
pub struct InMemoryTermStore {
    term: u64,
}

impl TermStore for InMemoryTermStore {
    fn current_term(&self) -> u64 {
        self.term
    }

    fn update(&mut self, term: u64) -> Result<(), StorageError> {
        self.term = term;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryVoteStore<MID: MemberId> {
    voted_for: Option<MID>,
}

impl<MID: MemberId> VoteStore<MID> for InMemoryVoteStore<MID> {
    fn voted_for(&self) -> Option<MID> {
        self.voted_for
    }

    fn update(&mut self, voted_for: Option<MID>) -> Result<(), StorageError> {
        self.voted_for = voted_for;
        Ok(())
    }
}
