use crate::error::StorageError;
use crate::log::raft_log::check_append;
use crate::log::raft_log::check_truncate;
use crate::log::RaftLog;
use crate::log::ReadableRaftLog;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// A log held entirely in memory. It does not survive a restart.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryRaftLog<C: RaftTypeConfig> {
    entries: Vec<RaftLogEntry<C>>,
    commit_index: Option<u64>,
}

impl<C: RaftTypeConfig> Default for InMemoryRaftLog<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            commit_index: None,
        }
    }
}

impl<C: RaftTypeConfig> InMemoryRaftLog<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log that already holds `entries`, with nothing committed.
    pub fn with_entries(entries: impl IntoIterator<Item = RaftLogEntry<C>>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            commit_index: None,
        }
    }

    /// Build a log from its entries and commit index.
    pub fn from_parts(entries: Vec<RaftLogEntry<C>>, commit_index: Option<u64>) -> Self {
        Self { entries, commit_index }
    }

    pub fn entries(&self) -> &[RaftLogEntry<C>] {
        &self.entries
    }

    fn out_of_range(&self, index: u64) -> StorageError {
        StorageError::OutOfRange {
            index,
            append_index: self.append_index(),
        }
    }
}

impl<C: RaftTypeConfig> ReadableRaftLog<C> for InMemoryRaftLog<C> {
    fn append_index(&self) -> Option<u64> {
        (self.entries.len() as u64).checked_sub(1)
    }

    fn commit_index(&self) -> Option<u64> {
        self.commit_index
    }

    fn read_entry_term(&self, index: u64) -> Result<u64, StorageError> {
        self.entries.get(index as usize).map(|e| e.term).ok_or_else(|| self.out_of_range(index))
    }

    fn read_log_entry(&self, index: u64) -> Result<RaftLogEntry<C>, StorageError> {
        self.entries.get(index as usize).cloned().ok_or_else(|| self.out_of_range(index))
    }
}

impl<C: RaftTypeConfig> RaftLog<C> for InMemoryRaftLog<C> {
    fn append(&mut self, index: u64, entry: RaftLogEntry<C>) -> Result<(), StorageError> {
        check_append(self.append_index(), index)?;
        self.entries.push(entry);
        Ok(())
    }

    fn truncate(&mut self, from_index: u64) -> Result<(), StorageError> {
        check_truncate(self.commit_index, from_index)?;
        self.entries.truncate(from_index as usize);
        Ok(())
    }

    fn commit(&mut self, commit_index: u64) -> Result<(), StorageError> {
        if !self.entry_exists(commit_index) {
            return Err(self.out_of_range(commit_index));
        }
        if self.commit_index < Some(commit_index) {
            self.commit_index = Some(commit_index);
        }
        Ok(())
    }
}
