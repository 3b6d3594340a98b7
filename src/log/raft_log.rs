use crate::error::StorageError;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// Read access to a replicated log.
///
/// Indexes start at 0. An empty log has an append index of `None`.
pub trait ReadableRaftLog<C: RaftTypeConfig> {
    /// Index of the last appended entry.
    fn append_index(&self) -> Option<u64>;

    /// Index of the last entry known to be committed.
    fn commit_index(&self) -> Option<u64>;

    /// Term of the entry at `index`.
    ///
    /// Fails with [`StorageError::OutOfRange`] if there is no entry at `index`.
    fn read_entry_term(&self, index: u64) -> Result<u64, StorageError>;

    /// The entry at `index`.
    fn read_log_entry(&self, index: u64) -> Result<RaftLogEntry<C>, StorageError>;

    fn entry_exists(&self, index: u64) -> bool {
        self.append_index().is_some_and(|a| index <= a)
    }

    /// Term of the entry at `index`; the position before the first entry has term 0.
    fn term_at(&self, index: Option<u64>) -> Result<u64, StorageError> {
        match index {
            None => Ok(0),
            Some(i) => self.read_entry_term(i),
        }
    }

    /// Read entries in the inclusive range `[start, end]`.
    fn read_range(&self, start: u64, end: u64) -> Result<Vec<RaftLogEntry<C>>, StorageError> {
        let mut res = Vec::with_capacity(end.saturating_sub(start) as usize + 1);
        for index in start..=end {
            res.push(self.read_log_entry(index)?);
        }
        Ok(res)
    }
}

/// A replicated log that can be mutated by the raft driver.
///
/// Entries are immutable once appended; only a suffix can be removed by [`RaftLog::truncate`],
/// and never below the commit index.
pub trait RaftLog<C: RaftTypeConfig>: ReadableRaftLog<C> {
    /// Append `entry` at `index`, which must be the next index after the append index.
    fn append(&mut self, index: u64, entry: RaftLogEntry<C>) -> Result<(), StorageError>;

    /// Remove every entry at or after `from_index`.
    fn truncate(&mut self, from_index: u64) -> Result<(), StorageError>;

    /// Move the commit index forward to `commit_index`. Moving it backward is a no-op.
    fn commit(&mut self, commit_index: u64) -> Result<(), StorageError>;
}

/// An entry as it is read back from durable storage, together with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct LogAppendRecord<C: RaftTypeConfig> {
    pub index: u64,
    pub entry: RaftLogEntry<C>,
}

/// A forward cursor over the append records of a durable log.
pub trait LogCursor<C: RaftTypeConfig>: Iterator<Item = Result<LogAppendRecord<C>, StorageError>> {}

impl<C, T> LogCursor<C> for T
where
    C: RaftTypeConfig,
    T: Iterator<Item = Result<LogAppendRecord<C>, StorageError>>,
{
}

pub(crate) fn check_append(append_index: Option<u64>, index: u64) -> Result<(), StorageError> {
    let expect = match append_index {
        None => 0,
        Some(a) => a + 1,
    };
    if index != expect {
        return Err(StorageError::NonConsecutive { expect, got: index });
    }
    Ok(())
}

pub(crate) fn check_truncate(commit_index: Option<u64>, from_index: u64) -> Result<(), StorageError> {
    if let Some(committed) = commit_index {
        if from_index <= committed {
            return Err(StorageError::TruncateCommitted {
                from: from_index,
                committed,
            });
        }
    }
    Ok(())
}
