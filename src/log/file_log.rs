use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::error::ErrorSubject;
use crate::error::ErrorVerb;
use crate::error::StorageError;
use crate::log::raft_log::check_append;
use crate::log::raft_log::check_truncate;
use crate::log::LogAppendRecord;
use crate::log::LogEntryCache;
use crate::log::RaftLog;
use crate::log::ReadableRaftLog;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// How many entries before a missed index a read starts, so the neighbours land in the cache.
const READ_BEHIND: u64 = 8;

/// One line of the journal.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
enum LogRecord<C: RaftTypeConfig> {
    Append { index: u64, entry: RaftLogEntry<C> },
    Truncate { from: u64 },
    Commit { index: u64 },
}

/// A durable log kept as an append-only journal of JSON lines.
///
/// Appends, truncations and commits are all journal records, synced before the call returns. On
/// open the journal is replayed to rebuild the byte offset of every live append record and the
/// commit index. Entries themselves are read back through a [`LogEntryCache`] over a
/// [`FileLogCursor`]. A miss starts the cursor a few entries early and caches what it passes.
pub struct FileRaftLog<C: RaftTypeConfig> {
    path: PathBuf,
    file: File,
    /// Byte offset of the live append record of every index.
    offsets: Vec<u64>,
    len: u64,
    commit_index: Option<u64>,
    cache: Mutex<LogEntryCache<C>>,
}

impl<C: RaftTypeConfig> FileRaftLog<C> {
    /// Open the journal at `path`, creating it if absent.
    ///
    /// A last line without its newline, left by a crash in the middle of a write, is discarded,
    /// even if the record on it is complete.
    pub fn open(path: impl AsRef<Path>, cache_size: NonZeroUsize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |e| StorageError::from_io_error(ErrorSubject::Log, ErrorVerb::Open, e);

        let file = OpenOptions::new().create(true).read(true).append(true).open(&path).map_err(open_err)?;

        let mut offsets = Vec::new();
        let mut commit_index = None;
        let mut len = 0u64;

        let mut reader = BufReader::new(file.try_clone().map_err(open_err)?);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).map_err(open_err)? as u64;
            if n == 0 {
                break;
            }

            // A record is complete only with its newline: the next append starts a new line.
            if !line.ends_with('\n') {
                tracing::warn!(offset = len, bytes = n, "discard torn record at the end of the raft log");
                file.set_len(len).map_err(open_err)?;
                break;
            }

            let record = serde_json::from_str::<LogRecord<C>>(line.trim_end())
                .map_err(|e| StorageError::from_json_error(ErrorSubject::Log, ErrorVerb::Open, e))?;

            match record {
                LogRecord::Append { index, .. } => {
                    offsets.truncate(index as usize);
                    offsets.push(len);
                }
                LogRecord::Truncate { from } => {
                    offsets.truncate(from as usize);
                }
                LogRecord::Commit { index } => {
                    commit_index = commit_index.max(Some(index));
                }
            }
            len += n;
        }

        tracing::info!(path = %path.display(), entries = offsets.len(), ?commit_index, "opened raft log");

        Ok(Self {
            path,
            file,
            offsets,
            len,
            commit_index,
            cache: Mutex::new(LogEntryCache::new(cache_size)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A cursor over live append records, starting at `index`.
    pub fn cursor_from(&self, index: u64) -> FileLogCursor<'_, C> {
        FileLogCursor {
            path: &self.path,
            offsets: &self.offsets,
            start: index,
            reader: None,
            pos: 0,
            _p: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, index: u64) -> bool {
        self.cache().peek(index).is_some()
    }

    fn cache(&self) -> MutexGuard<'_, LogEntryCache<C>> {
        match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_record(&mut self, record: &LogRecord<C>) -> Result<(), StorageError> {
        let write_err = |e| StorageError::from_io_error(ErrorSubject::Log, ErrorVerb::Write, e);

        let mut line = serde_json::to_string(record)
            .map_err(|e| StorageError::from_json_error(ErrorSubject::Log, ErrorVerb::Write, e))?;
        line.push('\n');

        self.file.write_all(line.as_bytes()).map_err(write_err)?;
        self.file.sync_data().map_err(write_err)?;
        self.len += line.len() as u64;
        Ok(())
    }

    fn out_of_range(&self, index: u64) -> StorageError {
        StorageError::OutOfRange {
            index,
            append_index: self.append_index(),
        }
    }
}

impl<C: RaftTypeConfig> ReadableRaftLog<C> for FileRaftLog<C> {
    fn append_index(&self) -> Option<u64> {
        (self.offsets.len() as u64).checked_sub(1)
    }

    fn commit_index(&self) -> Option<u64> {
        self.commit_index
    }

    fn read_entry_term(&self, index: u64) -> Result<u64, StorageError> {
        self.read_log_entry(index).map(|e| e.term)
    }

    fn read_log_entry(&self, index: u64) -> Result<RaftLogEntry<C>, StorageError> {
        if !self.entry_exists(index) {
            return Err(self.out_of_range(index));
        }

        let mut cache = self.cache();
        let behind = READ_BEHIND.min(cache.capacity() as u64 - 1);
        cache.get(self.cursor_from(index.saturating_sub(behind)), index)
    }
}

impl<C: RaftTypeConfig> RaftLog<C> for FileRaftLog<C> {
    fn append(&mut self, index: u64, entry: RaftLogEntry<C>) -> Result<(), StorageError> {
        check_append(self.append_index(), index)?;

        let offset = self.len;
        let record = LogRecord::Append { index, entry };
        self.write_record(&record)?;
        self.offsets.push(offset);

        if let LogRecord::Append { index, entry } = record {
            self.cache().put(index, entry);
        }
        Ok(())
    }

    fn truncate(&mut self, from_index: u64) -> Result<(), StorageError> {
        check_truncate(self.commit_index, from_index)?;
        if from_index as usize >= self.offsets.len() {
            return Ok(());
        }

        self.write_record(&LogRecord::Truncate { from: from_index })?;
        self.offsets.truncate(from_index as usize);
        self.cache().invalidate_from(from_index);
        Ok(())
    }

    fn commit(&mut self, commit_index: u64) -> Result<(), StorageError> {
        if !self.entry_exists(commit_index) {
            return Err(self.out_of_range(commit_index));
        }
        if self.commit_index >= Some(commit_index) {
            return Ok(());
        }

        self.write_record(&LogRecord::Commit { index: commit_index })?;
        self.commit_index = Some(commit_index);
        Ok(())
    }
}

/// Reads the live append records of a [`FileRaftLog`] journal in index order.
///
/// Records superseded by a later truncation are skipped. The journal file is opened on the first
/// call to `next()`.
pub struct FileLogCursor<'a, C: RaftTypeConfig> {
    path: &'a Path,
    offsets: &'a [u64],
    start: u64,
    reader: Option<BufReader<File>>,
    pos: u64,
    _p: PhantomData<C>,
}

impl<C: RaftTypeConfig> FileLogCursor<'_, C> {
    fn read_err(e: std::io::Error) -> StorageError {
        StorageError::from_io_error(ErrorSubject::Log, ErrorVerb::Read, e)
    }

    fn open(&mut self) -> Result<Option<()>, StorageError> {
        let Some(offset) = self.offsets.get(self.start as usize) else {
            return Ok(None);
        };

        let mut file = File::open(self.path).map_err(Self::read_err)?;
        file.seek(SeekFrom::Start(*offset)).map_err(Self::read_err)?;
        self.reader = Some(BufReader::new(file));
        self.pos = *offset;
        Ok(Some(()))
    }

    fn next_record(&mut self) -> Result<Option<LogAppendRecord<C>>, StorageError> {
        if self.reader.is_none() && self.open()?.is_none() {
            return Ok(None);
        }

        let mut line = String::new();
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            line.clear();
            let n = reader.read_line(&mut line).map_err(Self::read_err)? as u64;
            if n == 0 {
                return Ok(None);
            }
            let record_pos = self.pos;
            self.pos += n;

            let record = serde_json::from_str::<LogRecord<C>>(line.trim_end()).map_err(|e| {
                StorageError::from_json_error(ErrorSubject::LogEntry(self.start), ErrorVerb::Read, e)
            })?;

            if let LogRecord::Append { index, entry } = record {
                if self.offsets.get(index as usize) == Some(&record_pos) {
                    return Ok(Some(LogAppendRecord { index, entry }));
                }
            }
        }
    }
}

impl<C: RaftTypeConfig> Iterator for FileLogCursor<'_, C> {
    type Item = Result<LogAppendRecord<C>, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
