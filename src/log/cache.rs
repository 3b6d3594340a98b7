use std::num::NonZeroUsize;

use lru::LruCache;

use crate::error::StorageError;
use crate::log::LogCursor;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// A bounded least-recently-used cache of log entries, keyed by index.
///
/// On a miss the cache consumes a forward cursor over the durable log, keeping every record it
/// passes, and stops at the wanted index.
pub struct LogEntryCache<C: RaftTypeConfig> {
    entries: LruCache<u64, RaftLogEntry<C>>,
}

impl<C: RaftTypeConfig> LogEntryCache<C> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Return the entry at `index`, reading `cursor` forward on a miss.
    ///
    /// `cursor` must start at or before `index`. A cursor that ends before `index` yields
    /// [`StorageError::CursorExhausted`]; a cursor that skips over `index` yields
    /// [`StorageError::ScanOvershoot`]. In both cases retry with a fresh cursor.
    pub fn get<Cur>(&mut self, cursor: Cur, index: u64) -> Result<RaftLogEntry<C>, StorageError>
    where Cur: LogCursor<C> {
        if let Some(entry) = self.entries.get(&index) {
            return Ok(entry.clone());
        }

        for record in cursor {
            let record = record?;

            if record.index > index {
                tracing::error!(index, reached = record.index, "log cursor overshot the wanted index");
                return Err(StorageError::ScanOvershoot {
                    index,
                    reached: record.index,
                });
            }

            let found = record.index == index;
            self.entries.put(record.index, record.entry.clone());

            if found {
                return Ok(record.entry);
            }
        }

        Err(StorageError::CursorExhausted { index })
    }

    /// Peek without touching the recency order or reading durable storage.
    pub fn peek(&self, index: u64) -> Option<&RaftLogEntry<C>> {
        self.entries.peek(&index)
    }

    pub fn put(&mut self, index: u64, entry: RaftLogEntry<C>) {
        self.entries.put(index, entry);
    }

    /// Forget every cached entry at or after `from_index`.
    pub fn invalidate_from(&mut self, from_index: u64) {
        let stale = self.entries.iter().map(|(i, _)| *i).filter(|i| *i >= from_index).collect::<Vec<_>>();
        for i in stale {
            self.entries.pop(&i);
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
