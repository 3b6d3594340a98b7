//! The replicated log: traits, an in-memory log, a journal file backed log and the read-through
//! entry cache that sits in front of durable reads.

mod cache;
mod file_log;
mod in_memory;
mod raft_log;


pub use cache::LogEntryCache;
pub use file_log::FileLogCursor;
pub use file_log::FileRaftLog;
pub use in_memory::InMemoryRaftLog;
pub use raft_log::LogAppendRecord;
pub use raft_log::LogCursor;
pub use raft_log::RaftLog;
pub use raft_log::ReadableRaftLog;
