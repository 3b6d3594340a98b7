use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ErrorSubject;
use crate::error::ErrorVerb;
use crate::error::StorageError;
use crate::store::TermStore;
use crate::store::VoteStore;
use crate::MemberId;

/// A value kept in a single JSON file, replaced atomically by write-then-rename.
#[derive(Debug)]
struct DurableValue<T> {
    path: PathBuf,
    subject: ErrorSubject,
    value: T,
}

impl<T> DurableValue<T>
where T: Serialize + DeserializeOwned + Default
{
    fn open(path: PathBuf, subject: ErrorSubject) -> Result<Self, StorageError> {
        let value = match fs::read(&path) {
            Ok(buf) => serde_json::from_slice(&buf)
                .map_err(|e| StorageError::from_json_error(subject, ErrorVerb::Read, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => return Err(StorageError::from_io_error(subject, ErrorVerb::Read, e)),
        };
        Ok(Self { path, subject, value })
    }

    fn store(&mut self, value: T) -> Result<(), StorageError> {
        let subject = self.subject;
        let write_err = |e| StorageError::from_io_error(subject, ErrorVerb::Write, e);

        let buf = serde_json::to_vec(&value).map_err(|e| StorageError::from_json_error(subject, ErrorVerb::Write, e))?;

        let tmp = self.tmp_path();
        let mut f = fs::File::create(&tmp).map_err(write_err)?;
        f.write_all(&buf).map_err(write_err)?;
        f.sync_all().map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        // The rename is durable only once the directory entry is.
        sync_parent_dir(&self.path).map_err(write_err)?;

        self.value = value;
        Ok(())
    }

    /// `raft.term` is written through `raft.term.tmp`: values sharing a stem never share a
    /// scratch file.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// A [`TermStore`] backed by a file.
#[derive(Debug)]
pub struct FileTermStore {
    inner: DurableValue<u64>,
}

impl FileTermStore {
    /// Open the term file at `path`; a missing file means term 0.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Ok(Self {
            inner: DurableValue::open(path.as_ref().to_path_buf(), ErrorSubject::Term)?,
        })
    }
}

impl TermStore for FileTermStore {
    fn current_term(&self) -> u64 {
        self.inner.value
    }

    fn update(&mut self, term: u64) -> Result<(), StorageError> {
        self.inner.store(term)
    }
}

/// A [`VoteStore`] backed by a file.
#[derive(Debug)]
pub struct FileVoteStore<MID: MemberId> {
    inner: DurableValue<Option<MID>>,
}

impl<MID: MemberId> FileVoteStore<MID> {
    /// Open the vote file at `path`; a missing file means no vote.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Ok(Self {
            inner: DurableValue::open(path.as_ref().to_path_buf(), ErrorSubject::Vote)?,
        })
    }
}

impl<MID: MemberId> VoteStore<MID> for FileVoteStore<MID> {
    fn voted_for(&self) -> Option<MID> {
        self.inner.value
    }

    fn update(&mut self, voted_for: Option<MID>) -> Result<(), StorageError> {
        self.inner.store(voted_for)
    }
}
