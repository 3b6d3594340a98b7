/// This helper trait extracts information from an `Option<u64>` log index.
///
/// `None` stands for "before the first entry": the append index of an empty log.
pub trait LogIndexOptionExt {
    /// Return the next log index.
    ///
    /// If self is `None`, it returns 0.
    fn next_index(&self) -> u64;

    /// Return the previous log index.
    ///
    /// `Some(0)` and `None` both return `None`.
    fn prev_index(&self) -> Self;
}

impl LogIndexOptionExt for Option<u64> {
    fn next_index(&self) -> u64 {
        match self {
            None => 0,
            Some(v) => v + 1,
        }
    }

    fn prev_index(&self) -> Self {
        match self {
            None => None,
            Some(0) => None,
            Some(v) => Some(*v - 1),
        }
    }
}

/// Build the index of the last of `n` entries that follow `prev`.
///
/// Returns `prev` itself if `n` is 0.
pub(crate) fn last_index_after(prev: Option<u64>, n: usize) -> Option<u64> {
    if n == 0 {
        prev
    } else {
        Some(prev.next_index() + n as u64 - 1)
    }
}
