use std::fmt::Debug;
use std::fmt::Display;
use std::hash::Hash;

/// Essential trait bound for a member id, except serde.
#[doc(hidden)]
pub trait MemberIdEssential:
    Sized + Send + Sync + Eq + PartialEq + Ord + PartialOrd + Debug + Display + Hash + Copy + Clone + Default + 'static
{
}

impl<T> MemberIdEssential for T where T: Sized
        + Send
        + Sync
        + Eq
        + PartialEq
        + Ord
        + PartialOrd
        + Debug
        + Display
        + Hash
        + Copy
        + Clone
        + Default
        + 'static
{
}

/// Identity of a core member.
///
/// The consensus core only compares, orders and hashes member ids. It never looks into their
/// structure: mapping an id to a network address is the job of the transport.
pub trait MemberId: MemberIdEssential + serde::Serialize + for<'a> serde::Deserialize<'a> {}

impl<T> MemberId for T where T: MemberIdEssential + serde::Serialize + for<'a> serde::Deserialize<'a> {}
