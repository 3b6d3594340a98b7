use std::fmt::Debug;

use crate::MemberId;

/// A trait defining application specific data: the opaque command replicated by the log.
///
/// The consensus core never interprets a command. It only stores it, ships it to followers and
/// hands it back in commit order. `PartialEq` is required so that log matching can be verified in
/// tests and diagnostics.
///
/// The trait is automatically implemented for all types which satisfy its supertraits.
pub trait AppData:
    Clone + Debug + PartialEq + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static
{
}

impl<T> AppData for T where T: Clone + Debug + PartialEq + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static
{}

/// Configuration of types used by a raft group.
///
/// Define one with [`declare_raft_types!`](crate::declare_raft_types):
///
/// ```
/// coreraft::declare_raft_types!(
///     pub KvConfig: D = String, MemberId = u64
/// );
/// ```
pub trait RaftTypeConfig:
    Sized + Send + Sync + Debug + Clone + Copy + Default + Eq + PartialEq + Ord + PartialOrd + 'static
{
    /// Application command replicated through the log.
    type D: AppData;

    /// Identity of a core member.
    type MemberId: MemberId;
}

/// Define a type that implements [`RaftTypeConfig`].
#[macro_export]
macro_rules! declare_raft_types {
    ( $(#[$outer:meta])* $visibility:vis $id:ident: $($(#[$inner:meta])* $type_id:ident = $type:ty),+ $(,)? ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
        $visibility struct $id {}

        impl $crate::RaftTypeConfig for $id {
            $(
                $(#[$inner])*
                type $type_id = $type;
            )+
        }
    };
}
