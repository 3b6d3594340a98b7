//! Majority arithmetic over the voting member set.

use std::collections::BTreeSet;

use crate::state::FollowerStates;
use crate::RaftTypeConfig;

/// The number of members that forms a majority of `n`.
pub fn majority_of(n: usize) -> usize {
    n / 2 + 1
}

/// Whether the members in `granted` that are also voters form a majority of `voters`.
pub fn is_quorum<ID: Ord>(voters: &BTreeSet<ID>, granted: &BTreeSet<ID>) -> bool {
    !voters.is_empty() && voters.intersection(granted).count() >= majority_of(voters.len())
}

/// The highest index replicated to a majority of `voters`.
///
/// The leader counts with its own append index. Voters without progress count as holding nothing.
pub fn quorum_append_index<C: RaftTypeConfig>(
    voters: &BTreeSet<C::MemberId>,
    myself: C::MemberId,
    my_append_index: Option<u64>,
    follower_states: &FollowerStates<C>,
) -> Option<u64> {
    if voters.is_empty() {
        return None;
    }

    let mut matched = voters
        .iter()
        .map(|m| {
            if *m == myself {
                my_append_index
            } else {
                follower_states.get(m).match_index
            }
        })
        .collect::<Vec<_>>();

    // Descending: the value at position `majority - 1` is held by at least `majority` voters.
    matched.sort_unstable_by(|a, b| b.cmp(a));
    matched[majority_of(voters.len()) - 1]
}

#[cfg(test)]
mod tests {
    use maplit::btreeset;

    use super::*;
    use crate::testing::UTConfig;

    #[test]
    fn test_majority_of() {
        assert_eq!(1, majority_of(1));
        assert_eq!(2, majority_of(2));
        assert_eq!(2, majority_of(3));
        assert_eq!(3, majority_of(4));
        assert_eq!(3, majority_of(5));
    }

    #[test]
    fn test_is_quorum() {
        let voters = btreeset! {1,2,3};
        assert!(!is_quorum(&voters, &btreeset! {1}));
        assert!(is_quorum(&voters, &btreeset! {1,3}));
        assert!(!is_quorum(&voters, &btreeset! {1,7,8}), "non-voters do not count");
        assert!(!is_quorum(&BTreeSet::<u64>::new(), &btreeset! {1}));
    }

    #[test]
    fn test_quorum_append_index() {
        let mut fs = FollowerStates::<UTConfig>::new(vec![2, 3, 4, 5], 0);
        let voters = btreeset! {1,2,3,4,5};

        assert_eq!(None, quorum_append_index::<UTConfig>(&voters, 1, Some(9), &fs));

        fs.update_matched(2, Some(9));
        fs.update_matched(3, Some(5));
        assert_eq!(Some(5), quorum_append_index::<UTConfig>(&voters, 1, Some(9), &fs));

        fs.update_matched(4, Some(7));
        assert_eq!(Some(7), quorum_append_index::<UTConfig>(&voters, 1, Some(9), &fs));

        // A caught up non-voter does not move the quorum.
        fs.update_matched(6, Some(9));
        assert_eq!(Some(7), quorum_append_index::<UTConfig>(&voters, 1, Some(9), &fs));

        assert_eq!(Some(3), quorum_append_index::<UTConfig>(&btreeset! {1}, 1, Some(3), &fs));
    }
}
