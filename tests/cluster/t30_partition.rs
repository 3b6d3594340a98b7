use anyhow::Result;
use coreraft::timer::TimeoutName;
use coreraft::Role;
use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::fixtures::Cluster;

/// A leader cut off from the majority cannot commit. The majority elects a new leader, and once
/// the partition heals the old leader's uncommitted entry is replaced.
///
/// - 1 leads {1..5} and commits 10.
/// - {1,2} is cut off from {3,4,5}; 1 appends 11, which only 2 receives.
/// - 3 is elected by {3,4,5} and commits 12.
/// - After healing, every member holds 10, 12.
#[test]
fn minority_leader_is_replaced() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3,4,5})?;

    c.elect(1)?;
    c.submit(1, 10)?;
    c.settle()?;

    c.partition(&[&[1, 2], &[3, 4, 5]]);

    tracing::info!("--- the old leader cannot commit");
    c.submit(1, 11)?;
    c.deliver_all()?;
    assert_eq!(2, c.member(2).entries().len());
    assert_eq!(Some(0), c.member(1).commit_index());

    tracing::info!("--- the majority elects 3");
    c.elect(3)?;
    assert_eq!(2, c.member(3).term());
    assert_eq!(Role::Leader, c.member(1).role(), "1 does not know yet");

    c.submit(3, 12)?;
    c.settle()?;
    assert_eq!(Some(1), c.member(3).commit_index());

    tracing::info!("--- heal");
    c.heal();
    c.settle()?;

    assert_eq!(Role::Follower, c.member(1).role());
    assert_eq!(Some(3), c.member(1).core.state().leader());

    for id in c.ids() {
        let m = c.member(id);
        assert_eq!(c.member(3).entries(), m.entries(), "member {}", id);
        assert_eq!(vec![10, 12], m.committed_commands(), "member {}", id);
    }
    Ok(())
}

/// A follower cut off alone keeps campaigning in ever higher terms. When it comes back, the
/// leader steps down for its term, and a member with an up-to-date log is elected.
#[test]
fn isolated_follower_rejoins() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;

    c.elect(1)?;
    c.submit(1, 10)?;
    c.settle()?;

    c.partition(&[&[1, 2], &[3]]);
    for _ in 0..3 {
        c.fire(3, TimeoutName::Election)?;
        c.deliver_all()?;
    }
    assert_eq!(4, c.member(3).term());
    c.submit(1, 11)?;
    c.settle()?;

    c.heal();
    c.fire(3, TimeoutName::Election)?;
    c.deliver_all()?;
    assert_eq!(None, c.leader(), "3 has a stale log and cannot win");

    c.elect(1)?;
    c.submit(1, 12)?;
    c.settle()?;

    for id in c.ids() {
        assert_eq!(vec![10, 11, 12], c.member(id).committed_commands(), "member {}", id);
    }
    Ok(())
}
