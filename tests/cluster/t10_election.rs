use anyhow::Result;
use coreraft::timer::TimeoutName;
use coreraft::Role;
use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::fixtures::Cluster;

/// A candidate with a majority of votes leads, and every other member follows it.
#[test]
fn elect_leader() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;

    c.elect(1)?;

    for id in [2, 3] {
        let m = c.member(id);
        assert_eq!(Role::Follower, m.role());
        assert_eq!(1, m.term());
        assert_eq!(Some(1), m.core.state().leader());
        assert_eq!(Some(1), m.core.state().voted_for());
    }
    Ok(())
}

/// Two members campaign in the same term: only one of them can win it.
#[test]
fn competing_candidates() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;

    c.fire(1, TimeoutName::Election)?;
    c.fire(2, TimeoutName::Election)?;
    c.deliver_all()?;

    let leaders = c.ids().into_iter().filter(|id| c.member(*id).role() == Role::Leader).collect::<Vec<_>>();
    assert_eq!(1, leaders.len(), "exactly one leader of term 1: {:?}", leaders);
    assert_eq!(1, c.member(leaders[0]).term());
    Ok(())
}

/// A member missing committed entries does not get the votes it needs.
#[test]
fn stale_log_loses_election() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;

    c.elect(1)?;
    c.submit(1, 10)?;
    c.settle()?;

    tracing::info!("--- 3 misses entry 11");
    c.partition(&[&[1, 2], &[3]]);
    c.submit(1, 11)?;
    c.settle()?;
    assert_eq!(Some(1), c.member(1).commit_index());
    c.heal();

    tracing::info!("--- 3 campaigns with a stale log");
    c.fire(3, TimeoutName::Election)?;
    c.deliver_all()?;

    assert_eq!(Role::Candidate, c.member(3).role());
    assert_eq!(None, c.leader(), "1 stepped down for the newer term");

    tracing::info!("--- 2 campaigns with an up-to-date log");
    c.elect(2)?;
    c.submit(2, 12)?;
    c.settle()?;

    for id in c.ids() {
        assert_eq!(vec![10, 11, 12], c.member(id).committed_commands(), "member {}", id);
    }
    Ok(())
}

/// A member that is not a voter never campaigns.
#[test]
fn non_voter_does_not_campaign() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;
    c.add_member(4, btreeset! {1,2,3})?;

    c.fire(4, TimeoutName::Election)?;

    assert_eq!(Role::Follower, c.member(4).role());
    assert_eq!(0, c.member(4).term());
    assert_eq!(0, c.in_flight_len());
    Ok(())
}
