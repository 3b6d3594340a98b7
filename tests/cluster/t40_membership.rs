use anyhow::Result;
use coreraft::error::MembershipError;
use coreraft::timer::TimeoutName;
use coreraft::Config;
use coreraft::MembershipEvent;
use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::fixtures::Cluster;

/// A new member receives the log first and becomes a voter once it caught up.
///
/// - 1 leads {1,2,3} with 5 committed entries.
/// - 4 starts with an empty log and is admitted by 1.
/// - Once 4 is within `catchup_lag_threshold` entries, a membership entry makes it a voter.
/// - 4 can then be elected with 2 and 3.
#[test]
fn admit_member_after_catch_up() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;
    c.elect(1)?;
    for cmd in 0..5 {
        c.submit(1, cmd)?;
    }
    c.settle()?;

    c.add_member(4, btreeset! {1,2,3})?;
    let mut rx_events = c.member(1).core.membership_events();

    tracing::info!("--- start admitting 4");
    c.member_mut(1).core.add_member(4)?;
    assert_eq!(&btreeset! {1,2,3}, c.member(1).core.state().voting_members());
    assert_eq!(&btreeset! {1,2,3,4}, c.member(1).core.state().replication_members());

    c.settle()?;

    for id in c.ids() {
        let m = c.member(id);
        assert_eq!(&btreeset! {1,2,3,4}, m.core.state().voting_members(), "member {}", id);
        assert_eq!(Some(5), m.commit_index(), "member {}", id);
    }
    assert_eq!((0..5u64).collect::<Vec<_>>(), c.member(4).committed_commands());

    let mut admitted = false;
    while let Ok(ev) = rx_events.try_recv() {
        if ev == (MembershipEvent::MemberAdmitted { member: 4 }) {
            admitted = true;
        }
    }
    assert!(admitted);

    tracing::info!("--- 4 votes: it can be elected without 1");
    c.partition(&[&[1], &[2, 3, 4]]);
    c.elect(4)?;
    c.submit(4, 100)?;
    c.settle()?;
    assert_eq!(Some(6), c.member(2).commit_index());
    Ok(())
}

/// Admission is only started by the leader, for a member that is not a voter yet.
#[test]
fn admission_is_rejected() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;
    c.elect(1)?;

    assert_eq!(
        Err(MembershipError::NotLeader { leader: Some(1) }),
        c.member_mut(2).core.add_member(4)
    );
    assert_eq!(
        Err(MembershipError::AlreadyMember { member: 2 }),
        c.member_mut(1).core.add_member(2)
    );
    Ok(())
}

/// A member that never catches up is dropped when the catch-up timeout expires.
#[test]
fn admission_times_out() -> Result<()> {
    let config = Config {
        catchup_timeout: 0,
        ..Default::default()
    };
    let mut c = Cluster::with_config(btreeset! {1,2,3}, config)?;
    c.elect(1)?;
    c.submit(1, 10)?;
    c.settle()?;

    let mut rx_events = c.member(1).core.membership_events();

    // Member 5 does not exist: nothing reaches it.
    c.member_mut(1).core.add_member(5)?;
    assert_eq!(btreeset! {2,3,5}, c.member(1).core.shipping().targets());

    c.fire(1, TimeoutName::Heartbeat)?;

    assert_eq!(&btreeset! {1,2,3}, c.member(1).core.state().replication_members());
    assert_eq!(btreeset! {2,3}, c.member(1).core.shipping().targets());

    let mut failed = None;
    while let Ok(ev) = rx_events.try_recv() {
        if let MembershipEvent::AdmissionFailed { member, error } = ev {
            failed = Some((member, error));
        }
    }
    assert_eq!(
        Some((5, MembershipError::CatchupTimeout {
            member: 5,
            match_index: None,
            append_index: Some(0),
        })),
        failed
    );
    Ok(())
}
