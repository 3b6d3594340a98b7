use anyhow::Result;
use coreraft::error::ClientWriteError;
use coreraft::error::ForwardToLeader;
use coreraft::messages::RaftMessage;
use coreraft::timer::TimeoutName;
use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::fixtures::Cluster;

/// Commands submitted to the leader are committed everywhere, in order.
#[test]
fn replicate_and_commit() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;
    c.elect(1)?;

    for (i, cmd) in [10, 11, 12].into_iter().enumerate() {
        assert_eq!(i as u64, c.submit(1, cmd)?);
    }
    c.settle()?;

    for id in c.ids() {
        assert_eq!(vec![10, 11, 12], c.member(id).committed_commands(), "member {}", id);
        assert_eq!(Some(2), c.member(id).commit_index());
    }
    Ok(())
}

/// A follower redirects commands to the leader it knows of.
#[test]
fn follower_redirects_to_leader() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;

    assert_eq!(Err(ClientWriteError::NoLeader), c.submit(2, 1));

    c.elect(1)?;
    assert_eq!(
        Err(ClientWriteError::ForwardToLeader(ForwardToLeader { leader_id: 1 })),
        c.submit(2, 1)
    );
    Ok(())
}

/// A follower that missed many entries catches up in batches of `max_payload_entries`.
#[test]
fn lagging_follower_catches_up_in_batches() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;
    c.elect(1)?;

    c.partition(&[&[1, 2], &[3]]);
    for cmd in 0..7 {
        c.submit(1, cmd)?;
    }
    c.settle()?;
    assert_eq!(None, c.member(3).commit_index());
    c.heal();

    c.fire(1, TimeoutName::ShippingRetry)?;

    loop {
        for env in c.in_flight() {
            if let RaftMessage::AppendEntriesRequest(req) = &env.message {
                assert!(req.entries.len() <= 2, "batch of {}", req.entries.len());
            }
        }
        if !c.deliver_one()? {
            break;
        }
    }
    c.settle()?;

    assert_eq!(c.member(1).entries(), c.member(3).entries());
    assert_eq!((0..7u64).collect::<Vec<_>>(), c.member(3).committed_commands());
    Ok(())
}

/// Lost and duplicated messages only delay replication.
#[test]
fn lost_and_duplicated_messages() -> Result<()> {
    let mut c = Cluster::new(btreeset! {1,2,3})?;
    c.elect(1)?;

    c.submit(1, 10)?;
    // Lose the new entry on its way to 2, deliver it twice to 3.
    c.drop_one();
    c.duplicate_one();
    c.deliver_all()?;

    c.submit(1, 11)?;
    c.settle()?;

    for id in c.ids() {
        assert_eq!(vec![10, 11], c.member(id).committed_commands(), "member {}", id);
    }
    Ok(())
}
