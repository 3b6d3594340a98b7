use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use coreraft::error::ClientWriteError;
use coreraft::error::ForwardToLeader;
use coreraft::CommittedEntry;
use coreraft::Config;
use coreraft::RaftInstance;
use coreraft::RaftInstanceBuilder;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use crate::fixtures::init_ut_tracing;
use crate::fixtures::Router;
use crate::fixtures::TestConfig;

fn instance_config() -> Config {
    Config {
        election_timeout: 300,
        election_timeout_jitter: 300,
        heartbeat_interval: 30,
        leader_wait_timeout: 5_000,
        catchup_timeout: 5_000,
        ..Default::default()
    }
}

fn start(
    router: &Router,
    id: u64,
    voters: BTreeSet<u64>,
) -> Result<(RaftInstance<TestConfig>, mpsc::UnboundedReceiver<CommittedEntry<TestConfig>>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let port = router.port(id);
    let raft = RaftInstanceBuilder::<TestConfig>::new(id, voters)
        .config(instance_config())
        .inbound(port.clone())
        .outbound(port)
        .commit_sink(tx)
        .build()?;
    Ok((raft, rx))
}

async fn recv_commands(rx: &mut mpsc::UnboundedReceiver<CommittedEntry<TestConfig>>, n: usize) -> Result<Vec<u64>> {
    let mut got = vec![];
    while got.len() < n {
        let e = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await?;
        let Some(e) = e else {
            anyhow::bail!("commit stream closed");
        };
        assert_eq!(got.len() as u64, e.index);
        got.push(e.command);
    }
    Ok(got)
}

/// Three members on real timers elect a leader, replicate writes and admit a fourth member.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn instances_elect_replicate_and_admit() -> Result<()> {
    init_ut_tracing();

    let router = Router::default();
    let mut rafts = BTreeMap::new();
    let mut sinks = BTreeMap::new();

    for id in [1, 2, 3] {
        let (raft, rx) = start(&router, id, btreeset! {1,2,3})?;
        rafts.insert(id, raft);
        sinks.insert(id, rx);
    }

    tracing::info!("--- wait for a leader");
    let leader = rafts[&1].leader().await?;
    for raft in rafts.values() {
        raft.wait(Some(Duration::from_secs(5))).current_leader(leader, "same leader").await?;
    }

    tracing::info!("--- write through the leader {}", leader);
    for cmd in [100, 101, 102] {
        rafts[&leader].submit(cmd).await?;
    }
    for (id, rx) in sinks.iter_mut() {
        assert_eq!(vec![100, 101, 102], recv_commands(rx, 3).await?, "member {}", id);
    }

    tracing::info!("--- a follower redirects");
    let follower = *rafts.keys().find(|id| **id != leader).unwrap();
    assert_eq!(
        Err(ClientWriteError::ForwardToLeader(ForwardToLeader { leader_id: leader })),
        rafts[&follower].submit(1).await
    );

    tracing::info!("--- admit member 4");
    let (raft4, mut rx4) = start(&router, 4, btreeset! {1,2,3})?;
    rafts[&leader].add_member(4).await?;
    rafts.insert(4, raft4);

    for raft in rafts.values() {
        raft.wait(Some(Duration::from_secs(5))).voting_members(btreeset! {1,2,3,4}, "4 is a voter").await?;
    }
    assert_eq!(vec![100, 101, 102], recv_commands(&mut rx4, 3).await?);

    tracing::info!("--- shutdown");
    for raft in rafts.values() {
        raft.shutdown().await;
    }
    Ok(())
}
