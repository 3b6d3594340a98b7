use anyhow::Result;
use coreraft::timer::TimeoutName;
use coreraft::Role;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::fixtures::init_ut_tracing;
use crate::fixtures::Cluster;

const STEPS: usize = 400;

/// Drive a cluster through random interleavings of delivery, loss, duplication, timeouts,
/// partitions and writes. The safety checks run after every step.
///
/// Afterwards the network is healed and a leader is elected; the cluster must then agree on
/// one committed log.
#[test]
fn explore_random_schedules() -> Result<()> {
    init_ut_tracing();

    for seed in [1u64, 7, 42, 1234, 9001] {
        tracing::info!("--- seed {}", seed);
        explore(seed)?;
    }
    Ok(())
}

fn explore(seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut c = Cluster::new(btreeset! {1,2,3,4,5})?;
    let ids = c.ids();
    let mut next_cmd = 0u64;

    for _ in 0..STEPS {
        let id = ids[rng.random_range(0..ids.len())];

        match rng.random_range(0..100) {
            0..=49 => {
                c.deliver_one()?;
            }
            50..=57 => {
                c.drop_one();
            }
            58..=62 => {
                c.duplicate_one();
            }
            63..=67 => c.fire(id, TimeoutName::Election)?,
            68..=77 => c.fire(id, TimeoutName::Heartbeat)?,
            78..=85 => c.fire(id, TimeoutName::ShippingRetry)?,
            86..=95 => {
                if let Some(leader) = c.leader() {
                    c.submit(leader, next_cmd)?;
                    next_cmd += 1;
                }
            }
            96..=97 => {
                let cut = rng.random_range(1..ids.len());
                let (a, b) = ids.split_at(cut);
                c.partition(&[a, b]);
            }
            _ => c.heal(),
        }
    }

    c.heal();
    c.deliver_all()?;

    let leader = stabilize(&mut c)?;
    let index = c.submit(leader, next_cmd)?;

    // A converged cluster may still be probing for the new entry: retry until it commits.
    for _ in 0..100 {
        c.settle()?;
        if c.member(leader).commit_index() >= Some(index) {
            break;
        }
        c.fire(leader, TimeoutName::ShippingRetry)?;
    }

    let commit = c.member(leader).commit_index();
    let commands = c.member(leader).committed_commands();
    assert!(commands.contains(&next_cmd), "seed {}: last write is committed", seed);

    for id in c.ids() {
        assert_eq!(commit, c.member(id).commit_index(), "seed {}: commit of {}", seed, id);
        assert_eq!(commands, c.member(id).committed_commands(), "seed {}: commands of {}", seed, id);
    }
    Ok(())
}

/// Let members campaign in turn until one wins with every member in its term.
fn stabilize(c: &mut Cluster) -> Result<u64> {
    for _ in 0..4 {
        for id in c.ids() {
            c.fire(id, TimeoutName::Election)?;
            c.deliver_all()?;

            let Some(leader) = c.leader() else {
                continue;
            };
            let term = c.member(leader).term();
            let all_follow = c
                .ids()
                .into_iter()
                .all(|x| x == leader || (c.member(x).term() == term && c.member(x).role() == Role::Follower));
            if all_follow {
                return Ok(leader);
            }
        }
    }
    anyhow::bail!("no stable leader")
}
