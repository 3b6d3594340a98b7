#[path = "../fixtures/mod.rs"]
mod fixtures;

mod t10_election;
mod t20_replication;
mod t30_partition;
mod t40_membership;
mod t50_explore;
mod t60_instance;
