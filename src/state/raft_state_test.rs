use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::error::StorageError;
use crate::log::InMemoryRaftLog;
use crate::log::ReadableRaftLog;
use crate::outcome::LogCommand;
use crate::roles::Role;
use crate::testing::ent;
use crate::testing::ents;
use crate::testing::StateBuilder;

#[test]
fn test_update_takes_over_outcome() -> anyhow::Result<()> {
    let mut state = StateBuilder::new(1, btreeset! {1,2,3}).term(2).log(ents(&[1, 2]), Some(0)).build();

    let outcome = Role::Follower.handle(crate::messages::RaftMessage::ElectionTimeout, &state)?;
    state.update(&outcome);

    assert_eq!(Role::Candidate, state.role());
    assert_eq!(3, state.term());
    assert_eq!(Some(1), state.voted_for());
    assert_eq!(&btreeset! {1}, state.votes_for_me());
    assert_eq!(Some(1), state.entry_log().append_index(), "log is untouched by update");
    Ok(())
}

#[test]
fn test_apply_log_commands() -> anyhow::Result<()> {
    let mut state = StateBuilder::new(1, btreeset! {1,2,3}).log(ents(&[1, 1, 1]), Some(0)).build();

    state.apply_log_command(&LogCommand::Truncate { from_index: 2 })?;
    state.apply_log_command(&LogCommand::Append {
        index: 2,
        entry: ent(2, 20),
    })?;
    state.apply_log_command(&LogCommand::Commit { index: 2 })?;

    assert_eq!(Some(2), state.entry_log().commit_index());
    assert_eq!(ent(2, 20), state.entry_log().read_log_entry(2)?);

    let res = state.apply_log_command(&LogCommand::Truncate { from_index: 1 });
    assert_eq!(
        Err(StorageError::TruncateCommitted {
            from: 1,
            committed: 2
        }),
        res
    );

    let res = state.apply_log_command(&LogCommand::Append {
        index: 5,
        entry: ent(2, 50),
    });
    assert_eq!(Err(StorageError::NonConsecutive { expect: 3, got: 5 }), res);
    Ok(())
}

#[test]
fn test_clone_state_is_independent() -> anyhow::Result<()> {
    let state = StateBuilder::new(1, btreeset! {1,2,3}).term(4).log(ents(&[1, 2, 4]), Some(1)).leading(Some(1)).build();

    let mut cloned = state.clone_state()?;
    assert_eq!(state, cloned);

    cloned.apply_log_command(&LogCommand::Append {
        index: 3,
        entry: ent(4, 3),
    })?;

    assert_eq!(Some(3), cloned.entry_log().append_index());
    assert_eq!(Some(2), state.entry_log().append_index());
    assert_eq!(state.entry_log(), &InMemoryRaftLog::from_parts(ents(&[1, 2, 4]), Some(1)));
    Ok(())
}

#[test]
fn test_replication_targets_exclude_myself() {
    let state = StateBuilder::new(2, btreeset! {1,2,3}).replication_members(btreeset! {1,2,3,4}).build();

    assert_eq!(vec![1, 3, 4], state.replication_targets().collect::<Vec<_>>());
}
