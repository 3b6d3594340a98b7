//! Transitions shared by more than one role.

use crate::error::StorageError;
use crate::log::ReadableRaftLog;
use crate::messages::AppendEntriesResponse;
use crate::messages::Heartbeat;
use crate::messages::RaftMessage;
use crate::messages::VoteRequest;
use crate::outcome::Outcome;
use crate::quorum::is_quorum;
use crate::roles::Role;
use crate::state::FollowerStates;
use crate::state::RaftState;
use crate::LogIndexOptionExt;
use crate::RaftTypeConfig;

/// Start a new election: move to the next term as a candidate that votes for itself.
///
/// A lone voter wins at once.
pub(crate) fn start_election<C, L>(outcome: &mut Outcome<C>, state: &RaftState<C, L>) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let myself = state.myself();
    let log = state.entry_log();

    outcome.next_role = Role::Candidate;
    outcome.term += 1;
    outcome.voted_for = Some(myself);
    outcome.leader = None;
    outcome.votes_for_me.clear();
    outcome.votes_for_me.insert(myself);
    outcome.follower_states = FollowerStates::default();
    outcome.renew_election_timeout = true;

    tracing::info!(term = outcome.term, "{} starts election", myself);

    let last_log_index = log.append_index();
    let last_log_term = log.term_at(last_log_index)?;

    for member in state.voting_members().iter().filter(|m| **m != myself) {
        outcome.send(
            *member,
            RaftMessage::VoteRequest(VoteRequest {
                term: outcome.term,
                candidate_id: myself,
                last_log_index,
                last_log_term,
            }),
        );
    }

    if is_quorum(state.voting_members(), &outcome.votes_for_me) {
        become_leader(outcome, state)?;
    }
    Ok(())
}

/// Take leadership in `outcome.term` and announce it with heartbeats.
pub(crate) fn become_leader<C, L>(outcome: &mut Outcome<C>, state: &RaftState<C, L>) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let last = state.entry_log().append_index();

    outcome.next_role = Role::Leader;
    outcome.leader = Some(state.myself());
    outcome.votes_for_me.clear();
    outcome.last_log_index_before_we_became_leader = last;
    outcome.follower_states = FollowerStates::new(state.replication_targets(), last.next_index());

    tracing::info!(term = outcome.term, ?last, "{} becomes leader", state.myself());

    send_heartbeats(outcome, state)
}

pub(crate) fn send_heartbeats<C, L>(outcome: &mut Outcome<C>, state: &RaftState<C, L>) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let log = state.entry_log();
    let commit_index = log.commit_index();
    let commit_index_term = log.term_at(commit_index)?;

    for target in state.replication_targets() {
        outcome.send(
            target,
            RaftMessage::Heartbeat(Heartbeat {
                from: state.myself(),
                leader_term: outcome.term,
                commit_index,
                commit_index_term,
            }),
        );
    }
    Ok(())
}

/// Reject an append from a stale leader, telling it the current term.
pub(crate) fn reject_stale_append<C, L>(outcome: &mut Outcome<C>, state: &RaftState<C, L>, leader: C::MemberId)
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    outcome.send(
        leader,
        RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
            from: state.myself(),
            term: outcome.term,
            success: false,
            match_index: state.entry_log().append_index(),
        }),
    );
}

/// Stop being candidate or leader because of `message`, and hand the message to the follower
/// this member becomes.
pub(crate) fn step_down_and_redeliver<C, L>(
    outcome: &mut Outcome<C>,
    state: &RaftState<C, L>,
    term: u64,
    message: RaftMessage<C>,
) where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    if term > outcome.term {
        outcome.adopt_term(term);
    }
    outcome.step_down();
    outcome.send(state.myself(), message);
}
