use std::collections::BTreeSet;

use crate::error::Fatal;
use crate::error::StorageError;
use crate::error::Violation;
use crate::log::ReadableRaftLog;
use crate::messages::AppendEntriesResponse;
use crate::messages::NewEntryRequest;
use crate::messages::RaftMessage;
use crate::messages::VoteResponse;
use crate::outcome::LogCommand;
use crate::outcome::Outcome;
use crate::outcome::ShipCommand;
use crate::quorum::quorum_append_index;
use crate::roles::common::reject_stale_append;
use crate::roles::common::send_heartbeats;
use crate::roles::common::step_down_and_redeliver;
use crate::roles::Role;
use crate::state::RaftState;
use crate::EntryPayload;
use crate::LogIndexOptionExt;
use crate::MessageSummary;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

pub(crate) fn handle<C, L>(message: RaftMessage<C>, state: &RaftState<C, L>) -> Result<Outcome<C>, Fatal<C>>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let mut outcome = Outcome::new(Role::Leader, state);

    match message {
        RaftMessage::Heartbeat(ref hb) => {
            if hb.leader_term >= outcome.term {
                let term = hb.leader_term;
                step_down_and_redeliver(&mut outcome, state, term, message);
            }
        }

        RaftMessage::HeartbeatTimeout => {
            send_heartbeats(&mut outcome, state)?;
        }

        RaftMessage::AppendEntriesRequest(ref req) => {
            if req.leader_term < outcome.term {
                reject_stale_append(&mut outcome, state, req.leader_id);
            } else if req.leader_term == outcome.term {
                tracing::error!(term = outcome.term, "{} sees another leader {}", state.myself(), req.leader_id);
                return Err(Violation::TwoLeadersInSameTerm {
                    term: outcome.term,
                    other: req.leader_id,
                }
                .into());
            } else {
                let term = req.leader_term;
                step_down_and_redeliver(&mut outcome, state, term, message);
            }
        }

        RaftMessage::AppendEntriesResponse(res) => {
            handle_append_entries_response(&mut outcome, state, res)?;
        }

        RaftMessage::VoteRequest(ref req) => {
            if req.term > outcome.term {
                let term = req.term;
                step_down_and_redeliver(&mut outcome, state, term, message);
            } else {
                outcome.send(
                    req.candidate_id,
                    RaftMessage::VoteResponse(VoteResponse {
                        from: state.myself(),
                        term: outcome.term,
                        vote_granted: false,
                    }),
                );
            }
        }

        RaftMessage::NewEntryRequest(req) => {
            handle_new_entry(&mut outcome, state, req)?;
        }

        m @ (RaftMessage::VoteResponse(_) | RaftMessage::ElectionTimeout) => {
            tracing::debug!("leader ignores {}", m.summary());
        }
    }

    Ok(outcome)
}

/// Term of the entry at `index` in the leader's log.
///
/// Entries after the last index of the previous leadership were written in the current term.
fn entry_term<C, L>(outcome: &Outcome<C>, state: &RaftState<C, L>, index: Option<u64>) -> Result<u64, StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    if index.is_some() && index > outcome.last_log_index_before_we_became_leader {
        Ok(outcome.term)
    } else {
        state.entry_log().term_at(index)
    }
}

/// Advance the commit index to what a majority of voters holds, if that entry is of the current
/// term. Entries of earlier terms are committed only as a prefix of such an entry.
fn try_commit<C, L>(
    outcome: &mut Outcome<C>,
    state: &RaftState<C, L>,
    voters: &BTreeSet<C::MemberId>,
    append_index: Option<u64>,
) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let quorum_index = quorum_append_index(
        voters,
        state.myself(),
        append_index,
        &outcome.follower_states,
    );

    let Some(index) = quorum_index else {
        return Ok(());
    };

    if quorum_index <= state.entry_log().commit_index() {
        return Ok(());
    }

    if entry_term(outcome, state, quorum_index)? != outcome.term {
        tracing::debug!(index, "majority holds an entry of an earlier term, do not commit it");
        return Ok(());
    }

    tracing::debug!(index, "commit");
    outcome.leader_commit = quorum_index;
    outcome.log(LogCommand::Commit { index });
    outcome.ship(ShipCommand::CommitUpdate);
    Ok(())
}

fn handle_append_entries_response<C, L>(
    outcome: &mut Outcome<C>,
    state: &RaftState<C, L>,
    res: AppendEntriesResponse<C>,
) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    if res.term < outcome.term {
        return Ok(());
    }

    if res.term > outcome.term {
        tracing::info!(term = res.term, "{} sees a newer term, steps down", state.myself());
        outcome.adopt_term(res.term);
        outcome.step_down();
        return Ok(());
    }

    let append_index = state.entry_log().append_index();

    if !res.success {
        outcome.follower_states.update_mismatch(res.from, res.match_index);
        outcome.ship(ShipCommand::Mismatch {
            last_remote_append_index: res.match_index,
            target: res.from,
        });
        return Ok(());
    }

    debug_assert!(
        res.match_index <= append_index,
        "follower matched {:?} beyond leader append index {:?}",
        res.match_index,
        append_index
    );
    let match_index = res.match_index.min(append_index);

    let progressed = outcome.follower_states.update_matched(res.from, match_index);
    outcome.ship(ShipCommand::Match {
        index: match_index,
        target: res.from,
    });

    if progressed && entry_term(outcome, state, match_index)? == outcome.term {
        try_commit(outcome, state, state.voting_members(), append_index)?;
    }
    Ok(())
}

fn handle_new_entry<C, L>(outcome: &mut Outcome<C>, state: &RaftState<C, L>, req: NewEntryRequest<C>) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let prev_index = state.entry_log().append_index();
    let prev_term = entry_term(outcome, state, prev_index)?;
    let index = prev_index.next_index();

    // A membership entry takes effect once appended: it is committed by the voters it names.
    let new_voters = match &req.content {
        EntryPayload::Membership(members) => Some(members.clone()),
        EntryPayload::Normal(_) => None,
    };

    let entry = RaftLogEntry::new(outcome.term, req.content);

    outcome.log(LogCommand::Append {
        index,
        entry: entry.clone(),
    });
    outcome.ship(ShipCommand::NewEntry {
        prev_index,
        prev_term,
        entry,
    });

    let voters = new_voters.as_ref().unwrap_or(state.voting_members());
    try_commit(outcome, state, voters, Some(index))
}
