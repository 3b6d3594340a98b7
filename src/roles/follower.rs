use crate::error::Fatal;
use crate::error::StorageError;
use crate::log::ReadableRaftLog;
use crate::log_index_ext::last_index_after;
use crate::messages::AppendEntriesRequest;
use crate::messages::AppendEntriesResponse;
use crate::messages::Heartbeat;
use crate::messages::RaftMessage;
use crate::messages::VoteRequest;
use crate::messages::VoteResponse;
use crate::outcome::LogCommand;
use crate::outcome::Outcome;
use crate::roles::common::reject_stale_append;
use crate::roles::common::start_election;
use crate::roles::Role;
use crate::state::RaftState;
use crate::LogIndexOptionExt;
use crate::MessageSummary;
use crate::RaftTypeConfig;

pub(crate) fn handle<C, L>(message: RaftMessage<C>, state: &RaftState<C, L>) -> Result<Outcome<C>, Fatal<C>>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let mut outcome = Outcome::new(Role::Follower, state);

    match message {
        RaftMessage::Heartbeat(hb) => handle_heartbeat(&mut outcome, state, hb)?,
        RaftMessage::AppendEntriesRequest(req) => handle_append_entries(&mut outcome, state, req)?,
        RaftMessage::VoteRequest(req) => handle_vote_request(&mut outcome, state, req)?,
        RaftMessage::ElectionTimeout => {
            if state.voting_members().contains(&state.myself()) {
                start_election(&mut outcome, state)?;
            } else {
                tracing::debug!("{} is not a voting member, does not campaign", state.myself());
            }
        }
        m @ (RaftMessage::VoteResponse(_)
        | RaftMessage::AppendEntriesResponse(_)
        | RaftMessage::NewEntryRequest(_)
        | RaftMessage::HeartbeatTimeout) => {
            tracing::debug!("follower ignores {}", m.summary());
        }
    }

    Ok(outcome)
}

/// Accept the leader of `term`, which is not older than ours.
fn follow<C, L>(outcome: &mut Outcome<C>, state: &RaftState<C, L>, term: u64, leader: C::MemberId)
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    if term > outcome.term {
        outcome.adopt_term(term);
    }
    if outcome.leader != Some(leader) {
        tracing::info!(term, "{} follows leader {}", state.myself(), leader);
    }
    outcome.leader = Some(leader);
    outcome.renew_election_timeout = true;
}

fn handle_heartbeat<C, L>(outcome: &mut Outcome<C>, state: &RaftState<C, L>, hb: Heartbeat<C>) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    if hb.leader_term < outcome.term {
        return Ok(());
    }

    follow(outcome, state, hb.leader_term, hb.from);
    outcome.leader_commit = hb.commit_index;

    // Only commit what is known to be the leader's entry: same index, same term.
    let log = state.entry_log();
    if let Some(commit_index) = hb.commit_index {
        if log.commit_index() < Some(commit_index)
            && log.entry_exists(commit_index)
            && log.read_entry_term(commit_index)? == hb.commit_index_term
        {
            outcome.log(LogCommand::Commit { index: commit_index });
        }
    }
    Ok(())
}

fn handle_append_entries<C, L>(
    outcome: &mut Outcome<C>,
    state: &RaftState<C, L>,
    req: AppendEntriesRequest<C>,
) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    if req.leader_term < outcome.term {
        reject_stale_append(outcome, state, req.leader_id);
        return Ok(());
    }

    follow(outcome, state, req.leader_term, req.leader_id);
    outcome.leader_commit = req.leader_commit;

    let log = state.entry_log();

    let prev_matches = match req.prev_log_index {
        None => true,
        Some(prev) => log.entry_exists(prev) && log.read_entry_term(prev)? == req.prev_log_term,
    };

    if !prev_matches {
        // The highest index that can still match the leader.
        let hint = match req.prev_log_index {
            Some(prev) if log.entry_exists(prev) => Some(prev).prev_index(),
            _ => log.append_index(),
        };
        tracing::debug!(prev = ?req.prev_log_index, ?hint, "reject append: prev entry does not match");

        outcome.send(
            req.leader_id,
            RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
                from: state.myself(),
                term: outcome.term,
                success: false,
                match_index: hint,
            }),
        );
        return Ok(());
    }

    let last_new = last_index_after(req.prev_log_index, req.entries.len());

    let mut index = req.prev_log_index.next_index();
    let mut truncated = false;
    for entry in req.entries {
        if !truncated && log.entry_exists(index) {
            if log.read_entry_term(index)? == entry.term {
                index += 1;
                continue;
            }
            tracing::info!(index, "truncate conflicting entries");
            outcome.log(LogCommand::Truncate { from_index: index });
            truncated = true;
        }
        outcome.log(LogCommand::Append { index, entry });
        index += 1;
    }

    if let Some(leader_commit) = req.leader_commit {
        let new_commit = last_new.min(Some(leader_commit));
        if new_commit > log.commit_index() {
            if let Some(c) = new_commit {
                outcome.log(LogCommand::Commit { index: c });
            }
        }
    }

    outcome.send(
        req.leader_id,
        RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
            from: state.myself(),
            term: outcome.term,
            success: true,
            match_index: last_new,
        }),
    );
    Ok(())
}

fn handle_vote_request<C, L>(
    outcome: &mut Outcome<C>,
    state: &RaftState<C, L>,
    req: VoteRequest<C>,
) -> Result<(), StorageError>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    if req.term > outcome.term {
        outcome.adopt_term(req.term);
    }

    let granted = if req.term < outcome.term {
        false
    } else {
        let log = state.entry_log();
        let my_last = (log.term_at(log.append_index())?, log.append_index());
        let candidate_last = (req.last_log_term, req.last_log_index);

        let log_ok = candidate_last >= my_last;
        let not_voted_for_other = outcome.voted_for.is_none() || outcome.voted_for == Some(req.candidate_id);
        log_ok && not_voted_for_other
    };

    if granted {
        outcome.voted_for = Some(req.candidate_id);
        outcome.renew_election_timeout = true;
    }

    tracing::debug!(term = outcome.term, granted, "{} votes for {}", state.myself(), req.candidate_id);

    outcome.send(
        req.candidate_id,
        RaftMessage::VoteResponse(VoteResponse {
            from: state.myself(),
            term: outcome.term,
            vote_granted: granted,
        }),
    );
    Ok(())
}
