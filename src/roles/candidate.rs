use crate::error::Fatal;
use crate::log::ReadableRaftLog;
use crate::messages::RaftMessage;
use crate::messages::VoteResponse;
use crate::outcome::Outcome;
use crate::quorum::is_quorum;
use crate::roles::common::become_leader;
use crate::roles::common::reject_stale_append;
use crate::roles::common::start_election;
use crate::roles::common::step_down_and_redeliver;
use crate::roles::Role;
use crate::state::RaftState;
use crate::MessageSummary;
use crate::RaftTypeConfig;

pub(crate) fn handle<C, L>(message: RaftMessage<C>, state: &RaftState<C, L>) -> Result<Outcome<C>, Fatal<C>>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    let mut outcome = Outcome::new(Role::Candidate, state);

    match message {
        RaftMessage::Heartbeat(ref hb) => {
            if hb.leader_term >= outcome.term {
                let term = hb.leader_term;
                step_down_and_redeliver(&mut outcome, state, term, message);
            }
        }

        RaftMessage::AppendEntriesRequest(ref req) => {
            if req.leader_term < outcome.term {
                reject_stale_append(&mut outcome, state, req.leader_id);
            } else {
                let term = req.leader_term;
                step_down_and_redeliver(&mut outcome, state, term, message);
            }
        }

        RaftMessage::VoteRequest(ref req) => {
            if req.term > outcome.term {
                let term = req.term;
                step_down_and_redeliver(&mut outcome, state, term, message);
            } else {
                // This candidate voted for itself in its term.
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

        RaftMessage::VoteResponse(res) => {
            if res.term > outcome.term {
                outcome.adopt_term(res.term);
                outcome.step_down();
            } else if res.term == outcome.term && res.vote_granted {
                outcome.votes_for_me.insert(res.from);

                if is_quorum(state.voting_members(), &outcome.votes_for_me) {
                    become_leader(&mut outcome, state)?;
                }
            }
        }

        RaftMessage::ElectionTimeout => {
            start_election(&mut outcome, state)?;
        }

        m @ (RaftMessage::AppendEntriesResponse(_) | RaftMessage::NewEntryRequest(_) | RaftMessage::HeartbeatTimeout) => {
            tracing::debug!("candidate ignores {}", m.summary());
        }
    }

    Ok(outcome)
}
