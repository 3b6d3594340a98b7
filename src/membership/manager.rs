use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::MembershipError;
use crate::error::StorageError;
use crate::log::ReadableRaftLog;
use crate::membership::MembershipEvent;
use crate::state::FollowerStates;
use crate::EntryPayload;
use crate::LogIndexOptionExt;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// An admission in progress, tracked by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    started: Instant,

    /// The membership entry making the member a voter has been requested.
    proposed: bool,

    /// Index of that entry, once it is in the log.
    entry_index: Option<u64>,
}

/// Tracks the member sets of one core member.
///
/// Every member adopts the latest membership entry in its log, committed or not, and reverts to
/// the previous one when that entry is truncated. Only the leader admits new members.
pub struct MembershipManager<C: RaftTypeConfig> {
    myself: C::MemberId,

    initial_voters: BTreeSet<C::MemberId>,

    /// Membership entries of the log as `(index, voting members)`, ascending by index.
    history: Vec<(u64, BTreeSet<C::MemberId>)>,

    admissions: BTreeMap<C::MemberId, Admission>,

    catchup_lag_threshold: u64,
    catchup_timeout: Duration,

    tx_events: broadcast::Sender<MembershipEvent<C>>,
}

impl<C: RaftTypeConfig> MembershipManager<C> {
    pub fn new(
        myself: C::MemberId,
        initial_voters: BTreeSet<C::MemberId>,
        catchup_lag_threshold: u64,
        catchup_timeout: Duration,
        tx_events: broadcast::Sender<MembershipEvent<C>>,
    ) -> Self {
        Self {
            myself,
            initial_voters,
            history: Vec::new(),
            admissions: BTreeMap::new(),
            catchup_lag_threshold,
            catchup_timeout,
            tx_events,
        }
    }

    /// Load every membership entry already in `log`, without publishing events.
    pub fn replay<L: ReadableRaftLog<C>>(&mut self, log: &L) -> Result<(), StorageError> {
        let Some(last) = log.append_index() else {
            return Ok(());
        };

        for index in 0..=last {
            if let EntryPayload::Membership(members) = log.read_log_entry(index)?.payload {
                self.history.push((index, members));
            }
        }

        tracing::info!(
            "{} loaded {} membership entries, voting members: {:?}",
            self.myself,
            self.history.len(),
            self.voting_members()
        );
        Ok(())
    }

    pub fn voting_members(&self) -> &BTreeSet<C::MemberId> {
        match self.history.last() {
            Some((_, members)) => members,
            None => &self.initial_voters,
        }
    }

    /// The voting members and every member being admitted.
    pub fn replication_members(&self) -> BTreeSet<C::MemberId> {
        let mut members = self.voting_members().clone();
        members.extend(self.admissions.keys().copied());
        members
    }

    /// Subscribe to membership events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent<C>> {
        self.tx_events.subscribe()
    }

    pub fn is_admitting(&self, member: &C::MemberId) -> bool {
        self.admissions.contains_key(member)
    }

    /// Start admitting `member`: it joins the replication set at once.
    pub fn start_admission(&mut self, member: C::MemberId, now: Instant) -> Result<(), MembershipError<C>> {
        if self.voting_members().contains(&member) {
            return Err(MembershipError::AlreadyMember { member });
        }
        if self.admissions.contains_key(&member) {
            return Err(MembershipError::AdmissionInProgress { member });
        }

        tracing::info!("{} starts admitting {}", self.myself, member);

        self.admissions.insert(member, Admission {
            started: now,
            proposed: false,
            entry_index: None,
        });
        self.publish_members();
        Ok(())
    }

    /// A follower confirmed it holds every entry up to `match_index`.
    ///
    /// Returns the voting set to append as a membership entry when `member` is being admitted
    /// and has caught up. At most one such entry is in flight at a time.
    pub fn on_follower_progress(
        &mut self,
        member: C::MemberId,
        match_index: Option<u64>,
        append_index: Option<u64>,
    ) -> Option<BTreeSet<C::MemberId>> {
        if self.admissions.values().any(|a| a.proposed) {
            return None;
        }
        if !self.admissions.contains_key(&member) {
            return None;
        }

        let lag = append_index.next_index().saturating_sub(match_index.next_index());
        if lag > self.catchup_lag_threshold {
            tracing::debug!(lag, "{} is still catching up", member);
            return None;
        }

        let mut voting = self.voting_members().clone();
        voting.insert(member);

        if let Some(adm) = self.admissions.get_mut(&member) {
            adm.proposed = true;
        }

        tracing::info!(lag, "{} caught up, propose voting members: {:?}", member, voting);
        Some(voting)
    }

    /// An entry was appended to the local log at `index`.
    pub fn on_append(&mut self, index: u64, entry: &RaftLogEntry<C>) {
        let EntryPayload::Membership(members) = &entry.payload else {
            return;
        };

        debug_assert!(self.history.last().map_or(true, |(i, _)| *i < index));
        self.history.push((index, members.clone()));

        for (member, adm) in self.admissions.iter_mut() {
            if adm.entry_index.is_none() && members.contains(member) {
                adm.proposed = true;
                adm.entry_index = Some(index);
            }
        }

        self.publish_members();
    }

    /// Entries at and after `from_index` were removed from the local log.
    pub fn on_truncate(&mut self, from_index: u64) {
        let before = self.history.len();
        self.history.retain(|(i, _)| *i < from_index);

        for adm in self.admissions.values_mut() {
            if adm.entry_index.is_some_and(|i| i >= from_index) {
                adm.proposed = false;
                adm.entry_index = None;
            }
        }

        if self.history.len() != before {
            tracing::info!("{} reverts voting members to {:?}", self.myself, self.voting_members());
            self.publish_members();
        }
    }

    /// The local commit index advanced to `commit_index`.
    pub fn on_commit(&mut self, commit_index: u64) {
        let admitted = self
            .admissions
            .iter()
            .filter(|(_, a)| a.entry_index.is_some_and(|i| i <= commit_index))
            .map(|(m, _)| *m)
            .collect::<Vec<_>>();

        for member in admitted {
            self.admissions.remove(&member);
            tracing::info!("{} admitted {}", self.myself, member);
            self.publish(MembershipEvent::MemberAdmitted { member });
        }
    }

    /// Fail every admission whose member did not catch up within the catch-up timeout.
    ///
    /// Returns whether the replication set changed.
    pub fn check_catchup_timeouts(
        &mut self,
        now: Instant,
        follower_states: &FollowerStates<C>,
        append_index: Option<u64>,
    ) -> bool {
        let expired = self
            .admissions
            .iter()
            .filter(|(_, a)| !a.proposed && now >= a.started + self.catchup_timeout)
            .map(|(m, _)| *m)
            .collect::<Vec<_>>();

        if expired.is_empty() {
            return false;
        }

        for member in expired {
            self.admissions.remove(&member);

            let match_index = follower_states.get(&member).match_index;
            tracing::warn!(?match_index, ?append_index, "{} did not catch up in time", member);

            self.publish(MembershipEvent::AdmissionFailed {
                member,
                error: MembershipError::CatchupTimeout {
                    member,
                    match_index,
                    append_index,
                },
            });
        }

        self.publish_members();
        true
    }

    /// This member is no longer the leader: every admission in progress fails.
    pub fn on_leadership_lost(&mut self) {
        if self.admissions.is_empty() {
            return;
        }

        let members = std::mem::take(&mut self.admissions);
        for member in members.into_keys() {
            tracing::info!("{} lost leadership while admitting {}", self.myself, member);
            self.publish(MembershipEvent::AdmissionFailed {
                member,
                error: MembershipError::LeadershipLost { member },
            });
        }
        self.publish_members();
    }

    fn publish_members(&self) {
        self.publish(MembershipEvent::MembersChanged {
            voting: self.voting_members().clone(),
            replication: self.replication_members(),
        });
    }

    fn publish(&self, event: MembershipEvent<C>) {
        tracing::debug!("publish membership event: {}", event);
        // No subscriber is not an error.
        let _ = self.tx_events.send(event);
    }
}
