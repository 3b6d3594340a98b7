use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::Instrument;
use tracing::Level;
use tracing::Span;

use crate::timer::RenewableTimeout;
use crate::timer::TimeoutHandler;
use crate::timer::TimeoutName;
use crate::timer::TimeoutService;

/// A [`TimeoutService`] that polls a deadline-ordered set of pending timeouts at a fixed tick.
///
/// Every tick fires the timeouts whose deadline has passed, in deadline order, and stops at the
/// first one still in the future. The pending set is the only synchronization point between the
/// polling task and callers renewing or cancelling timeouts. Handlers run on the polling task,
/// outside of the lock, so a handler may renew its own timeout.
pub struct ScheduledTimeoutService {
    inner: Arc<Inner>,
    tick: Duration,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    state: Mutex<TimeoutState>,
}

#[derive(Default)]
struct TimeoutState {
    next_id: u64,

    /// Armed timeouts, ordered by `(deadline, id)`.
    pending: BTreeSet<(Instant, u64)>,

    timeouts: HashMap<u64, ScheduledEntry>,
}

struct ScheduledEntry {
    name: TimeoutName,
    timeout: Duration,
    jitter: Duration,
    deadline: Option<Instant>,
    handler: TimeoutHandler,
}

impl ScheduledEntry {
    fn next_deadline(&self, now: Instant) -> Instant {
        let jitter_us = self.jitter.as_micros() as u64;
        let jitter = if jitter_us == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::rng().random_range(0..jitter_us))
        };
        now + self.timeout + jitter
    }
}

impl TimeoutState {
    fn arm(&mut self, id: u64, now: Instant) -> Option<Instant> {
        let entry = self.timeouts.get_mut(&id)?;
        if let Some(prev) = entry.deadline.take() {
            self.pending.remove(&(prev, id));
        }
        let deadline = entry.next_deadline(now);
        entry.deadline = Some(deadline);
        self.pending.insert((deadline, id));
        Some(deadline)
    }

    fn disarm(&mut self, id: u64) {
        if let Some(entry) = self.timeouts.get_mut(&id) {
            if let Some(prev) = entry.deadline.take() {
                self.pending.remove(&(prev, id));
            }
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, TimeoutState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fire_due(&self, now: Instant) -> usize {
        let due = {
            let mut st = self.state();

            let mut due = Vec::new();
            while let Some(&(deadline, id)) = st.pending.first() {
                if deadline > now {
                    break;
                }
                st.pending.pop_first();
                if let Some(entry) = st.timeouts.get_mut(&id) {
                    entry.deadline = None;
                    due.push((entry.name, entry.handler.clone()));
                }
            }
            due
        };

        let n = due.len();
        for (name, handler) in due {
            tracing::debug!(%name, "timeout fired");
            handler(name);
        }
        n
    }
}

impl ScheduledTimeoutService {
    pub fn new(tick: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TimeoutState::default()),
            }),
            tick,
            join_handle: Mutex::new(None),
        }
    }

    /// Fire every armed timeout whose deadline is at or before `now`; returns how many fired.
    pub fn tick(&self, now: Instant) -> usize {
        self.inner.fire_due(now)
    }

    /// The earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.state().pending.first().map(|(deadline, _)| *deadline)
    }

    pub fn pending(&self) -> usize {
        self.inner.state().pending.len()
    }

    async fn poll_loop(inner: Weak<Inner>, tick: Duration) {
        loop {
            sleep_until(Instant::now() + tick).await;

            let Some(inner) = inner.upgrade() else {
                tracing::debug!("timeout service dropped, quit polling");
                return;
            };
            inner.fire_due(Instant::now());
        }
    }
}

impl TimeoutService for ScheduledTimeoutService {
    fn create(
        &self,
        name: TimeoutName,
        timeout: Duration,
        jitter: Duration,
        handler: TimeoutHandler,
    ) -> Box<dyn RenewableTimeout> {
        let mut st = self.inner.state();

        let id = st.next_id;
        st.next_id += 1;
        st.timeouts.insert(id, ScheduledEntry {
            name,
            timeout,
            jitter,
            deadline: None,
            handler,
        });
        st.arm(id, Instant::now());

        Box::new(ScheduledTimeout {
            id,
            inner: Arc::downgrade(&self.inner),
        })
    }

    fn start(&self) {
        let mut jh = match self.join_handle.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if jh.is_some() {
            return;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            tracing::error!("no tokio runtime, the timeout service can not be started");
            return;
        }

        let fu = Self::poll_loop(Arc::downgrade(&self.inner), self.tick);
        *jh = Some(tokio::spawn(
            fu.instrument(tracing::span!(parent: &Span::current(), Level::DEBUG, "timeout-service")),
        ));
    }

    fn shutdown(&self) {
        let jh = match self.join_handle.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(jh) = jh {
            jh.abort();
        }
    }
}

impl Drop for ScheduledTimeoutService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to a timeout of a [`ScheduledTimeoutService`].
pub struct ScheduledTimeout {
    id: u64,
    inner: Weak<Inner>,
}

impl ScheduledTimeout {
    fn with_state(&self, f: impl FnOnce(&mut TimeoutState)) {
        if let Some(inner) = self.inner.upgrade() {
            f(&mut inner.state());
        }
    }
}

impl RenewableTimeout for ScheduledTimeout {
    fn renew(&self) {
        self.with_state(|st| {
            st.arm(self.id, Instant::now());
        });
    }

    fn cancel(&self) {
        self.with_state(|st| st.disarm(self.id));
    }
}

impl Drop for ScheduledTimeout {
    fn drop(&mut self) {
        self.with_state(|st| {
            st.disarm(self.id);
            st.timeouts.remove(&self.id);
        });
    }
}
