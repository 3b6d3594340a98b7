use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;
use std::time::Duration;

use crate::timer::RenewableTimeout;
use crate::timer::TimeoutHandler;
use crate::timer::TimeoutName;
use crate::timer::TimeoutService;

/// A [`TimeoutService`] whose timeouts only fire when told to.
///
/// Durations and jitter are ignored. Used to drive a raft group step by step.
#[derive(Clone, Default)]
pub struct ControlledTimeoutService {
    inner: Arc<Mutex<ControlledState>>,
}

#[derive(Default)]
struct ControlledState {
    next_id: u64,
    timeouts: BTreeMap<u64, ControlledEntry>,
}

struct ControlledEntry {
    name: TimeoutName,
    armed: bool,
    renewals: u64,
    handler: TimeoutHandler,
}

fn lock(m: &Mutex<ControlledState>) -> MutexGuard<'_, ControlledState> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ControlledTimeoutService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every armed timeout named `name`, as if its deadline passed; returns how many fired.
    pub fn invoke(&self, name: TimeoutName) -> usize {
        let handlers = {
            let mut st = lock(&self.inner);
            st.timeouts
                .values_mut()
                .filter(|e| e.name == name && e.armed)
                .map(|e| {
                    e.armed = false;
                    e.handler.clone()
                })
                .collect::<Vec<_>>()
        };

        for h in handlers.iter() {
            h(name);
        }
        handlers.len()
    }

    pub fn is_armed(&self, name: TimeoutName) -> bool {
        lock(&self.inner).timeouts.values().any(|e| e.name == name && e.armed)
    }

    /// Total number of `renew()` calls on timeouts named `name`.
    pub fn renewals(&self, name: TimeoutName) -> u64 {
        lock(&self.inner).timeouts.values().filter(|e| e.name == name).map(|e| e.renewals).sum()
    }
}

impl TimeoutService for ControlledTimeoutService {
    fn create(
        &self,
        name: TimeoutName,
        _timeout: Duration,
        _jitter: Duration,
        handler: TimeoutHandler,
    ) -> Box<dyn RenewableTimeout> {
        let mut st = lock(&self.inner);
        let id = st.next_id;
        st.next_id += 1;
        st.timeouts.insert(id, ControlledEntry {
            name,
            armed: true,
            renewals: 0,
            handler,
        });

        Box::new(ControlledTimeout {
            id,
            inner: Arc::downgrade(&self.inner),
        })
    }
}

struct ControlledTimeout {
    id: u64,
    inner: Weak<Mutex<ControlledState>>,
}

impl ControlledTimeout {
    fn with_entry(&self, f: impl FnOnce(&mut ControlledEntry)) {
        if let Some(inner) = self.inner.upgrade() {
            if let Some(e) = lock(&inner).timeouts.get_mut(&self.id) {
                f(e);
            }
        }
    }
}

impl RenewableTimeout for ControlledTimeout {
    fn renew(&self) {
        self.with_entry(|e| {
            e.armed = true;
            e.renewals += 1;
        });
    }

    fn cancel(&self) {
        self.with_entry(|e| e.armed = false);
    }
}

impl Drop for ControlledTimeout {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner).timeouts.remove(&self.id);
        }
    }
}
