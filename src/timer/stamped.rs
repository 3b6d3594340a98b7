use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::timer::RenewableTimeout;
use crate::timer::TimeoutName;
use crate::timer::TimeoutService;

/// A timeout whose firings carry the generation it was armed in.
///
/// Every `renew()` and `cancel()` starts a new generation. A firing that was already on its way
/// when the timeout was renewed carries an older generation, and [`StampedTimeout::is_current`]
/// tells the receiver to drop it.
pub struct StampedTimeout {
    timeout: Box<dyn RenewableTimeout>,
    generation: Arc<AtomicU64>,
}

impl StampedTimeout {
    /// Create an armed timeout on `service` that calls `notify(name, generation)` when it fires.
    pub fn create(
        service: &dyn TimeoutService,
        name: TimeoutName,
        timeout: Duration,
        jitter: Duration,
        notify: impl Fn(TimeoutName, u64) + Send + Sync + 'static,
    ) -> Self {
        let generation = Arc::new(AtomicU64::new(0));

        let g = generation.clone();
        let timeout = service.create(
            name,
            timeout,
            jitter,
            Arc::new(move |name: TimeoutName| notify(name, g.load(Ordering::Acquire))),
        );

        Self { timeout, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a firing stamped with `generation` belongs to the current arming.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }
}

impl RenewableTimeout for StampedTimeout {
    fn renew(&self) {
        self.timeout.renew();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn cancel(&self) {
        self.timeout.cancel();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
