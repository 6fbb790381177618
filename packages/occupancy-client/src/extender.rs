//! Periodic extension of subscription-area expiry
//!
//! The scheduler runs while any connection is registered. Each tick extends
//! every distinct area in a registry snapshot, one at a time, then re-arms;
//! an empty snapshot stops it until the next subscribe.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::OccupancyResult;
use crate::registry::SubscriptionRegistry;
use crate::timer::{TimerHandle, TimerService};

/// Extends the expiry of one subscription area
#[async_trait]
pub trait AreaExtender: Send + Sync {
    async fn extend_area(&self, area_id: i64) -> OccupancyResult<()>;
}

#[derive(Debug)]
enum SchedulerState {
    Stopped,
    Running(TimerHandle),
}

struct SchedulerInner {
    interval: Duration,
    registry: SubscriptionRegistry,
    timers: TimerService,
    extender: Arc<dyn AreaExtender>,
    state: Mutex<SchedulerState>,
}

/// Process-wide repeating extension timer
#[derive(Clone)]
pub struct ExtensionScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for ExtensionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionScheduler")
            .field("interval", &self.inner.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ExtensionScheduler {
    pub fn new(
        interval: Duration,
        registry: SubscriptionRegistry,
        timers: TimerService,
        extender: Arc<dyn AreaExtender>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                interval,
                registry,
                timers,
                extender,
                state: Mutex::new(SchedulerState::Stopped),
            }),
        }
    }

    /// Start ticking unless already running; returns whether it started
    ///
    /// Call after registering the connection the tick should see.
    pub fn ensure_started(&self) -> bool {
        let mut state = self.inner.lock_state();
        if matches!(*state, SchedulerState::Running(_)) {
            return false;
        }
        *state = SchedulerState::Running(SchedulerInner::arm(&self.inner));
        info!(interval_secs = self.inner.interval.as_secs(), "Subscription extender started");
        true
    }

    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        if let SchedulerState::Running(timer) = &*state {
            timer.cancel();
            info!("Subscription extender stopped");
        }
        *state = SchedulerState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.lock_state(), SchedulerState::Running(_))
    }

    /// Run one tick immediately
    pub async fn tick(&self) {
        SchedulerInner::tick(&self.inner).await;
    }
}

impl SchedulerInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn arm(this: &Arc<Self>) -> TimerHandle {
        let inner = Arc::clone(this);
        this.timers.schedule(this.interval, move |_| async move {
            SchedulerInner::tick(&inner).await;
        })
    }

    async fn tick(this: &Arc<Self>) {
        // Snapshot and the stop decision share the lock with ensure_started
        let area_ids = {
            let mut state = this.lock_state();
            if matches!(*state, SchedulerState::Stopped) {
                return;
            }
            let area_ids = this.registry.list_active_area_ids();
            if area_ids.is_empty() {
                *state = SchedulerState::Stopped;
                info!("No active subscription, canceled extender");
                return;
            }
            // Connections sharing an area need one extension between them
            let mut seen = HashSet::new();
            area_ids
                .into_iter()
                .filter(|area_id| seen.insert(*area_id))
                .collect::<Vec<_>>()
        };

        debug!(count = area_ids.len(), "Extending active subscription areas");
        for area_id in area_ids {
            if let Err(e) = this.extender.extend_area(area_id).await {
                warn!(area_id, error = %e, "Failed to extend subscription area");
            }
        }

        let mut state = this.lock_state();
        if let SchedulerState::Running(previous) = &*state {
            previous.cancel();
            *state = SchedulerState::Running(Self::arm(this));
        }
    }
}
