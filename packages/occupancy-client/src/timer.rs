//! One-shot timers backed by tokio tasks
//!
//! Every timer runs on its own task and listens on a child of the service's
//! root [`CancellationToken`], so [`TimerService::shutdown`] stops all of them.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Identifies one scheduled timer
pub type TimerId = u64;

/// Cancelable handle to a scheduled callback
///
/// Cloning shares the same underlying timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: TimerId,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancel the timer; a no-op once it has fired or been canceled
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Schedules callbacks after a delay
#[derive(Debug, Clone)]
pub struct TimerService {
    root: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Run `callback` after `delay` unless canceled first
    ///
    /// The callback receives the timer's id so it can tell a stale fire from
    /// the current one.
    pub fn schedule<F, Fut>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce(TimerId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let task_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    trace!(timer_id = id, "Timer canceled");
                }
                _ = tokio::time::sleep(delay) => {
                    // A cancel racing the deadline wins if it lands first
                    if !task_token.is_cancelled() {
                        trace!(timer_id = id, "Timer fired");
                        callback(id).await;
                    }
                }
            }
        });

        TimerHandle { id, token }
    }

    /// Cancel every outstanding timer; later schedules fire canceled
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}
