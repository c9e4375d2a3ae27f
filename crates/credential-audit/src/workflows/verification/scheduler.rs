use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::domain::ApplicationId;

/// Something the scheduler can poll and reconcile.
///
/// `poll` performs the remote reads and must not touch local state; `apply` merges a poll
/// result and is only invoked while the poll's generation is still current.
#[async_trait]
pub trait SyncTarget: Send + Sync + 'static {
    type Poll: Send + 'static;

    async fn poll(&self, application_id: ApplicationId) -> Self::Poll;

    fn apply(&self, application_id: ApplicationId, poll: Self::Poll);
}

/// Lifecycle of a [`SyncScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("sync interval must be greater than zero")]
    InvalidInterval,
    #[error("scheduler has been shut down")]
    Stopped,
}

/// A poll result that finished after the scheduler moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("poll issued at generation {issued} discarded; scheduler is at generation {current}")]
pub(crate) struct StaleReadError {
    issued: u64,
    current: u64,
}

#[derive(Debug)]
struct SchedulerShared {
    generation: AtomicU64,
    phase: Mutex<SyncPhase>,
    applied: AtomicU64,
    discarded: AtomicU64,
}

impl SchedulerShared {
    fn check(&self, issued: u64) -> Result<(), StaleReadError> {
        let current = self.generation.load(Ordering::Acquire);
        if current == issued {
            Ok(())
        } else {
            Err(StaleReadError { issued, current })
        }
    }

    fn phase(&self) -> MutexGuard<'_, SyncPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Worker {
    cancel: watch::Sender<bool>,
    _handle: JoinHandle<()>,
}

/// Periodic, cancellable reconciliation of one application against the remote.
///
/// Stopping cancels the timer immediately. A poll already in flight is allowed to finish, but
/// its result is dropped because the generation it was issued under is no longer current.
pub struct SyncScheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<Worker>>,
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                generation: AtomicU64::new(0),
                phase: Mutex::new(SyncPhase::Idle),
                applied: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.shared.phase()
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Polls whose results were merged.
    pub fn polls_applied(&self) -> u64 {
        self.shared.applied.load(Ordering::Acquire)
    }

    /// Polls that completed after cancellation and were thrown away.
    pub fn polls_discarded(&self) -> u64 {
        self.shared.discarded.load(Ordering::Acquire)
    }

    /// Begin polling `application_id` every `interval`, replacing any running schedule.
    ///
    /// The first poll is issued immediately. Must be called from within a Tokio runtime.
    pub fn start<T>(
        &self,
        target: Arc<T>,
        application_id: ApplicationId,
        interval: Duration,
    ) -> Result<(), SchedulerError>
    where
        T: SyncTarget,
    {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }
        // Held from cancellation through install: overlapping starts each retire the
        // previous schedule under a fresh generation.
        let mut worker = self.lock_worker();
        if self.phase() == SyncPhase::Stopped {
            return Err(SchedulerError::Stopped);
        }
        self.cancel(&mut worker);

        let generation = self.shared.generation.load(Ordering::Acquire);
        let (cancel, cancelled) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_polls(
            shared,
            target,
            application_id,
            interval,
            generation,
            cancelled,
        ));
        *worker = Some(Worker {
            cancel,
            _handle: handle,
        });
        *self.shared.phase() = SyncPhase::Polling;

        info!(
            %application_id,
            interval_ms = interval.as_millis() as u64,
            generation,
            "sync polling started"
        );
        Ok(())
    }

    /// Cancel the timer. Synchronous and idempotent.
    pub fn stop(&self) {
        let mut worker = self.lock_worker();
        self.cancel(&mut worker);
    }

    /// Stop permanently; later `start` calls are rejected.
    pub fn shutdown(&self) {
        let mut worker = self.lock_worker();
        self.cancel(&mut worker);
        *self.shared.phase() = SyncPhase::Stopped;
    }

    fn cancel(&self, worker: &mut Option<Worker>) {
        let Some(worker) = worker.take() else {
            return;
        };

        let generation = {
            let mut phase = self.shared.phase();
            if *phase == SyncPhase::Polling {
                *phase = SyncPhase::Idle;
            }
            self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1
        };
        let _ = worker.cancel.send(true);
        debug!(generation, "sync polling stopped");
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_polls<T>(
    shared: Arc<SchedulerShared>,
    target: Arc<T>,
    application_id: ApplicationId,
    interval: Duration,
    generation: u64,
    mut cancelled: watch::Receiver<bool>,
) where
    T: SyncTarget,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancelled.changed() => break,
            _ = ticker.tick() => {}
        }
        if *cancelled.borrow() {
            break;
        }

        let poll = target.poll(application_id).await;

        // Generation bumps happen under the phase lock, so holding it makes check-then-apply atomic.
        let applied = {
            let _phase = shared.phase();
            match shared.check(generation) {
                Ok(()) => {
                    target.apply(application_id, poll);
                    Ok(())
                }
                Err(stale) => Err(stale),
            }
        };

        match applied {
            Ok(()) => {
                shared.applied.fetch_add(1, Ordering::AcqRel);
            }
            Err(stale) => {
                shared.discarded.fetch_add(1, Ordering::AcqRel);
                debug!(%application_id, error = %stale, "discarding stale poll response");
                break;
            }
        }
    }
}
