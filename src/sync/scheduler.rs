//! Timed background pushes
//!
//! The first tick waits a random jitter so many installations started at the
//! same moment do not push in lockstep. A tick that finds an operation in
//! progress is dropped, never queued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::engine::SyncOutcome;
use crate::config::ScheduleConfig;

/// Upper bound (exclusive) of the startup jitter
pub const MAX_JITTER: Duration = Duration::from_secs(60);

/// What the scheduler drives
#[async_trait]
pub trait ScheduledPush: Send + Sync {
    fn is_busy(&self) -> bool;

    async fn push_scheduled(&self) -> SyncOutcome;
}

/// Handle to a running schedule
pub struct Scheduler {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Start from config. Returns `None` when scheduling is disabled.
    pub fn start<T>(target: Arc<T>, config: &ScheduleConfig) -> Option<Self>
    where
        T: ScheduledPush + 'static,
    {
        if !config.enabled {
            tracing::debug!("Scheduled sync disabled");
            return None;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..MAX_JITTER.as_millis() as u64);
        Some(Self::start_with(
            target,
            config.interval(),
            Duration::from_millis(jitter_ms),
        ))
    }

    /// Start with an explicit period and initial delay
    pub fn start_with(target: Arc<dyn ScheduledPush>, period: Duration, jitter: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        tracing::info!(
            "Scheduler starting: interval={}min, jitter={}ms",
            period.as_secs() / 60,
            jitter.as_millis()
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + jitter, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }

                if target.is_busy() {
                    tracing::info!("Scheduled sync skipped: operation in progress");
                    continue;
                }

                tracing::info!("Scheduled sync triggered");
                match target.push_scheduled().await {
                    SyncOutcome::Failed { category, message, .. } => {
                        tracing::warn!("Scheduled sync failed: {} - {}", category, message);
                    }
                    outcome => tracing::debug!("Scheduled sync finished: {:?}", outcome),
                }
            }

            tracing::info!("Scheduler stopped");
        });

        Self { stop, handle }
    }

    /// Prevent further ticks. A push already running is allowed to finish.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the background task to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}
