//! Retention sweeper.
//!
//! The wide-column deployment this mirrors expires rows with native TTLs;
//! SQLite has none, so a background task periodically deletes rows whose
//! `expires_at` has passed and counters whose hour bucket has aged out of
//! the raw retention window.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tidemark_domain::{hour_bucket, RetentionConfig};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::{
    SqliteCounterRepository, SqliteDailyAggregateRepository, SqliteHourlyAggregateRepository,
    SqliteRawEventRepository,
};

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepOutcome {
    pub raw_purged: usize,
    pub hourly_purged: usize,
    pub daily_purged: usize,
    pub counters_purged: usize,
}

/// Periodic retention enforcement over all metric tables.
pub struct RetentionSweeper {
    raw: Arc<SqliteRawEventRepository>,
    hourly: Arc<SqliteHourlyAggregateRepository>,
    daily: Arc<SqliteDailyAggregateRepository>,
    counters: Arc<SqliteCounterRepository>,
    config: RetentionConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
}

impl RetentionSweeper {
    pub fn new(
        raw: Arc<SqliteRawEventRepository>,
        hourly: Arc<SqliteHourlyAggregateRepository>,
        daily: Arc<SqliteDailyAggregateRepository>,
        counters: Arc<SqliteCounterRepository>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            raw,
            hourly,
            daily,
            counters,
            config,
            worker: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Spawn the sweep loop.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("retention sweeper already running; ignoring start");
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();

        let sweeper = Arc::clone(self);
        let interval = self.config.sweep_interval();
        *worker = Some(tokio::spawn(async move {
            loop {
                let outcome = sweeper.sweep().await;
                debug!(
                    raw_purged = outcome.raw_purged,
                    hourly_purged = outcome.hourly_purged,
                    daily_purged = outcome.daily_purged,
                    counters_purged = outcome.counters_purged,
                    "retention sweep complete"
                );

                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("retention sweep loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));

        info!(
            sweep_interval_seconds = self.config.sweep_interval_seconds,
            "retention sweeper started"
        );
    }

    /// Cancel the loop and wait for it to wind down.
    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        let Some(handle) = handle else {
            debug!("retention sweeper stop requested while not running");
            return;
        };

        self.cancel.lock().await.cancel();
        let abort = handle.abort_handle();
        match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_cancelled() => {}
            Ok(Err(err)) => warn!(error = %err, "retention sweeper ended abnormally"),
            Err(_) => {
                warn!("retention sweeper did not stop in time; aborting");
                abort.abort();
            }
        }
        info!("retention sweeper stopped");
    }

    /// Run one sweep across every table; per-table failures are logged and
    /// the rest of the sweep continues.
    pub async fn sweep(&self) -> SweepOutcome {
        let now = Utc::now();
        let mut outcome = SweepOutcome::default();

        match self.raw.purge_expired(now).await {
            Ok(purged) => outcome.raw_purged = purged,
            Err(err) => warn!(error = %err, "raw event purge failed"),
        }
        match self.hourly.purge_expired(now).await {
            Ok(purged) => outcome.hourly_purged = purged,
            Err(err) => warn!(error = %err, "hourly aggregate purge failed"),
        }
        match self.daily.purge_expired(now).await {
            Ok(purged) => outcome.daily_purged = purged,
            Err(err) => warn!(error = %err, "daily aggregate purge failed"),
        }

        let counter_cutoff = hour_bucket(now - Duration::days(self.config.raw_days));
        match self.counters.purge_before_bucket(&counter_cutoff).await {
            Ok(purged) => outcome.counters_purged = purged,
            Err(err) => warn!(error = %err, "counter purge failed"),
        }

        outcome
    }
}
