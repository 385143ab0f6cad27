//! Daily rollup service.
//!
//! A second background worker, scheduled independently of the emitter,
//! that folds a full day of hourly aggregates into daily rows. The target
//! day trails `now` by a settle delay so late hourly writes have landed
//! before the day is rolled up; the race with a too-small delay is an
//! accepted eventual-consistency risk, not eliminated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use tidemark_domain::buckets::{day_bucket, month_bucket, truncate_to_midnight};
use tidemark_domain::{DailyAggregate, Result, RollupConfig};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store_ports::{DailyAggregateStore, HourlyAggregateStore};

/// Summary of one rollup pass over a single day.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RollupOutcome {
    pub day_bucket: String,
    pub hourly_rows: usize,
    pub groups_written: usize,
    pub groups_failed: usize,
}

/// Hourly-to-daily rollup worker with its own lifecycle.
pub struct RollupService {
    hourly: Arc<dyn HourlyAggregateStore>,
    daily: Arc<dyn DailyAggregateStore>,
    config: RollupConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
}

impl RollupService {
    pub fn new(
        hourly: Arc<dyn HourlyAggregateStore>,
        daily: Arc<dyn DailyAggregateStore>,
        config: RollupConfig,
    ) -> Self {
        Self { hourly, daily, config, worker: Mutex::new(None), cancel: Mutex::new(CancellationToken::new()) }
    }

    /// Spawn the rollup loop: run once, sleep the configured interval,
    /// repeat. A failed cycle is logged and the loop continues.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("rollup service already running; ignoring start");
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();

        let hourly = Arc::clone(&self.hourly);
        let daily = Arc::clone(&self.daily);
        let config = self.config.clone();

        *worker = Some(tokio::spawn(async move {
            loop {
                let target = rollup_target(Utc::now(), config.delay_hours);
                match rollup_day(hourly.as_ref(), daily.as_ref(), target).await {
                    Ok(outcome) => info!(
                        day_bucket = %outcome.day_bucket,
                        hourly_rows = outcome.hourly_rows,
                        groups_written = outcome.groups_written,
                        "daily rollup complete"
                    ),
                    Err(err) => {
                        error!(error = %err, "daily rollup failed; retrying next cycle");
                    }
                }

                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("rollup loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(config.interval()) => {}
                }
            }
        }));

        info!(
            interval_seconds = self.config.interval_seconds,
            delay_hours = self.config.delay_hours,
            "rollup service started"
        );
    }

    /// Cancel the loop and wait for it to wind down.
    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        let Some(handle) = handle else {
            debug!("rollup stop requested while not running");
            return;
        };

        self.cancel.lock().await.cancel();
        let abort = handle.abort_handle();
        match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            Ok(Ok(())) => {}
            // Cancellation is the expected way down; suppress it.
            Ok(Err(err)) if err.is_cancelled() => {}
            Ok(Err(err)) => warn!(error = %err, "rollup worker ended abnormally"),
            Err(_) => {
                warn!("rollup worker did not stop in time; aborting");
                abort.abort();
            }
        }
        info!("rollup service stopped");
    }

    /// Whether the rollup loop is currently alive.
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Roll up the current target day (now minus the settle delay,
    /// truncated to midnight).
    pub async fn run_rollup(&self) -> Result<RollupOutcome> {
        let target = rollup_target(Utc::now(), self.config.delay_hours);
        rollup_day(self.hourly.as_ref(), self.daily.as_ref(), target).await
    }

    /// Re-roll the last `days` days, ignoring the settle delay. Used for
    /// recovery and initial setup; failed days are logged and skipped.
    pub async fn backfill(&self, days: u32) -> Result<Vec<RollupOutcome>> {
        let midnight = truncate_to_midnight(Utc::now());
        let mut outcomes = Vec::with_capacity(days as usize);

        for offset in 0..days {
            let day = midnight - Duration::days(i64::from(offset));
            match rollup_day(self.hourly.as_ref(), self.daily.as_ref(), day).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(error = %err, day_bucket = %day_bucket(day), "backfill day failed; skipping");
                }
            }
        }

        info!(days, rolled_up = outcomes.len(), "backfill finished");
        Ok(outcomes)
    }
}

/// Midnight of the day that is considered settled at `now`.
fn rollup_target(now: DateTime<Utc>, delay_hours: i64) -> DateTime<Utc> {
    truncate_to_midnight(now - Duration::hours(delay_hours))
}

/// Fold one day's hourly rows into daily aggregates and upsert them.
///
/// Re-running against unchanged hourly input rewrites identical rows, so
/// the pass is idempotent (it is not additive: new hourly data between runs
/// changes the result, which is the intended merge-from-source behavior).
async fn rollup_day(
    hourly: &dyn HourlyAggregateStore,
    daily: &dyn DailyAggregateStore,
    day: DateTime<Utc>,
) -> Result<RollupOutcome> {
    let bucket = day_bucket(day);
    let rows = hourly.get_day(&bucket, None).await?;

    let month = month_bucket(day);
    let day_num = day.day();

    let mut groups: Vec<DailyAggregate> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for row in &rows {
        let group_key = (row.metric_name.clone(), row.dimension_key.clone());
        let slot = match index.get(&group_key) {
            Some(&slot) => slot,
            None => {
                index.insert(group_key, groups.len());
                groups.push(DailyAggregate::empty(
                    month.clone(),
                    day_num,
                    row.metric_name.clone(),
                    row.dimension_key.clone(),
                ));
                groups.len() - 1
            }
        };
        groups[slot].absorb(row);
    }

    let mut outcome = RollupOutcome {
        day_bucket: bucket,
        hourly_rows: rows.len(),
        groups_written: 0,
        groups_failed: 0,
    };

    for aggregate in &groups {
        match daily.upsert(aggregate).await {
            Ok(()) => outcome.groups_written += 1,
            Err(err) => {
                outcome.groups_failed += 1;
                warn!(
                    error = %err,
                    metric_name = %aggregate.metric_name,
                    dimension_key = %aggregate.dimension_key,
                    "daily aggregate upsert failed; skipping group"
                );
            }
        }
    }

    Ok(outcome)
}
