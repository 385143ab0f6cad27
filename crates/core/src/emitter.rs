//! Non-blocking metrics emitter with a background batching worker.
//!
//! `emit()` is fire-and-forget: it try-sends into a bounded queue and
//! returns immediately, preferring to drop the newest event over blocking
//! the caller or growing memory without bound. A single worker task drains
//! the queue, batching flushes on a dual trigger: batch size under heavy
//! load, flush interval under light load.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tidemark_domain::{EmitterConfig, EmitterSnapshot, MetricEvent};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collector::MetricsCollector;

/// Type alias for the worker handle to avoid complexity warnings
type TaskHandle = Mutex<Option<JoinHandle<()>>>;

#[derive(Default)]
struct EmitterCounters {
    running: AtomicBool,
    emitted: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    batches_flushed: AtomicU64,
    /// Unix millis of the last flush, 0 = never.
    last_flush_ms: AtomicI64,
    /// Unix millis of the last start, 0 = never started.
    started_at_ms: AtomicI64,
}

impl EmitterCounters {
    fn record_flush(&self, events: usize) {
        self.processed.fetch_add(events as u64, Ordering::Relaxed);
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.last_flush_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

/// Fire-and-forget event intake with one background flush worker.
///
/// Construct one per process and share it via `Arc`; the ingress adapters
/// receive it through dependency injection rather than a process-wide
/// singleton, so tests can run independent emitters side by side.
pub struct MetricsEmitter {
    config: EmitterConfig,
    collector: Arc<MetricsCollector>,
    tx: Sender<MetricEvent>,
    rx: Arc<Mutex<Receiver<MetricEvent>>>,
    worker: TaskHandle,
    cancel: Mutex<CancellationToken>,
    stats: Arc<EmitterCounters>,
}

impl MetricsEmitter {
    pub fn new(collector: Arc<MetricsCollector>, config: EmitterConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            collector,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            worker: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            stats: Arc::new(EmitterCounters::default()),
        }
    }

    /// Enqueue an event without ever blocking or suspending.
    ///
    /// Returns `false` when the queue is full; the event is dropped, the
    /// drop counter advances and a warning carries the running total. This
    /// is the backpressure policy, not an error condition.
    pub fn emit(&self, event: MetricEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    event_name = %event.event_name,
                    dropped_total = dropped,
                    "metrics queue full; dropping event"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                // The emitter owns the receiver, so this only happens after
                // the process started tearing the pipeline down.
                debug!(event_name = %event.event_name, "metrics queue closed; dropping event");
                false
            }
        }
    }

    /// Record an inbound HTTP request.
    pub fn emit_request(
        &self,
        method: &str,
        path: &str,
        status_code: u16,
        duration_ms: f64,
        request_id: Option<String>,
        user_id: Option<Uuid>,
    ) -> bool {
        let mut event = MetricEvent::request(method, path, status_code, duration_ms);
        event.request_id = request_id;
        event.user_id = user_id;
        self.emit(event)
    }

    /// Record a business event from the fixed vocabulary.
    pub fn emit_business(
        &self,
        event_name: &str,
        user_id: Option<Uuid>,
        course_id: Option<Uuid>,
        lesson_id: Option<Uuid>,
    ) -> bool {
        let mut event = MetricEvent::business(event_name);
        event.user_id = user_id;
        event.course_id = course_id;
        event.lesson_id = lesson_id;
        self.emit(event)
    }

    /// Record an application error by kind, e.g. `"ValueError"`.
    pub fn emit_error(
        &self,
        kind: &str,
        path: Option<String>,
        request_id: Option<String>,
    ) -> bool {
        let mut event = MetricEvent::error(kind);
        event.path = path;
        event.request_id = request_id;
        self.emit(event)
    }

    /// Spawn the background worker. Idempotent: a second start while the
    /// worker is alive logs a warning and changes nothing.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("metrics emitter already running; ignoring start");
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();

        self.stats.started_at_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.stats.running.store(true, Ordering::Relaxed);

        let ctx = WorkerContext {
            collector: Arc::clone(&self.collector),
            config: self.config.clone(),
            rx: Arc::clone(&self.rx),
            stats: Arc::clone(&self.stats),
            cancel: token,
        };
        *worker = Some(tokio::spawn(worker_loop(ctx)));

        info!(
            queue_capacity = self.config.queue_capacity,
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            "metrics emitter started"
        );
    }

    /// Stop the worker and flush everything still queued.
    ///
    /// Waits up to the configured stop timeout for the worker to finish its
    /// cooperative shutdown, then aborts it; an abort can lose only the
    /// batch that was in flight at that moment. Safe to call when not
    /// running.
    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        match handle {
            Some(handle) => {
                self.cancel.lock().await.cancel();
                let abort = handle.abort_handle();
                match tokio::time::timeout(self.config.stop_timeout(), handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(error = %err, "emitter worker ended abnormally"),
                    Err(_) => {
                        warn!(
                            timeout_ms = self.config.stop_timeout_ms,
                            "emitter worker did not stop in time; aborting (in-flight batch may be lost)"
                        );
                        abort.abort();
                    }
                }
            }
            None => debug!("emitter stop requested while not running"),
        }

        self.stats.running.store(false, Ordering::Relaxed);

        // Final synchronous drain of whatever is still in the queue.
        self.drain_queue().await;
        info!(
            processed = self.stats.processed.load(Ordering::Relaxed),
            dropped = self.stats.dropped.load(Ordering::Relaxed),
            "metrics emitter stopped"
        );
    }

    /// Whether the background worker is currently alive.
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Observability snapshot: queue depth, counters, uptime.
    pub fn stats(&self) -> EmitterSnapshot {
        let capacity = self.tx.max_capacity();
        let queue_len = capacity.saturating_sub(self.tx.capacity());
        let running = self.stats.running.load(Ordering::Relaxed);
        let started_at = self.stats.started_at_ms.load(Ordering::Relaxed);
        let last_flush = self.stats.last_flush_ms.load(Ordering::Relaxed);

        EmitterSnapshot {
            running,
            queue_len,
            queue_capacity: capacity,
            queue_utilization_pct: if capacity == 0 {
                0.0
            } else {
                queue_len as f64 / capacity as f64 * 100.0
            },
            emitted: self.stats.emitted.load(Ordering::Relaxed),
            processed: self.stats.processed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            batches_flushed: self.stats.batches_flushed.load(Ordering::Relaxed),
            last_flush_at: timestamp_from_millis(last_flush),
            uptime_secs: if running && started_at > 0 {
                ((Utc::now().timestamp_millis() - started_at) / 1_000).max(0) as u64
            } else {
                0
            },
        }
    }

    async fn drain_queue(&self) {
        let mut rx = self.rx.lock().await;
        let mut batch = Vec::with_capacity(self.config.batch_size);
        while let Ok(event) = rx.try_recv() {
            batch.push(event);
            if batch.len() >= self.config.batch_size {
                flush_batch(&self.collector, &self.stats, &mut batch).await;
            }
        }
        flush_batch(&self.collector, &self.stats, &mut batch).await;
    }
}

impl Drop for MetricsEmitter {
    fn drop(&mut self) {
        // Best-effort cleanup; a graceful stop() should have happened first.
        if let Ok(token) = self.cancel.try_lock() {
            if !token.is_cancelled() && self.stats.running.load(Ordering::Relaxed) {
                warn!("metrics emitter dropped while running; cancelling worker");
                token.cancel();
            }
        }
    }
}

struct WorkerContext {
    collector: Arc<MetricsCollector>,
    config: EmitterConfig,
    rx: Arc<Mutex<Receiver<MetricEvent>>>,
    stats: Arc<EmitterCounters>,
    cancel: CancellationToken,
}

/// Single consumer loop. Exactly one instance runs at a time, which is what
/// makes the collector's hourly read-merge-write safe; do not parallelize
/// this loop without moving the merge to an atomic storage primitive.
async fn worker_loop(ctx: WorkerContext) {
    let mut rx = ctx.rx.lock().await;
    let mut batch: Vec<MetricEvent> = Vec::with_capacity(ctx.config.batch_size);

    loop {
        let mut timeout_reached = false;

        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                // Drain what is already queued, flush, then exit.
                while let Ok(event) = rx.try_recv() {
                    batch.push(event);
                    if batch.len() >= ctx.config.batch_size {
                        flush_batch(&ctx.collector, &ctx.stats, &mut batch).await;
                    }
                }
                flush_batch(&ctx.collector, &ctx.stats, &mut batch).await;
                debug!("emitter worker cancelled");
                break;
            }
            received = tokio::time::timeout(ctx.config.flush_interval(), rx.recv()) => {
                match received {
                    Ok(Some(event)) => batch.push(event),
                    Ok(None) => {
                        flush_batch(&ctx.collector, &ctx.stats, &mut batch).await;
                        debug!("emitter queue closed; worker exiting");
                        break;
                    }
                    Err(_) => timeout_reached = true,
                }
            }
        }

        // Dual trigger: size bounds the batch under load, the interval
        // bounds latency when traffic is light.
        if batch.len() >= ctx.config.batch_size || (timeout_reached && !batch.is_empty()) {
            flush_batch(&ctx.collector, &ctx.stats, &mut batch).await;
        }
    }

    ctx.stats.running.store(false, Ordering::Relaxed);
}

/// Hand a batch to the collector. Errors are logged and the batch is
/// discarded either way: there is no retry queue, sustained store outages
/// degrade to "metrics paused" instead of unbounded buffering.
async fn flush_batch(
    collector: &MetricsCollector,
    stats: &EmitterCounters,
    batch: &mut Vec<MetricEvent>,
) {
    if batch.is_empty() {
        return;
    }

    let events = batch.len();
    match collector.process_batch(batch).await {
        Ok(outcome) => debug!(
            events,
            raw_inserted = outcome.raw_inserted,
            aggregates_written = outcome.aggregates_written,
            counters_written = outcome.counters_written,
            "flushed metrics batch"
        ),
        Err(err) => warn!(error = %err, events, "metrics batch flush failed; discarding batch"),
    }

    stats.record_flush(events);
    batch.clear();
}

fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        None
    } else {
        DateTime::<Utc>::from_timestamp_millis(millis)
    }
}
