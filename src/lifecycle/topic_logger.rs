//! Topic logger: a log tee plus lifecycle event channel for one run.
//!
//! Records and events go through one bounded queue (default capacity
//! [`DEFAULT_BUFFER_SIZE`]). `write` never blocks: when the queue is full
//! the record is dropped and counted, and the count is reported through the
//! fallback logger once the sink drains. Records written before
//! `init_output` wait in the queue under the same bound.
//!
//! The engine calls the setters in any order. Each is a once-only
//! transition; repeated calls are ignored and reported.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::subscriber::NoSubscriber;

use crate::bootstrap::logger::FallbackLogger;
use crate::bootstrap::run_id::RunId;
use crate::config::{Field, ParsedConfig, TopicLoggerConfig};
use crate::error::AppError;
use crate::lifecycle::event::{EventKind, LogRecord, TopicEvent};
use crate::lifecycle::layer::TopicLayer;
use crate::lifecycle::sink::EventSink;
use crate::pipeline::summary::StreamSummary;

/// Reserved top-level config key read by [`TopicLogger::init_output`].
pub const TOP_LEVEL_KEY: &str = "chatflow";

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// How long `trigger_stopped` waits for queue capacity.
const STOP_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Config schema entry for the reserved top-level object.
pub fn topic_logger_field() -> Field {
    Field::object(
        TOP_LEVEL_KEY,
        "Lifecycle event stream.",
        vec![
            Field::scalar("enabled", "Set to false to keep the event stream inactive."),
            Field::scalar("pipeline_id", "Identifier attached to every event."),
            Field::scalar("logs_level", "Minimum level of forwarded log records."),
            Field::scalar("status_interval_seconds", "Seconds between status events; 0 disables."),
            Field::map("sink", "Event destination: { type = \"file\", path } or { type = \"http\", url }."),
        ],
    )
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

/// Reporting channel for the logger's own problems. Shared with the drain
/// task so it never needs the whole logger.
#[derive(Default)]
struct Diagnostics {
    fallback: OnceLock<FallbackLogger>,
    dropped: AtomicU64,
}

impl Diagnostics {
    fn warn(&self, message: &str) {
        match self.fallback.get() {
            Some(logger) => logger.warn(message),
            None => eprintln!("warning: {message}"),
        }
    }

    fn error(&self, message: &str) {
        match self.fallback.get() {
            Some(logger) => logger.error(message),
            None => eprintln!("error: {message}"),
        }
    }
}

/// Settings fixed once the sink is active.
#[derive(Clone)]
struct ActiveOutput {
    pipeline_id: Option<String>,
    logs_level: LevelFilter,
    status_interval: Duration,
    runtime: Handle,
}

// ── TopicLogger ───────────────────────────────────────────────────────────────

struct Inner {
    run_id: RunId,
    /// `None` once closed or disabled. Writers hold the read lock only for a
    /// `try_send`; `close` takes the write lock to retire the sender.
    tx: RwLock<Option<mpsc::Sender<TopicEvent>>>,
    /// Held until `init_output` hands it to the drain task.
    rx: Mutex<Option<mpsc::Receiver<TopicEvent>>>,
    diag: Arc<Diagnostics>,
    summary: OnceLock<StreamSummary>,
    output: OnceLock<ActiveOutput>,
    init_attempted: AtomicBool,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// `Some` once the status ticker has been started.
    status_task: Mutex<Option<JoinHandle<()>>>,
    stop: CancellationToken,
}

/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct TopicLogger {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TopicLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicLogger")
            .field("run_id", &self.inner.run_id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TopicLogger {
    pub fn new(run_id: RunId) -> Self {
        Self::with_capacity(run_id, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(run_id: RunId, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                run_id,
                tx: RwLock::new(Some(tx)),
                rx: Mutex::new(Some(rx)),
                diag: Arc::new(Diagnostics::default()),
                summary: OnceLock::new(),
                output: OnceLock::new(),
                init_attempted: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                worker: Mutex::new(None),
                status_task: Mutex::new(None),
                stop: CancellationToken::new(),
            }),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.inner.run_id
    }

    /// `true` once `init_output` activated a sink.
    pub fn is_active(&self) -> bool {
        self.inner.output.get().is_some()
    }

    /// Records dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.inner.diag.dropped.load(Ordering::Relaxed)
    }

    /// A `tracing` layer that feeds this logger.
    pub fn layer(&self) -> TopicLayer {
        TopicLayer::new(self.clone())
    }

    /// Queue one log record. Never blocks.
    pub fn write(&self, record: LogRecord) {
        if let Some(out) = self.inner.output.get() {
            if record.level > out.logs_level {
                return;
            }
        }
        self.enqueue(EventKind::Log(record));
    }

    pub fn set_fallback_logger(&self, logger: FallbackLogger) {
        if self.inner.diag.fallback.set(logger).is_err() {
            self.inner.diag.warn("topic logger: fallback logger already set, ignoring");
        }
    }

    /// Activate the sink from the logger's own config sub-tree.
    ///
    /// Must run inside a tokio runtime. Failure disables the event stream
    /// only. A tree with no sink, or `enabled = false`, is a valid inactive
    /// configuration.
    pub fn init_output(&self, parsed: &ParsedConfig) -> Result<(), AppError> {
        if self.inner.init_attempted.swap(true, Ordering::AcqRel) {
            self.inner.diag.warn("topic logger: init_output called more than once, ignoring");
            return Ok(());
        }
        self.start_output(parsed).inspect_err(|_| self.disable())
    }

    fn start_output(&self, parsed: &ParsedConfig) -> Result<(), AppError> {
        let config = TopicLoggerConfig::from_parsed(parsed)?;
        let Some(sink_config) = config.active_sink() else {
            self.disable();
            return Ok(());
        };

        let runtime = Handle::try_current()
            .map_err(|e| AppError::Lifecycle(format!("topic logger needs a tokio runtime: {e}")))?;
        let sink = EventSink::open(sink_config)?;
        let rx = lock(&self.inner.rx)
            .take()
            .ok_or_else(|| AppError::Lifecycle("topic logger queue already closed".into()))?;

        let output = ActiveOutput {
            pipeline_id: config.pipeline_id,
            logs_level: config.logs_level,
            status_interval: config.status_interval,
            runtime: runtime.clone(),
        };
        let sink_runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let drain_task = drain(rx, sink, output.clone(), self.inner.diag.clone());
        // The sink, and every task its HTTP client spawns, runs on this one
        // thread with tracing off. Its own events never reach the queue.
        let worker = runtime.spawn_blocking(move || {
            let _silenced = tracing::subscriber::set_default(NoSubscriber::default());
            sink_runtime.block_on(drain_task);
        });
        *lock(&self.inner.worker) = Some(worker);
        let _ = self.inner.output.set(output);

        self.maybe_start_status();
        Ok(())
    }

    /// Attach the running stream's summary and emit `stream_started`.
    pub fn set_stream_summary(&self, summary: StreamSummary) {
        if self.inner.summary.set(summary).is_err() {
            self.inner.diag.warn("topic logger: stream summary already set, ignoring");
            return;
        }
        self.enqueue(EventKind::StreamStarted);
        self.maybe_start_status();
    }

    /// Emit the terminal `stopped` event. Waits up to a short timeout for
    /// queue capacity instead of dropping. Only the first call emits.
    pub async fn trigger_stopped(&self, error: Option<&AppError>) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            self.inner.diag.warn("topic logger: stop already triggered, ignoring");
            return;
        }
        let Some(tx) = self.sender() else { return };
        let event = self.event(EventKind::Stopped { error: error.map(ToString::to_string) });

        if !self.is_active() {
            if tx.try_send(event).is_err() {
                self.inner.diag.dropped.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        match tokio::time::timeout(STOP_SEND_TIMEOUT, tx.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => self.inner.diag.warn("topic logger: queue closed before stop event"),
            Err(_) => self.inner.diag.warn("topic logger: timed out queueing stop event"),
        }
    }

    /// Stop the status ticker, retire the queue, and wait up to `timeout` for
    /// the drain task. A no-op when `init_output` never activated a sink.
    pub async fn close(&self, timeout: Duration) -> Result<(), AppError> {
        self.inner.stop.cancel();

        let status = lock(&self.inner.status_task).take();
        if let Some(status) = status {
            status.abort();
            let _ = status.await;
        }

        // After this no `write` can be in flight.
        self.retire_sender();
        drop(lock(&self.inner.rx).take());

        let worker = lock(&self.inner.worker).take();
        let Some(mut worker) = worker else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AppError::Lifecycle(format!("topic logger worker failed: {e}"))),
            Err(_) => {
                worker.abort();
                Err(AppError::Lifecycle(format!(
                    "topic logger did not drain within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn event(&self, kind: EventKind) -> TopicEvent {
        TopicEvent::now(self.inner.run_id.clone(), kind)
    }

    fn enqueue(&self, kind: EventKind) {
        let guard = self.inner.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else { return };
        if tx.try_send(self.event(kind)).is_err() {
            self.inner.diag.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<TopicEvent>> {
        self.inner.tx.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn retire_sender(&self) {
        self.inner.tx.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// No sink will ever drain the queue: stop accepting records.
    fn disable(&self) {
        self.retire_sender();
        drop(lock(&self.inner.rx).take());
    }

    /// Start the status ticker once both the sink and the summary exist.
    fn maybe_start_status(&self) {
        let mut slot = lock(&self.inner.status_task);
        if slot.is_some() {
            return;
        }
        let (Some(output), Some(summary)) = (self.inner.output.get(), self.inner.summary.get())
        else {
            return;
        };
        if output.status_interval.is_zero() {
            return;
        }
        let Some(tx) = self.sender() else { return };

        let interval = output.status_interval;
        let summary = summary.clone();
        let stop = self.inner.stop.clone();
        let run_id = self.inner.run_id.clone();
        let diag = self.inner.diag.clone();
        *slot = Some(output.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let event = TopicEvent::now(run_id.clone(), EventKind::Status(summary.snapshot()));
                        if tx.try_send(event).is_err() {
                            diag.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }));
    }
}

/// Drain the queue into the sink until every sender is gone.
async fn drain(
    mut rx: mpsc::Receiver<TopicEvent>,
    mut sink: EventSink,
    output: ActiveOutput,
    diag: Arc<Diagnostics>,
) {
    let mut reported_dropped = 0;
    while let Some(mut event) = rx.recv().await {
        if let EventKind::Log(record) = &event.kind {
            if record.level > output.logs_level {
                continue;
            }
        }
        event.pipeline_id = output.pipeline_id.clone();
        if let Err(e) = sink.write(&event).await {
            diag.error(&format!("topic logger: failed to write event: {e}"));
        }

        let dropped = diag.dropped.load(Ordering::Relaxed);
        if dropped > reported_dropped {
            diag.warn(&format!(
                "topic logger: dropped {} records, queue full",
                dropped - reported_dropped
            ));
            reported_dropped = dropped;
        }
    }
    if let Err(e) = sink.flush().await {
        diag.error(&format!("topic logger: failed to flush sink: {e}"));
    }
}
