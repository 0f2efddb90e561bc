//! Periodic batching for sinks that ship events in bulk

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::{LogError, LogResult};
use crate::event::LogEvent;
use crate::layer::suppress_capture;

/// How many events to collect and how long to wait before emitting a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingOptions {
    /// Emit as soon as this many events are queued
    pub batch_size_limit: usize,
    /// Emit whatever is queued at least this often
    pub period: Duration,
    /// Drop events once the queue holds this many (unbounded if `None`)
    pub queue_limit: Option<usize>,
}

impl Default for BatchingOptions {
    fn default() -> Self {
        Self {
            batch_size_limit: 50,
            period: Duration::from_secs(5),
            queue_limit: Some(100_000),
        }
    }
}

impl BatchingOptions {
    /// Create options with the given size limit and period
    ///
    /// A size limit of zero is raised to one.
    pub fn new(batch_size_limit: usize, period: Duration) -> Self {
        Self {
            batch_size_limit: batch_size_limit.max(1),
            period,
            ..Self::default()
        }
    }

    fn batch_size(&self) -> usize {
        self.batch_size_limit.max(1)
    }
}

/// Destination that receives whole batches
pub trait BatchedSink: Send + Sync + 'static {
    /// Short name used for the worker thread and in self-log messages
    fn name(&self) -> &'static str;

    /// Deliver one batch; never called concurrently
    fn emit_batch(&self, events: &[LogEvent]) -> LogResult<()>;

    /// Release connections; called on the worker thread after its last batch
    fn close(&self) {}
}

/// Queues events and hands them to a [`BatchedSink`] from a background
/// worker thread
///
/// The worker is spawned on the first enqueued event and is the only thread
/// that calls [`BatchedSink::emit_batch`]. [`flush`](Self::flush) asks it to
/// drain and waits. Dropping the batcher delivers whatever is still queued
/// and joins the worker.
pub struct PeriodicBatcher<T: BatchedSink> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<T> {
    target: T,
    options: BatchingOptions,
    state: Mutex<State>,
    wake: Condvar,
    flushed: Condvar,
    emit_lock: Mutex<()>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<LogEvent>,
    shutdown: bool,
    flush_requested: u64,
    flush_completed: u64,
    flush_error: Option<LogError>,
    worker_exited: bool,
}

impl State {
    fn flush_pending(&self) -> bool {
        self.flush_requested != self.flush_completed
    }
}

impl<T: BatchedSink> PeriodicBatcher<T> {
    /// Create a batcher around a sink
    pub fn new(target: T, options: BatchingOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                options,
                state: Mutex::new(State::default()),
                wake: Condvar::new(),
                flushed: Condvar::new(),
                emit_lock: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// The wrapped sink
    pub fn target(&self) -> &T {
        &self.shared.target
    }

    /// Batching parameters
    pub fn options(&self) -> &BatchingOptions {
        &self.shared.options
    }

    /// Number of queued events
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Queue an event for the next batch
    pub fn enqueue(&self, event: LogEvent) {
        self.ensure_worker();

        let mut state = self.shared.state.lock();
        if let Some(limit) = self.shared.options.queue_limit {
            if state.queue.len() >= limit {
                drop(state);
                crate::selflog!(
                    "{} queue is full ({limit} events), dropping event",
                    self.shared.target.name()
                );
                return;
            }
        }
        state.queue.push_back(event);
        if state.queue.len() >= self.shared.options.batch_size() {
            self.shared.wake.notify_one();
        }
    }

    /// Deliver every queued event and wait until the worker is done
    ///
    /// Delivery happens on the worker thread, so this is safe to call from
    /// inside an async runtime. It blocks the caller while the batch is sent.
    pub fn flush(&self) -> LogResult<()> {
        if self.worker.lock().is_none() {
            // Nothing was ever queued, or the worker could not be started
            return self.shared.drain();
        }

        let mut state = self.shared.state.lock();
        state.flush_requested += 1;
        let ticket = state.flush_requested;
        self.shared.wake.notify_one();

        while state.flush_completed < ticket {
            if state.worker_exited {
                return Err(LogError::sink(
                    self.shared.target.name(),
                    "batch worker stopped before the flush completed",
                ));
            }
            self.shared.flushed.wait(&mut state);
        }
        state.flush_error.take().map_or(Ok(()), Err)
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(format!("log-{}", self.shared.target.name()))
            .spawn(move || shared.run());

        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(e) => crate::selflog!(
                "failed to start {} batch worker: {e}",
                self.shared.target.name()
            ),
        }
    }
}

/// Marks the worker as gone even when a batch panics
struct WorkerExit<'a, T: BatchedSink>(&'a Shared<T>);

impl<T: BatchedSink> Drop for WorkerExit<'_, T> {
    fn drop(&mut self) {
        self.0.target.close();
        self.0.state.lock().worker_exited = true;
        self.0.flushed.notify_all();
    }
}

impl<T: BatchedSink> Shared<T> {
    fn run(&self) {
        let _suppressed = suppress_capture();
        let _exit = WorkerExit(self);

        loop {
            let (shutdown, ticket) = {
                let mut state = self.state.lock();
                if state.queue.len() < self.options.batch_size()
                    && !state.shutdown
                    && !state.flush_pending()
                {
                    self.wake.wait_for(&mut state, self.options.period);
                }
                (state.shutdown, state.flush_requested)
            };

            let result = self.drain();

            let mut state = self.state.lock();
            if ticket > state.flush_completed {
                state.flush_error = result.err();
                state.flush_completed = ticket;
                self.flushed.notify_all();
            } else if let Err(e) = result {
                drop(state);
                crate::selflog!("{} failed to emit batch: {e}", self.target.name());
            }

            if shutdown {
                break;
            }
        }
    }

    /// Emit queued events in batches of at most `batch_size_limit`,
    /// returning the first failure after attempting every batch
    fn drain(&self) -> LogResult<()> {
        let _suppressed = suppress_capture();
        let _emitting = self.emit_lock.lock();
        let mut first_error = None;

        loop {
            let batch: Vec<LogEvent> = {
                let mut state = self.state.lock();
                let take = state.queue.len().min(self.options.batch_size());
                state.queue.drain(..take).collect()
            };
            if batch.is_empty() {
                break;
            }
            if let Err(e) = self.target.emit_batch(&batch) {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl<T: BatchedSink> Drop for PeriodicBatcher<T> {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wake.notify_one();

        match self.worker.get_mut().take() {
            Some(handle) => {
                if handle.join().is_err() {
                    crate::selflog!("{} batch worker panicked", self.shared.target.name());
                }
            }
            None => {
                if let Err(e) = self.shared.drain() {
                    crate::selflog!("{} failed to emit batch: {e}", self.shared.target.name());
                }
                self.shared.target.close();
            }
        }
    }
}

impl<T: BatchedSink> std::fmt::Debug for PeriodicBatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicBatcher")
            .field("sink", &self.shared.target.name())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every batch it receives
    #[derive(Default)]
    pub(crate) struct RecordingBatches {
        pub(crate) batches: Mutex<Vec<Vec<LogEvent>>>,
        pub(crate) threads: Mutex<Vec<Option<String>>>,
        pub(crate) fail: bool,
    }

    impl BatchedSink for Arc<RecordingBatches> {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn emit_batch(&self, events: &[LogEvent]) -> LogResult<()> {
            self.batches.lock().push(events.to_vec());
            self.threads
                .lock()
                .push(std::thread::current().name().map(ToString::to_string));
            if self.fail {
                Err(crate::core::LogError::sink("recording", "refused"))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingBatches;
    use super::*;
    use crate::event::Level;
    use crate::selflog::testing::Capture;
    use std::time::Instant;

    fn event(n: usize) -> LogEvent {
        LogEvent::new(Level::Info, format!("event {n}"))
    }

    #[test]
    fn test_default_options() {
        let options = BatchingOptions::default();
        assert_eq!(options.batch_size_limit, 50);
        assert_eq!(options.period, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_size_limit_is_raised_to_one() {
        assert_eq!(BatchingOptions::new(0, Duration::from_secs(1)).batch_size_limit, 1);

        let options: BatchingOptions =
            serde_json::from_value(serde_json::json!({ "batch_size_limit": 0 })).unwrap();
        assert_eq!(options.batch_size(), 1);
    }

    #[test]
    fn test_zero_size_limit_still_delivers_one_by_one() {
        let target = Arc::new(RecordingBatches::default());
        let batcher = PeriodicBatcher::new(
            Arc::clone(&target),
            BatchingOptions {
                batch_size_limit: 0,
                period: Duration::from_secs(3600),
                queue_limit: None,
            },
        );
        batcher.enqueue(event(1));
        batcher.enqueue(event(2));
        batcher.flush().unwrap();

        let batches = target.batches.lock();
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 2);
        assert!(batches.iter().all(|batch| batch.len() == 1));
    }

    #[test]
    fn test_flush_delivers_on_worker_thread() {
        let target = Arc::new(RecordingBatches::default());
        let batcher = PeriodicBatcher::new(
            Arc::clone(&target),
            BatchingOptions::new(50, Duration::from_secs(3600)),
        );
        batcher.enqueue(event(1));
        batcher.flush().unwrap();

        assert_eq!(batcher.pending(), 0);
        assert_eq!(
            *target.threads.lock(),
            [Some("log-recording".to_string())]
        );
    }

    #[test]
    fn test_flush_without_events_does_not_start_worker() {
        let target = Arc::new(RecordingBatches::default());
        let batcher = PeriodicBatcher::new(Arc::clone(&target), BatchingOptions::default());
        batcher.flush().unwrap();

        assert!(batcher.worker.lock().is_none());
        assert!(target.batches.lock().is_empty());
    }

    #[test]
    fn test_flush_splits_into_size_limited_batches() {
        let target = Arc::new(RecordingBatches::default());
        let batcher = PeriodicBatcher::new(
            Arc::clone(&target),
            BatchingOptions::new(2, Duration::from_secs(3600)),
        );

        // Hold the emit lock so the worker cannot drain before we flush
        {
            let _emitting = batcher.shared.emit_lock.lock();
            for n in 0..5 {
                batcher.enqueue(event(n));
            }
        }
        batcher.flush().unwrap();
        drop(batcher);

        let batches = target.batches.lock();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 5);
        assert!(sizes.iter().all(|size| *size <= 2));
    }

    #[test]
    fn test_worker_emits_after_period() {
        let target = Arc::new(RecordingBatches::default());
        let batcher = PeriodicBatcher::new(
            Arc::clone(&target),
            BatchingOptions::new(50, Duration::from_millis(20)),
        );
        batcher.enqueue(event(1));

        let deadline = Instant::now() + Duration::from_secs(5);
        while target.batches.lock().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(target.batches.lock().len(), 1);
        assert_eq!(batcher.pending(), 0);
    }

    #[test]
    fn test_drop_delivers_pending_events() {
        let target = Arc::new(RecordingBatches::default());
        let batcher = PeriodicBatcher::new(
            Arc::clone(&target),
            BatchingOptions::new(50, Duration::from_secs(3600)),
        );
        batcher.enqueue(event(1));
        batcher.enqueue(event(2));
        drop(batcher);

        let delivered: usize = target.batches.lock().iter().map(Vec::len).sum();
        assert_eq!(delivered, 2);
    }

    #[test]
    fn test_queue_limit_drops_and_reports() {
        let capture = Capture::start();
        let target = Arc::new(RecordingBatches::default());
        let batcher = PeriodicBatcher::new(
            Arc::clone(&target),
            BatchingOptions {
                batch_size_limit: 50,
                period: Duration::from_secs(3600),
                queue_limit: Some(1),
            },
        );
        batcher.enqueue(event(1));
        batcher.enqueue(event(2));
        assert_eq!(batcher.pending(), 1);
        assert!(capture.lines().iter().any(|line| line.contains("queue is full")));
    }

    #[test]
    fn test_flush_reports_failure() {
        let target = Arc::new(RecordingBatches {
            fail: true,
            ..RecordingBatches::default()
        });
        let batcher = PeriodicBatcher::new(
            Arc::clone(&target),
            BatchingOptions::new(50, Duration::from_secs(3600)),
        );
        {
            let _emitting = batcher.shared.emit_lock.lock();
            batcher.enqueue(event(1));
        }
        let error = batcher.flush().unwrap_err();
        assert!(error.to_string().contains("refused"));
    }
}
