// crates/failcore-core/src/sink/mod.rs
// ============================================================================
// Module: Failcore Trace Sink
// Description: Bounded-queue JSONL writer with severity-aware backpressure.
// Purpose: Persist the append-only trace without ever blocking execution.
// Dependencies: crate::core::{identifiers, time, trace}, serde_json
// ============================================================================

//! ## Overview
//! The sink assigns `seq` atomically at enqueue and hands envelopes to a
//! dedicated worker thread over a bounded queue. Under pressure, evidence
//! payloads are stripped first (at the watermark), then lower-severity
//! events are dropped at the bound; RUN_START, RUN_END, and blocking
//! ATTEMPTs are never dropped even when the bound is exceeded. Write
//! failures are counted and swallowed: the sink must never block or fail
//! the run. Durability is at-least-once with a sync at RUN_END; readers
//! tolerate one trailing truncated line.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod reader;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use serde_json::Value;

use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::time::Timestamp;
use crate::core::trace::EventType;
use crate::core::trace::TraceEnvelope;

// ============================================================================
// SECTION: Sink Target
// ============================================================================

/// Writable trace destination with an explicit durability point.
pub trait SinkTarget: Write + Send {
    /// Flushes buffered data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when syncing fails.
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()
    }
}

impl SinkTarget for std::fs::File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl SinkTarget for Vec<u8> {}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// When the sink syncs its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncMode {
    /// Sync once at RUN_END.
    #[default]
    RunEnd,
    /// Sync after every event.
    EveryEvent,
}

/// Sink tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Bounded queue capacity.
    pub queue_size: usize,
    /// Drop non-critical events when the queue is full.
    pub drop_on_full: bool,
    /// Durability point.
    pub file_sync: FileSyncMode,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            drop_on_full: true,
            file_sync: FileSyncMode::RunEnd,
        }
    }
}

// ============================================================================
// SECTION: Sink Stats
// ============================================================================

/// Counters reported when the sink closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Events dropped under backpressure.
    pub dropped_events: u64,
    /// Evidence payloads stripped under backpressure.
    pub dropped_evidence: u64,
    /// Write or serialization failures swallowed.
    pub write_errors: u64,
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Queue state guarded by one lock so close signals are never missed.
struct SinkQueue {
    /// Pending envelopes.
    items: VecDeque<TraceEnvelope>,
    /// Producers closed the sink.
    closed: bool,
}

/// State shared between producers and the worker.
struct SinkShared {
    /// Bounded envelope queue plus the close flag.
    queue: Mutex<SinkQueue>,
    /// Wakes the worker on enqueue and close.
    signal: Condvar,
    /// Events dropped under backpressure.
    dropped_events: AtomicU64,
    /// Evidence payloads stripped under backpressure.
    dropped_evidence: AtomicU64,
    /// Swallowed write failures.
    write_errors: AtomicU64,
}

// ============================================================================
// SECTION: Trace Writer
// ============================================================================

/// Producer handle for the append-only trace.
pub struct TraceWriter {
    /// Run this writer records.
    run_id: RunId,
    /// Next sequence number.
    seq: AtomicU64,
    /// Queue configuration.
    config: SinkConfig,
    /// Shared queue state.
    shared: Arc<SinkShared>,
    /// Worker draining the queue.
    worker: Option<JoinHandle<()>>,
}

impl TraceWriter {
    /// Opens a writer over a sink target, spawning the worker thread.
    #[must_use]
    pub fn open<W: SinkTarget + 'static>(run_id: RunId, target: W, config: SinkConfig) -> Self {
        let shared = Arc::new(SinkShared {
            queue: Mutex::new(SinkQueue {
                items: VecDeque::with_capacity(config.queue_size),
                closed: false,
            }),
            signal: Condvar::new(),
            dropped_events: AtomicU64::new(0),
            dropped_evidence: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || drain_loop(&worker_shared, target, config));
        Self {
            run_id,
            seq: AtomicU64::new(1),
            config,
            shared,
            worker: Some(worker),
        }
    }

    /// Emits one event; `seq` is assigned atomically here.
    ///
    /// Returns the assigned sequence number. The event may be dropped under
    /// backpressure unless it is critical.
    pub fn emit(
        &self,
        event_type: EventType,
        ts: Timestamp,
        step: Option<StepId>,
        data: Value,
    ) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut envelope = TraceEnvelope::new(self.run_id.clone(), event_type, seq, ts, step, data);

        let Ok(mut queue) = self.shared.queue.lock() else {
            self.shared.write_errors.fetch_add(1, Ordering::SeqCst);
            return seq;
        };
        let critical = envelope.is_critical();
        let watermark = (self.config.queue_size / 2).max(1);
        if queue.items.len() >= self.config.queue_size && !critical {
            if self.config.drop_on_full {
                self.shared.dropped_events.fetch_add(1, Ordering::SeqCst);
                return seq;
            }
        } else if queue.items.len() >= watermark && !critical && envelope.strip_evidence() {
            self.shared.dropped_evidence.fetch_add(1, Ordering::SeqCst);
        }
        queue.items.push_back(envelope);
        drop(queue);
        self.shared.signal.notify_one();
        seq
    }

    /// Returns the sequence number the next event would receive.
    #[must_use]
    pub fn peek_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Closes the sink, drains the queue, syncs, and returns the counters.
    #[must_use]
    pub fn flush_and_close(mut self) -> SinkStats {
        self.close_inner();
        SinkStats {
            dropped_events: self.shared.dropped_events.load(Ordering::SeqCst),
            dropped_evidence: self.shared.dropped_evidence.load(Ordering::SeqCst),
            write_errors: self.shared.write_errors.load(Ordering::SeqCst),
        }
    }

    /// Signals the worker to finish and joins it.
    fn close_inner(&mut self) {
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.closed = true;
        }
        self.shared.signal.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        self.close_inner();
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Drains the queue onto the target until closed and empty.
fn drain_loop<W: SinkTarget>(shared: &Arc<SinkShared>, mut target: W, config: SinkConfig) {
    loop {
        let envelope = {
            let Ok(mut queue) = shared.queue.lock() else {
                return;
            };
            loop {
                if let Some(envelope) = queue.items.pop_front() {
                    break Some(envelope);
                }
                if queue.closed {
                    break None;
                }
                let Ok(guard) = shared.signal.wait(queue) else {
                    return;
                };
                queue = guard;
            }
        };
        match envelope {
            Some(envelope) => {
                if write_line(&mut target, &envelope).is_err() {
                    shared.write_errors.fetch_add(1, Ordering::SeqCst);
                }
                if config.file_sync == FileSyncMode::EveryEvent && target.sync().is_err() {
                    shared.write_errors.fetch_add(1, Ordering::SeqCst);
                }
            }
            None => {
                if target.sync().is_err() {
                    shared.write_errors.fetch_add(1, Ordering::SeqCst);
                }
                return;
            }
        }
    }
}

/// Writes one envelope as a JSONL line.
fn write_line<W: Write>(target: &mut W, envelope: &TraceEnvelope) -> std::io::Result<()> {
    let line = serde_json::to_vec(envelope)?;
    target.write_all(&line)?;
    target.write_all(b"\n")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use std::io::Write;
    use std::sync::Arc;
    use std::sync::Mutex;

    use serde_json::json;

    use super::SinkConfig;
    use super::SinkTarget;
    use super::TraceWriter;
    use crate::core::time::Timestamp;
    use crate::core::trace::EventType;

    /// Shared in-memory target for worker-thread tests.
    ///
    /// The gate lets a test hold the worker inside `write`, so queue
    /// saturation is deterministic rather than a race.
    #[derive(Clone, Default)]
    struct SharedBuf {
        /// Written bytes.
        inner: Arc<Mutex<Vec<u8>>>,
        /// Held by tests to block the worker.
        gate: Arc<Mutex<()>>,
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let _gate = self.gate.lock();
            self.inner.lock().map_or(Ok(buf.len()), |mut inner| inner.write(buf))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SinkTarget for SharedBuf {}

    impl SharedBuf {
        /// Returns the written lines.
        fn lines(&self) -> Vec<String> {
            let inner = self.inner.lock().unwrap();
            String::from_utf8_lossy(&inner).lines().map(str::to_string).collect()
        }
    }

    /// Tests events are written as JSONL with increasing seq.
    #[test]
    fn test_jsonl_and_seq() {
        let buf = SharedBuf::default();
        let writer = TraceWriter::open("run-1".into(), buf.clone(), SinkConfig::default());
        let ts = Timestamp::from_unix_millis(0);
        let seq_start = writer.emit(EventType::RunStart, ts, None, json!({}));
        let seq_end = writer.emit(EventType::RunEnd, ts, None, json!({}));
        let stats = writer.flush_and_close();

        assert!(seq_start < seq_end);
        assert_eq!(stats.dropped_events, 0);
        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["event_type"], "RUN_START");
        assert_eq!(first["seq"], 1);
    }

    /// Tests critical events survive a saturated queue while others drop.
    #[test]
    fn test_backpressure_keeps_critical() {
        let buf = SharedBuf::default();
        let config = SinkConfig {
            queue_size: 2,
            ..SinkConfig::default()
        };
        let writer = TraceWriter::open("run-1".into(), buf.clone(), config);
        let ts = Timestamp::from_unix_millis(0);

        // Park the worker inside its first write so the queue saturates.
        let _ = writer.emit(EventType::RunStart, ts, None, json!({}));
        let gate = buf.gate.lock().unwrap();
        for _ in 0..64 {
            let _ = writer.emit(
                EventType::Egress,
                ts,
                Some("step".into()),
                json!({"status": "ok", "evidence": {"usage": {}}}),
            );
        }
        let _ = writer.emit(
            EventType::Attempt,
            ts,
            Some("step".into()),
            json!({"verdict": {"decision": "BLOCK"}, "decisions": []}),
        );
        let _ = writer.emit(EventType::RunEnd, ts, None, json!({}));
        drop(gate);
        let stats = writer.flush_and_close();

        let rendered = buf.lines().join("\n");
        assert!(rendered.contains("RUN_START"));
        assert!(rendered.contains("RUN_END"));
        assert!(rendered.contains("BLOCK"));
        assert!(stats.dropped_events > 0, "non-critical events must have dropped");
    }

    /// Tests the file target persists a durable JSONL trace.
    #[test]
    fn test_file_target_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let file = std::fs::File::create(&path).unwrap();
        let writer = TraceWriter::open("run-file".into(), file, SinkConfig::default());
        let ts = Timestamp::from_unix_millis(0);
        let _ = writer.emit(EventType::RunStart, ts, None, json!({}));
        let _ = writer.emit(EventType::RunEnd, ts, None, json!({}));
        let stats = writer.flush_and_close();
        assert_eq!(stats.write_errors, 0);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));
    }

    /// Tests evidence is stripped at the watermark before events drop.
    #[test]
    fn test_evidence_stripped_at_watermark() {
        let buf = SharedBuf::default();
        let config = SinkConfig {
            queue_size: 64,
            ..SinkConfig::default()
        };
        let writer = TraceWriter::open("run-1".into(), buf.clone(), config);
        let ts = Timestamp::from_unix_millis(0);

        let _ = writer.emit(EventType::RunStart, ts, None, json!({}));
        let gate = buf.gate.lock().unwrap();
        for _ in 0..60 {
            let _ = writer.emit(
                EventType::Egress,
                ts,
                Some("step".into()),
                json!({"status": "ok", "evidence": {"dlp": {"matches": 3}}}),
            );
        }
        drop(gate);
        let stats = writer.flush_and_close();
        assert!(stats.dropped_evidence > 0, "watermark must strip evidence first");
        assert_eq!(stats.dropped_events, 0, "nothing should drop below the bound");
    }
}
