//! Fan-out of finalized records to every registered sink.
//!
//! Each sink gets up to `max_attempts` tries per record with linear backoff;
//! after that the record is dropped for that sink and counted as failed.
//! Failures are logged and never propagate to the caller of `dispatch`.
//!
//! In background mode delivery runs on a dedicated thread fed by a bounded
//! channel, so a slow sink never delays the code being observed. When the
//! queue is full new records are dropped and counted as overflow.

use super::Sink;
use crate::record::FieldRecord;
use crate::utils::config::{AggregatorConfig, DeliveryMode};
use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Running delivery counters
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    dropped_overflow: AtomicU64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `DeliveryStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeliverySnapshot {
    /// Successful (record, sink) deliveries
    pub delivered: u64,
    /// Attempts that failed and were retried
    pub retried: u64,
    /// (record, sink) pairs dropped after exhausting retries
    pub failed: u64,
    /// Records dropped because the background queue was full
    pub dropped_overflow: u64,
}

impl DeliverySnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Delivered: {} | Retried: {} | Dropped: {} | Overflow: {}",
            self.delivered, self.retried, self.failed, self.dropped_overflow
        )
    }
}

type SinkList = Arc<RwLock<Vec<Arc<dyn Sink>>>>;

enum Command {
    Deliver(Arc<FieldRecord>),
    Flush(mpsc::Sender<()>),
}

/// Delivery logic shared by the inline path and the worker thread
struct Delivery {
    sinks: SinkList,
    stats: Arc<DeliveryStats>,
    max_attempts: u32,
    backoff: Duration,
}

impl Delivery {
    fn deliver(&self, record: &FieldRecord) {
        // Clone the list so registration never waits on a slow sink
        let sinks: Vec<Arc<dyn Sink>> = self.sinks.read().clone();
        for sink in &sinks {
            self.deliver_to(sink.as_ref(), record);
        }
    }

    fn deliver_to(&self, sink: &dyn Sink, record: &FieldRecord) {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match sink.emit(record) {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Sink '{}' failed on record {} (attempt {}/{}): {}",
                        sink.name(),
                        record.context_id,
                        attempt,
                        max_attempts,
                        e
                    );
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff * attempt);
                    }
                }
                Err(e) => {
                    error!(
                        "Dropping record {} for sink '{}' after {} attempts: {}",
                        record.context_id,
                        sink.name(),
                        max_attempts,
                        e
                    );
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn flush_sinks(&self) {
        for sink in self.sinks.read().iter() {
            if let Err(e) = sink.flush() {
                warn!("Failed to flush sink '{}': {}", sink.name(), e);
            }
        }
    }
}

/// Hands finalized records to all registered sinks
pub struct SinkDispatcher {
    delivery: Arc<Delivery>,
    sender: Mutex<Option<mpsc::SyncSender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SinkDispatcher {
    pub fn new(
        mode: DeliveryMode,
        max_attempts: u32,
        backoff: Duration,
        queue_capacity: usize,
    ) -> Self {
        let delivery = Arc::new(Delivery {
            sinks: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(DeliveryStats::default()),
            max_attempts,
            backoff,
        });

        let (sender, worker) = match mode {
            DeliveryMode::Inline => (None, None),
            DeliveryMode::Background => match spawn_worker(Arc::clone(&delivery), queue_capacity) {
                Ok((sender, worker)) => (Some(sender), Some(worker)),
                Err(e) => {
                    error!(
                        "Failed to start sink worker, delivering inline instead: {}",
                        e
                    );
                    (None, None)
                }
            },
        };

        Self {
            delivery,
            sender: Mutex::new(sender),
            worker: Mutex::new(worker),
        }
    }

    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self::new(
            config.delivery,
            config.max_emit_attempts,
            config.retry_backoff(),
            config.delivery_queue_capacity,
        )
    }

    /// Add a sink; it receives every record dispatched from now on
    pub fn register(&self, sink: Arc<dyn Sink>) {
        debug!("Registering sink '{}'", sink.name());
        self.delivery.sinks.write().push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.delivery.sinks.read().len()
    }

    /// Queue (or, inline, perform) delivery of one record to every sink
    ///
    /// Never blocks in background mode: a full queue drops the record.
    pub fn dispatch(&self, record: Arc<FieldRecord>) {
        let sender = self.sender.lock().clone();
        let Some(tx) = sender else {
            self.delivery.deliver(&record);
            return;
        };

        match tx.try_send(Command::Deliver(record)) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(Command::Deliver(record))) => {
                self.delivery
                    .stats
                    .dropped_overflow
                    .fetch_add(1, Ordering::Relaxed);
                warn!("Sink queue full, dropping record {}", record.context_id);
            }
            Err(mpsc::TrySendError::Disconnected(Command::Deliver(record))) => {
                // Worker is gone; deliver on this thread rather than lose the record
                warn!("Sink worker unavailable, delivering inline");
                self.delivery.deliver(&record);
            }
            Err(_) => {}
        }
    }

    /// Block until every record dispatched so far has been delivered
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        let sender = self.sender.lock().clone();
        let sent = sender.is_some_and(|tx| tx.send(Command::Flush(ack_tx)).is_ok());

        if sent {
            if ack_rx.recv().is_err() {
                warn!("Sink worker exited before acknowledging flush");
            }
        } else {
            self.delivery.flush_sinks();
        }
    }

    pub fn stats(&self) -> DeliverySnapshot {
        self.delivery.stats.snapshot()
    }

    /// Drain the queue and stop the worker; later records are delivered inline
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("Sink worker panicked");
            }
        }
        self.delivery.flush_sinks();
    }
}

impl Drop for SinkDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    delivery: Arc<Delivery>,
    capacity: usize,
) -> std::io::Result<(mpsc::SyncSender<Command>, JoinHandle<()>)> {
    let (tx, rx) = mpsc::sync_channel::<Command>(capacity.max(1));
    let handle = thread::Builder::new()
        .name("reqtrail-sink".to_string())
        .spawn(move || {
            // Ends once every sender has been dropped and the queue is empty
            for command in rx {
                match command {
                    Command::Deliver(record) => delivery.deliver(&record),
                    Command::Flush(ack) => {
                        delivery.flush_sinks();
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Sink worker stopped");
        })?;
    Ok((tx, handle))
}
