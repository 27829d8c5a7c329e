//! Background thread that periodically sweeps stale contexts.

use super::event_aggregator::EventAggregator;
use log::{debug, error, info};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs `sweep_stale` every `interval` until stopped or dropped
pub struct Sweeper {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Start sweeping `aggregator` on a dedicated thread
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be spawned
    pub fn spawn(aggregator: Arc<EventAggregator>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("reqtrail-sweeper".to_string())
            .spawn(move || {
                info!("Stale context sweeper running every {:?}", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let swept = aggregator.sweep_stale();
                            if swept > 0 {
                                info!("Swept {} stale contexts", swept);
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Stale context sweeper stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Stale context sweeper panicked");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContextId;
    use crate::sink::CaptureSink;
    use crate::utils::config::{AggregatorConfig, DeliveryMode};

    #[test]
    fn test_sweeper_finalizes_idle_contexts() {
        let aggregator = Arc::new(EventAggregator::new(
            AggregatorConfig::default()
                .with_delivery(DeliveryMode::Inline)
                .with_stale_context_timeout(Duration::from_millis(1)),
        ));
        let capture = CaptureSink::new();
        aggregator.register_sink(capture.clone());

        let context = ContextId::next();
        aggregator.begin(context).unwrap();

        let mut sweeper = Sweeper::spawn(Arc::clone(&aggregator), Duration::from_millis(5)).unwrap();
        for _ in 0..200 {
            if !capture.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        sweeper.stop();

        assert_eq!(aggregator.active_contexts(), 0);
        let record = capture.last().unwrap();
        assert_eq!(record.context_id, context);
        assert_eq!(record.get("abandoned").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let aggregator = Arc::new(EventAggregator::new(AggregatorConfig::default()));
        let mut sweeper = Sweeper::spawn(aggregator, Duration::from_secs(60)).unwrap();
        sweeper.stop();
        sweeper.stop();
    }
}
