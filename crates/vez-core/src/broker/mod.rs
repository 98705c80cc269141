pub mod config;
mod delay;
mod dispatch;
pub mod handler;
pub mod health;
mod metrics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{unbounded, Sender};
use tracing::{info, warn};

use crate::envelope::{Envelope, Priority};
use crate::error::{BrokerError, BrokerResult};

pub use config::BrokerConfig;
pub use handler::{HandlerRegistry, MessageHandler};
pub use health::HealthStatus;

use delay::DelayWorker;
use dispatch::DispatchWorker;
use health::HealthState;
use metrics::Metrics;

/// In-process dispatch broker. Owns one unbounded lane per priority, a delay
/// store, and two worker threads: the strict-priority dispatch loop and the
/// delay-promotion loop. Producers enqueue fire-and-forget and resume
/// immediately; side effects run on the workers, invisible to the caller
/// except through health stats.
pub struct Broker {
    lanes: [Sender<Envelope>; 4],
    delay_tx: Sender<Envelope>,
    health: Arc<HealthState>,
    accepting: AtomicBool,
    shutdown_tx: Option<Sender<()>>,
    dispatch_thread: Option<thread::JoinHandle<()>>,
    delay_thread: Option<thread::JoinHandle<()>>,
}

impl Broker {
    /// Create a broker and spawn both worker threads. The handler registry
    /// is fixed for the broker's lifetime.
    pub fn new(config: BrokerConfig, registry: HandlerRegistry) -> BrokerResult<Self> {
        let registry = Arc::new(registry);
        let health = Arc::new(HealthState::default());

        let (c_tx, c_rx) = unbounded();
        let (h_tx, h_rx) = unbounded();
        let (n_tx, n_rx) = unbounded();
        let (l_tx, l_rx) = unbounded();
        let lanes = [c_tx, h_tx, n_tx, l_tx];
        let (delay_tx, delay_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded::<()>();

        let mut dispatch_worker = DispatchWorker::new(
            [c_rx, h_rx, n_rx, l_rx],
            delay_tx.clone(),
            registry,
            Arc::clone(&health),
            Metrics::new(),
            shutdown_rx.clone(),
            Duration::from_millis(config.idle_timeout_ms),
            Duration::from_millis(config.retry_backoff_base_ms),
        );
        let dispatch_thread = thread::Builder::new()
            .name("vez-dispatch".to_string())
            .spawn(move || dispatch_worker.run())
            .map_err(|e| BrokerError::WorkerSpawn(e.to_string()))?;

        let mut delay_worker = DelayWorker::new(
            delay_rx,
            lanes.clone(),
            Arc::clone(&health),
            shutdown_rx,
            Duration::from_millis(config.promotion_interval_ms),
        );
        let delay_thread = thread::Builder::new()
            .name("vez-delay".to_string())
            .spawn(move || delay_worker.run())
            .map_err(|e| BrokerError::WorkerSpawn(e.to_string()))?;

        info!("broker started");

        Ok(Self {
            lanes,
            delay_tx,
            health,
            accepting: AtomicBool::new(true),
            shutdown_tx: Some(shutdown_tx),
            dispatch_thread: Some(dispatch_thread),
            delay_thread: Some(delay_thread),
        })
    }

    /// Place an envelope into the lane matching its priority. Lanes are
    /// unbounded, so this never blocks; `false` means the broker is shutting
    /// down (or a lane is gone), and the envelope was not accepted.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }
        let lane = &self.lanes[envelope.priority.lane_index()];
        match lane.send(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!(envelope_id = %e.0.id, "lane closed, envelope rejected");
                false
            }
        }
    }

    /// Override the envelope's priority, then lane it. Hosts holding a raw
    /// numeric priority clamp it first via [`Priority::from_index`].
    pub fn enqueue_with_priority(&self, mut envelope: Envelope, priority: Priority) -> bool {
        envelope.priority = priority;
        self.enqueue(envelope)
    }

    /// Hold an envelope in the delay store until `now + delay`, then promote
    /// it into its priority lane on the next promotion scan.
    pub fn enqueue_delayed(&self, mut envelope: Envelope, delay: Duration) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }
        envelope.not_before =
            Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        self.health.delay_added();
        match self.delay_tx.send(envelope) {
            Ok(()) => true,
            Err(e) => {
                self.health.delay_removed();
                warn!(envelope_id = %e.0.id, "delay store closed, envelope rejected");
                false
            }
        }
    }

    /// Total pending work: lane depths plus the delay store. Approximate —
    /// sampled, not transactionally consistent.
    pub fn queue_length(&self) -> usize {
        self.lanes.iter().map(Sender::len).sum::<usize>() + self.health.delayed()
    }

    /// Snapshot of the broker's counters and recent errors for monitoring.
    pub fn health_status(&self) -> HealthStatus {
        self.health.snapshot(self.queue_length())
    }

    /// Graceful shutdown: stop accepting lane writes, signal both workers,
    /// and wait for each to finish its current iteration (the dispatch loop
    /// drains already-laned envelopes first).
    pub fn shutdown(mut self) -> BrokerResult<()> {
        info!("initiating broker shutdown");
        self.stop_accepting_and_signal();

        let mut result = Ok(());
        for handle in [self.dispatch_thread.take(), self.delay_thread.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                result = Err(BrokerError::WorkerPanicked);
            }
        }

        info!("broker shutdown complete");
        result
    }

    fn stop_accepting_and_signal(&mut self) {
        self.accepting.store(false, Ordering::Release);
        // Dropping the sender disconnects the shutdown channel; both workers
        // observe it at their next iteration boundary.
        drop(self.shutdown_tx.take());
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        // Shutdown fallback if the explicit call was skipped
        if self.dispatch_thread.is_some() || self.delay_thread.is_some() {
            self.stop_accepting_and_signal();
            for handle in [self.dispatch_thread.take(), self.delay_thread.take()]
                .into_iter()
                .flatten()
            {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageKind;
    use crate::error::HandlerError;
    use std::sync::atomic::AtomicU64;

    fn fast_config() -> BrokerConfig {
        BrokerConfig {
            idle_timeout_ms: 5,
            promotion_interval_ms: 5,
            retry_backoff_base_ms: 1,
        }
    }

    fn counting_registry(kind: MessageKind) -> (HandlerRegistry, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        let mut registry = HandlerRegistry::new();
        registry.register(kind, move |_env: &Envelope| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (registry, count)
    }

    fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_millis(deadline_ms);
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn broker_starts_and_shuts_down() {
        let broker = Broker::new(fast_config(), HandlerRegistry::new()).unwrap();
        broker.shutdown().unwrap();
    }

    #[test]
    fn broker_drop_stops_workers() {
        let broker = Broker::new(fast_config(), HandlerRegistry::new()).unwrap();
        drop(broker);
        // Reaching this point without hanging means both workers stopped
    }

    #[test]
    fn enqueue_is_processed() {
        let (registry, count) = counting_registry(MessageKind::Notification);
        let broker = Broker::new(fast_config(), registry).unwrap();

        assert!(broker.enqueue(Envelope::new(MessageKind::Notification, "test")));
        assert!(wait_until(2_000, || count.load(Ordering::SeqCst) == 1));

        broker.shutdown().unwrap();
    }

    #[test]
    fn enqueue_with_priority_overrides_the_envelope() {
        let broker = Broker::new(fast_config(), HandlerRegistry::new()).unwrap();

        // No handler registered: max_retries 0 dead-letters on first attempt
        let envelope = Envelope::new(MessageKind::Webhook, "test").with_max_retries(0);
        assert!(broker.enqueue_with_priority(envelope, Priority::Critical));
        assert!(wait_until(2_000, || broker.health_status().failed == 1));

        broker.shutdown().unwrap();
    }

    #[test]
    fn enqueue_after_shutdown_signal_is_rejected() {
        let (registry, _count) = counting_registry(MessageKind::AuditLog);
        let mut broker = Broker::new(fast_config(), registry).unwrap();

        broker.stop_accepting_and_signal();
        assert!(!broker.enqueue(Envelope::new(MessageKind::AuditLog, "test")));
        assert!(!broker.enqueue_delayed(
            Envelope::new(MessageKind::AuditLog, "test"),
            Duration::from_millis(1)
        ));
    }

    #[test]
    fn queue_length_counts_lanes_and_delay_store() {
        let (registry, count) = counting_registry(MessageKind::AnalyticsProcessing);
        let broker = Broker::new(fast_config(), registry).unwrap();

        for _ in 0..100 {
            broker.enqueue(Envelope::new(MessageKind::AnalyticsProcessing, "test"));
        }
        broker.enqueue_delayed(
            Envelope::new(MessageKind::AnalyticsProcessing, "test"),
            Duration::from_secs(3600),
        );

        // The far-future envelope keeps the delay store non-empty even after
        // the lanes drain.
        assert!(wait_until(2_000, || count.load(Ordering::SeqCst) == 100));
        assert_eq!(broker.queue_length(), 1);

        broker.shutdown().unwrap();
    }

    #[test]
    fn health_status_reflects_processing() {
        let (registry, _count) = counting_registry(MessageKind::QueueStateChange);
        let broker = Broker::new(fast_config(), registry).unwrap();

        broker.enqueue(Envelope::new(MessageKind::QueueStateChange, "test"));
        assert!(wait_until(2_000, || broker.health_status().processed == 1));

        let status = broker.health_status();
        assert_eq!(status.failed, 0);
        assert!(status.last_processed.is_some());

        broker.shutdown().unwrap();
    }
}
