use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::broker::handler::HandlerRegistry;
use crate::broker::health::HealthState;
use crate::broker::metrics::Metrics;
use crate::envelope::{Envelope, Priority};
use crate::error::HandlerError;

/// Single consumer of all four lanes. Drains them strictly in priority order
/// — no Normal/Low envelope is dispatched while a higher lane has work.
/// Under sustained high-priority load, low-priority envelopes can therefore
/// wait indefinitely; notification urgency tiers rely on exactly that.
pub(crate) struct DispatchWorker {
    /// Receivers indexed by `Priority::lane_index` (Critical first).
    lanes: [Receiver<Envelope>; 4],
    delay_tx: Sender<Envelope>,
    registry: Arc<HandlerRegistry>,
    health: Arc<HealthState>,
    metrics: Metrics,
    shutdown: Receiver<()>,
    idle_timeout: Duration,
    backoff_base: Duration,
}

impl DispatchWorker {
    pub(crate) fn new(
        lanes: [Receiver<Envelope>; 4],
        delay_tx: Sender<Envelope>,
        registry: Arc<HandlerRegistry>,
        health: Arc<HealthState>,
        metrics: Metrics,
        shutdown: Receiver<()>,
        idle_timeout: Duration,
        backoff_base: Duration,
    ) -> Self {
        Self {
            lanes,
            delay_tx,
            registry,
            health,
            metrics,
            shutdown,
            idle_timeout,
            backoff_base,
        }
    }

    /// Run the dispatch loop until shutdown is signalled, then drain whatever
    /// is already laned before returning (graceful drain, not an abrupt
    /// kill). Blocks the current thread; tests drive it directly.
    pub(crate) fn run(&mut self) {
        info!("dispatch worker started");

        loop {
            match self.shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => break,
            }

            match self.next_envelope() {
                Some(envelope) => self.dispatch(envelope),
                // All lanes empty: park until work may exist or shutdown
                None => match self.shutdown.recv_timeout(self.idle_timeout) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                },
            }
        }

        let mut drained = 0usize;
        while let Some(envelope) = self.next_envelope() {
            self.dispatch(envelope);
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "drained remaining envelopes during shutdown");
        }

        info!("dispatch worker stopped");
    }

    /// Take the next envelope, strictly Critical, High, Normal, Low.
    fn next_envelope(&self) -> Option<Envelope> {
        self.lanes.iter().find_map(|lane| lane.try_recv().ok())
    }

    fn dispatch(&mut self, envelope: Envelope) {
        debug!(
            envelope_id = %envelope.id,
            kind = envelope.kind.as_str(),
            priority = envelope.priority.as_str(),
            attempt = envelope.retry_count + 1,
            "dispatching envelope"
        );

        let outcome = match self.registry.get(envelope.kind) {
            Some(handler) => handler.handle(&envelope),
            None => Err(HandlerError::new(format!(
                "no handler registered for kind {}",
                envelope.kind.as_str()
            ))),
        };

        match outcome {
            Ok(()) => {
                self.health.record_processed();
                self.metrics.record_processed(envelope.kind);
            }
            Err(err) => self.handle_failure(envelope, &err),
        }

        for (priority, lane) in Priority::DISPATCH_ORDER.iter().zip(&self.lanes) {
            self.metrics.set_lane_depth(*priority, lane.len() as u64);
        }
    }

    /// Retry with exponential backoff while the budget allows; dead-letter
    /// once `retry_count` exceeds `max_retries`. Dead-letters are observable
    /// through health stats and logs only — there is no separate store.
    fn handle_failure(&mut self, mut envelope: Envelope, err: &HandlerError) {
        envelope.record_failure();
        self.health.record_error(format!(
            "{} {} attempt {} failed: {err}",
            envelope.kind.as_str(),
            envelope.id,
            envelope.retry_count,
        ));

        if envelope.can_retry() {
            let delay = envelope.backoff(self.backoff_base);
            warn!(
                envelope_id = %envelope.id,
                kind = envelope.kind.as_str(),
                retry_count = envelope.retry_count,
                delay_ms = delay.as_millis() as u64,
                "handler failed, scheduling retry"
            );
            envelope.not_before =
                Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
            self.metrics.record_retried(envelope.kind);
            self.health.delay_added();
            if let Err(e) = self.delay_tx.send(envelope) {
                self.health.delay_removed();
                error!(envelope_id = %e.0.id, "delay store closed, retry dropped");
            }
        } else {
            error!(
                envelope_id = %envelope.id,
                kind = envelope.kind.as_str(),
                retry_count = envelope.retry_count,
                "retry budget exhausted, envelope dead-lettered"
            );
            self.metrics.record_dead_letter(envelope.kind);
            self.health.record_dead_letter();
        }
    }
}
