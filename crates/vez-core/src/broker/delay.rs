use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::broker::health::HealthState;
use crate::envelope::Envelope;

/// Heap entry ordered earliest-due first (reversed for the max-heap), with
/// an arrival sequence so envelopes due at the same instant promote FIFO.
struct DueEntry {
    due: DateTime<Utc>,
    seq: u64,
    envelope: Envelope,
}

impl PartialEq for DueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DueEntry {}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.due.cmp(&self.due).then(other.seq.cmp(&self.seq))
    }
}

/// Promotion worker: the sole owner of the delay store. Producers (and the
/// dispatch loop's retry path) send envelopes over `inbound`; this loop
/// holds them until due, then moves them into their priority lane through
/// the same senders producers use.
pub(crate) struct DelayWorker {
    inbound: Receiver<Envelope>,
    lanes: [Sender<Envelope>; 4],
    health: Arc<HealthState>,
    shutdown: Receiver<()>,
    scan_interval: Duration,
    heap: BinaryHeap<DueEntry>,
    seq: u64,
}

impl DelayWorker {
    pub(crate) fn new(
        inbound: Receiver<Envelope>,
        lanes: [Sender<Envelope>; 4],
        health: Arc<HealthState>,
        shutdown: Receiver<()>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            inbound,
            lanes,
            health,
            shutdown,
            scan_interval,
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Run the promotion loop until shutdown. Each scan drains newly arrived
    /// envelopes into the heap, then promotes everything already due — a
    /// zero-delay envelope is promoted on the very next scan.
    pub(crate) fn run(&mut self) {
        info!("delay worker started");

        loop {
            while let Ok(envelope) = self.inbound.try_recv() {
                self.hold(envelope);
            }
            self.promote_due(Utc::now());

            match self.shutdown.recv_timeout(self.scan_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // The store is in-process only; whatever is still pending at
        // shutdown is dropped, not persisted.
        while let Ok(envelope) = self.inbound.try_recv() {
            self.hold(envelope);
        }
        if !self.heap.is_empty() {
            info!(dropped = self.heap.len(), "delay store dropped on shutdown");
            for _ in 0..self.heap.len() {
                self.health.delay_removed();
            }
            self.heap.clear();
        }

        info!("delay worker stopped");
    }

    fn hold(&mut self, envelope: Envelope) {
        let due = envelope.not_before.unwrap_or_else(Utc::now);
        self.seq += 1;
        self.heap.push(DueEntry {
            due,
            seq: self.seq,
            envelope,
        });
    }

    fn promote_due(&mut self, now: DateTime<Utc>) {
        while self.heap.peek().is_some_and(|entry| entry.due <= now) {
            let Some(entry) = self.heap.pop() else { break };
            let envelope = entry.envelope;
            self.health.delay_removed();

            debug!(
                envelope_id = %envelope.id,
                kind = envelope.kind.as_str(),
                priority = envelope.priority.as_str(),
                "promoting delayed envelope"
            );
            let lane = &self.lanes[envelope.priority.lane_index()];
            if let Err(e) = lane.send(envelope) {
                // Only happens once the dispatch worker has exited
                warn!(envelope_id = %e.0.id, "lane closed, delayed envelope dropped");
            }
        }
    }
}
