use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

use crate::envelope::{MessageKind, Priority};

/// OTel instruments for dispatch outcomes. Created once per broker instance
/// and recorded from the dispatch loop.
pub(crate) struct Metrics {
    processed: Counter<u64>,
    retried: Counter<u64>,
    dead_lettered: Counter<u64>,
    lane_depth: Gauge<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create instruments from the global meter provider. With no provider
    /// configured (OTel disabled), the instruments are no-op.
    pub(crate) fn new() -> Self {
        let meter = opentelemetry::global::meter("vez");
        Self::from_meter(&meter)
    }

    /// Create instruments from a specific meter (tests use the SDK in-memory
    /// exporter).
    pub(crate) fn from_meter(meter: &Meter) -> Self {
        Self {
            processed: meter
                .u64_counter("vez.dispatch.processed")
                .with_description("Envelopes dispatched successfully")
                .build(),
            retried: meter
                .u64_counter("vez.dispatch.retried")
                .with_description("Dispatch attempts re-delayed after a handler failure")
                .build(),
            dead_lettered: meter
                .u64_counter("vez.dispatch.dead_lettered")
                .with_description("Envelopes abandoned after exhausting their retry budget")
                .build(),
            lane_depth: meter
                .u64_gauge("vez.lane.depth")
                .with_description("Current pending envelopes per priority lane")
                .build(),
        }
    }

    pub(crate) fn record_processed(&self, kind: MessageKind) {
        self.processed.add(1, &[KeyValue::new("kind", kind.as_str())]);
    }

    pub(crate) fn record_retried(&self, kind: MessageKind) {
        self.retried.add(1, &[KeyValue::new("kind", kind.as_str())]);
    }

    pub(crate) fn record_dead_letter(&self, kind: MessageKind) {
        self.dead_lettered
            .add(1, &[KeyValue::new("kind", kind.as_str())]);
    }

    pub(crate) fn set_lane_depth(&self, priority: Priority, depth: u64) {
        self.lane_depth
            .record(depth, &[KeyValue::new("priority", priority.as_str())]);
    }
}
