use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::{Envelope, MessageKind, Priority};

/// Domain event emitted by a `ServiceQueue` state change. The aggregate
/// returns these to the calling use case, which decides whether to wrap
/// them into envelopes and hand them to the broker — the aggregate itself
/// never touches the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEvent {
    CustomerJoined {
        queue_id: Uuid,
        entry_id: Uuid,
        customer_id: Uuid,
        position: u32,
    },
    CustomerCalled {
        queue_id: Uuid,
        entry_id: Uuid,
        customer_id: Uuid,
        staff_member_id: Uuid,
    },
    CustomerCheckedIn {
        queue_id: Uuid,
        entry_id: Uuid,
        customer_id: Uuid,
    },
    ServiceCompleted {
        queue_id: Uuid,
        entry_id: Uuid,
        customer_id: Uuid,
        duration_minutes: i64,
    },
    EntryCancelled {
        queue_id: Uuid,
        entry_id: Uuid,
        customer_id: Uuid,
    },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::CustomerJoined { .. } => "customer_joined",
            QueueEvent::CustomerCalled { .. } => "customer_called",
            QueueEvent::CustomerCheckedIn { .. } => "customer_checked_in",
            QueueEvent::ServiceCompleted { .. } => "service_completed",
            QueueEvent::EntryCancelled { .. } => "entry_cancelled",
        }
    }

    pub fn queue_id(&self) -> Uuid {
        match self {
            QueueEvent::CustomerJoined { queue_id, .. }
            | QueueEvent::CustomerCalled { queue_id, .. }
            | QueueEvent::CustomerCheckedIn { queue_id, .. }
            | QueueEvent::ServiceCompleted { queue_id, .. }
            | QueueEvent::EntryCancelled { queue_id, .. } => *queue_id,
        }
    }

    pub fn entry_id(&self) -> Uuid {
        match self {
            QueueEvent::CustomerJoined { entry_id, .. }
            | QueueEvent::CustomerCalled { entry_id, .. }
            | QueueEvent::CustomerCheckedIn { entry_id, .. }
            | QueueEvent::ServiceCompleted { entry_id, .. }
            | QueueEvent::EntryCancelled { entry_id, .. } => *entry_id,
        }
    }

    /// Wrap this event as a broker envelope. `CustomerCalled` rides the High
    /// lane — the "you're up" notification is the latency-sensitive one.
    pub fn into_envelope(self, created_by: impl Into<String>) -> Envelope {
        let priority = match self {
            QueueEvent::CustomerCalled { .. } => Priority::High,
            _ => Priority::Normal,
        };

        let mut envelope = Envelope::new(MessageKind::QueueStateChange, created_by)
            .with_priority(priority)
            .with_metadata("event", self.name())
            .with_metadata("queue_id", self.queue_id().to_string())
            .with_metadata("entry_id", self.entry_id().to_string());

        match &self {
            QueueEvent::CustomerJoined {
                customer_id,
                position,
                ..
            } => {
                envelope = envelope
                    .with_metadata("customer_id", customer_id.to_string())
                    .with_metadata("position", position.to_string());
            }
            QueueEvent::CustomerCalled {
                customer_id,
                staff_member_id,
                ..
            } => {
                envelope = envelope
                    .with_metadata("customer_id", customer_id.to_string())
                    .with_metadata("staff_member_id", staff_member_id.to_string());
            }
            QueueEvent::CustomerCheckedIn { customer_id, .. }
            | QueueEvent::EntryCancelled { customer_id, .. } => {
                envelope = envelope.with_metadata("customer_id", customer_id.to_string());
            }
            QueueEvent::ServiceCompleted {
                customer_id,
                duration_minutes,
                ..
            } => {
                envelope = envelope
                    .with_metadata("customer_id", customer_id.to_string())
                    .with_metadata("duration_minutes", duration_minutes.to_string());
            }
        }

        envelope
    }
}
