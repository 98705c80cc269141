use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default retry budget for a new envelope.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Discriminates which registered handler processes an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Notification,
    AnalyticsProcessing,
    AuditLog,
    CacheInvalidation,
    QueueStateChange,
    Email,
    Webhook,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Notification => "notification",
            MessageKind::AnalyticsProcessing => "analytics_processing",
            MessageKind::AuditLog => "audit_log",
            MessageKind::CacheInvalidation => "cache_invalidation",
            MessageKind::QueueStateChange => "queue_state_change",
            MessageKind::Email => "email",
            MessageKind::Webhook => "webhook",
        }
    }
}

/// Dispatch priority. Lanes are drained strictly in descending order, so
/// `Low` envelopes can wait indefinitely under sustained `Critical` load —
/// an intentional trade-off relied on by notification urgency tiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// All priorities in dispatch order (highest first).
    pub const DISPATCH_ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Clamp a numeric priority (0 = Low .. 3 = Critical) into range.
    pub fn from_index(index: i64) -> Self {
        match index {
            i64::MIN..=0 => Priority::Low,
            1 => Priority::Normal,
            2 => Priority::High,
            _ => Priority::Critical,
        }
    }

    /// Index of this priority's lane. Lane 0 is drained first.
    pub fn lane_index(&self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// One unit of asynchronous work: kind, priority, retry budget, scheduling
/// time and free-form metadata. Created by a producer, moved through a lane
/// or the delay store, then dispatched to the handler registered for its
/// kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub id: Uuid,
    pub kind: MessageKind,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Earliest dispatch time. `None` means immediately eligible.
    pub not_before: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl Envelope {
    pub fn new(kind: MessageKind, created_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            priority: Priority::Normal,
            created_at: Utc::now(),
            created_by: created_by.into(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            not_before: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record a failed dispatch attempt.
    pub(crate) fn record_failure(&mut self) {
        self.retry_count += 1;
    }

    /// Whether the envelope may be re-dispatched. `retry_count <= max_retries`
    /// must hold before any re-dispatch; exceeding the budget is terminal.
    pub(crate) fn can_retry(&self) -> bool {
        self.retry_count <= self.max_retries
    }

    /// Exponential backoff for the current retry count: `base * 2^retry_count`.
    /// The exponent is capped at 16 to keep the shift from overflowing.
    pub(crate) fn backoff(&self, base: Duration) -> Duration {
        base * (1u32 << self.retry_count.min(16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_envelope_defaults() {
        let env = Envelope::new(MessageKind::Notification, "join-service");
        assert_eq!(env.priority, Priority::Normal);
        assert_eq!(env.retry_count, 0);
        assert_eq!(env.max_retries, DEFAULT_MAX_RETRIES);
        assert!(env.not_before.is_none());
        assert_eq!(env.created_by, "join-service");
    }

    #[test]
    fn envelope_ids_are_unique_and_time_ordered() {
        let ids: Vec<Uuid> = (0..50)
            .map(|_| Envelope::new(MessageKind::AuditLog, "test").id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 50);
        assert_eq!(ids, sorted, "UUIDv7 ids should be time-ordered");
    }

    #[test]
    fn priority_from_index_clamps() {
        assert_eq!(Priority::from_index(-5), Priority::Low);
        assert_eq!(Priority::from_index(0), Priority::Low);
        assert_eq!(Priority::from_index(1), Priority::Normal);
        assert_eq!(Priority::from_index(2), Priority::High);
        assert_eq!(Priority::from_index(3), Priority::Critical);
        assert_eq!(Priority::from_index(99), Priority::Critical);
    }

    #[test]
    fn priority_ordering_matches_dispatch_order() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        for (i, p) in Priority::DISPATCH_ORDER.iter().enumerate() {
            assert_eq!(p.lane_index(), i);
        }
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let mut env = Envelope::new(MessageKind::Email, "test");
        let base = Duration::from_secs(1);

        env.record_failure();
        assert_eq!(env.backoff(base), Duration::from_secs(2));
        env.record_failure();
        assert_eq!(env.backoff(base), Duration::from_secs(4));
        env.record_failure();
        assert_eq!(env.backoff(base), Duration::from_secs(8));
    }

    #[test]
    fn retry_budget_is_inclusive() {
        let mut env = Envelope::new(MessageKind::Webhook, "test").with_max_retries(3);
        for _ in 0..3 {
            env.record_failure();
            assert!(env.can_retry());
        }
        env.record_failure();
        assert!(!env.can_retry(), "fourth failure exhausts the budget");
    }

    #[test]
    fn envelope_serializes() {
        let env = Envelope::new(MessageKind::CacheInvalidation, "cancel-service")
            .with_metadata("queue_id", "q1");
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }
}
