use uuid::Uuid;

use crate::queue::EntryStatus;

/// Domain/state errors raised synchronously by the queue aggregate.
/// These surface to the caller immediately and are never retried — a
/// business-rule violation does not change on a second attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("cannot {action} entry in state {from:?}")]
    InvalidTransition {
        from: EntryStatus,
        action: &'static str,
    },

    #[error("queue is inactive")]
    QueueInactive,

    #[error("queue is full (max size {0})")]
    QueueFull(usize),

    #[error("entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("service duration must be positive, got {0}")]
    InvalidServiceDuration(i64),
}

/// Infrastructure errors from the broker itself. Lane write failures are
/// reported as `false` from the enqueue methods, not through this type.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Failure returned by a message handler. The broker recovers from these
/// locally via retry/backoff; they are only escalated to health stats and
/// logs once the retry budget is exhausted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
