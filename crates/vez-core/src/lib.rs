pub mod broker;
pub mod envelope;
pub mod error;
pub mod events;
pub mod queue;
pub mod telemetry;

pub use broker::{Broker, BrokerConfig, HandlerRegistry, HealthStatus, MessageHandler};
pub use envelope::{Envelope, MessageKind, Priority};
pub use error::{BrokerError, BrokerResult, HandlerError, QueueError, QueueResult};
pub use events::QueueEvent;
pub use queue::{EntryStatus, QueueEntry, ServiceQueue};
