use std::collections::HashMap;

use crate::envelope::{Envelope, MessageKind};
use crate::error::HandlerError;

/// The seam where infrastructure plugs in: one handler per message kind
/// (SMS gateway, audit log writer, cache invalidator, ...). The broker is
/// agnostic to the implementation; a failure return triggers retry/backoff.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        self(envelope)
    }
}

/// Static dispatch table from message kind to handler. Built by the host
/// before the broker starts and immutable afterwards — handlers are resolved
/// by enum key, never by runtime type inspection.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageKind, Box<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a kind, replacing any previous one.
    pub fn register(&mut self, kind: MessageKind, handler: impl MessageHandler + 'static) {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn get(&self, kind: MessageKind) -> Option<&dyn MessageHandler> {
        self.handlers.get(&kind).map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
