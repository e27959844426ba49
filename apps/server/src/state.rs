use std::sync::Arc;

use partyline_relay::{MessageRelay, RoomRegistry};

/// Shared state handed to every connection handler.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<MessageRelay>,
    registry: Arc<RoomRegistry>,
    outbound_buffer: usize,
}

impl AppState {
    pub fn new(
        relay: Arc<MessageRelay>,
        registry: Arc<RoomRegistry>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            relay,
            registry,
            outbound_buffer,
        }
    }

    pub fn relay(&self) -> &MessageRelay {
        &self.relay
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }
}
