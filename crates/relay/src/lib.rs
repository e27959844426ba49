//! # Partyline Relay Crate
//!
//! Server side of the chat delivery core: tracks which connections belong
//! to which room and fans published messages and typing signals out to the
//! other members. Fan-out goes over an explicit mpsc channel per
//! connection, registered at join time, so a dropped connection cannot
//! leak a subscription across reconnects.
//!
//! Persistence runs off the broadcast path: `publish` returns as soon as
//! the room has been fanned out, and the save result comes back to the
//! origin connection as a `message_confirmed` or `save_failed` event.

pub mod gateway;
pub mod registry;
pub mod relay;

// Re-export main types for convenience
pub use gateway::MemoryGateway;
pub use registry::{ConnectionId, RoomRegistry};
pub use relay::MessageRelay;
