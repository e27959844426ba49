//! # Partyline Core Crate
//!
//! Domain entities and the wire contract for the Partyline chat delivery
//! core: messages with delivery state, typing signals, the client/server
//! event enums carried over the (externally provided) transport, the error
//! taxonomy, and the persistence-gateway seam.
//!
//! The crates built on top of this split along the connection boundary:
//! `partyline-relay` is the server side (membership + fan-out) and
//! `partyline-session` is the client side (reconciliation + presence).

pub mod error;
pub mod events;
pub mod gateway;
pub mod message;

// Re-export main types for convenience
pub use error::{DeliveryError, DeliveryResult};
pub use events::{ClientEvent, ServerEvent};
pub use gateway::PersistenceGateway;
pub use message::{
    validate_content, ChatMessage, DeliveryState, Sender, TypingSignal, DEDUP_WINDOW_MS,
    MAX_CONTENT_BYTES, TYPING_IDLE_MS,
};
