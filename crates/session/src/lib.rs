//! # Partyline Session Crate
//!
//! Client side of the chat delivery core. The session manager sits
//! between the UI layer and the transport: sends go out optimistically
//! and reconcile against relay deliveries and persistence confirmations;
//! typing presence is debounced locally and tracked per room for remote
//! users.

pub mod buffer;
pub mod manager;
pub mod typing;

// Re-export main types for convenience
pub use buffer::ReconciliationBuffer;
pub use manager::{SessionManager, SessionNotice};
pub use typing::{TypingRoster, TypingTracker};
