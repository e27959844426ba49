//! Wire event contract carried over the connection-oriented transport.
//!
//! Names are semantic, not transport framing: the relay serializes these
//! as tagged JSON over whatever connection the embedding server provides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Events sent from a client connection to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Register this connection as a member of a room
    JoinRoom { chat_id: String },
    /// Publish a message to a room
    SendMessage {
        chat_id: String,
        content: String,
        /// Creation time of the sender's optimistic copy; receivers use it
        /// for the dedup proximity check
        client_timestamp: DateTime<Utc>,
    },
    /// Typing presence; `is_typing: false` is the stop signal
    Typing { chat_id: String, is_typing: bool },
}

/// Events sent from the relay to client connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First event on a new connection
    Hello { connection_id: String },
    /// Acknowledges a `JoinRoom`
    Joined { chat_id: String },
    /// A message published to a room this connection is a member of
    MessageDelivered { chat_id: String, message: ChatMessage },
    /// Persistence acknowledged the sender's message; carries the
    /// server-assigned id (sent to the origin connection only)
    MessageConfirmed { chat_id: String, message: ChatMessage },
    /// Persistence rejected or timed out on the sender's message; the
    /// origin rolls back its optimistic copy
    SaveFailed { chat_id: String, message: ChatMessage },
    /// Typing presence of another member
    Typing {
        chat_id: String,
        user_id: String,
        is_typing: bool,
    },
    /// Non-fatal processing error scoped to a single event
    Error { message: String },
}
