//! Message and presence entities shared by the relay and session layers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, DeliveryResult};

/// Two messages with the same sender and content are treated as one
/// delivery when their timestamps fall within this window.
pub const DEDUP_WINDOW_MS: i64 = 1000;

/// Idle time after the last keystroke before a typing signal expires.
pub const TYPING_IDLE_MS: u64 = 1000;

/// Upper bound on message content accepted by the core.
pub const MAX_CONTENT_BYTES: usize = 4096;

/// Identity of a message author as rendered by receivers.
///
/// Carries enough profile data that a receiving client can display the
/// message without a user lookup; the profile store itself is an external
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Stable user identifier
    pub id: String,
    /// Name shown next to the message
    pub display_name: String,
    /// Avatar reference, if the user has one
    pub avatar_url: Option<String>,
}

impl Sender {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// Durability state of a message as seen by the client that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Shown optimistically, persistence not yet acknowledged
    Pending,
    /// Persistence acknowledged and the relay has broadcast it
    Confirmed,
    /// Persistence rejected or timed out; stamped on the copy carried by
    /// `save_failed`, after which the entry leaves the visible log
    Failed,
}

/// A chat message moving through the delivery core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned id; absent until the persistence gateway stamps one
    pub id: Option<String>,
    /// Room this message belongs to
    pub chat_id: String,
    /// Author identity
    pub sender: Sender,
    /// Message body
    pub content: String,
    /// Client-side creation time; also the dedup proximity anchor
    pub created_at: DateTime<Utc>,
    /// Durability state
    pub delivery: DeliveryState,
}

impl ChatMessage {
    /// Create an optimistic message at send time.
    pub fn pending(chat_id: impl Into<String>, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: None,
            chat_id: chat_id.into(),
            sender,
            content: content.into(),
            created_at: Utc::now(),
            delivery: DeliveryState::Pending,
        }
    }

    /// Check whether this message was authored by the given user.
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender.id == user_id
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, DeliveryState::Pending)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.delivery, DeliveryState::Confirmed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, DeliveryState::Failed)
    }

    /// Duplicate-delivery check.
    ///
    /// Without a client idempotency key the only reliable identity on the
    /// fast path is sender + exact content + timestamp proximity; the
    /// server-assigned id may not exist yet on either side.
    pub fn is_duplicate_of(&self, other: &ChatMessage) -> bool {
        if self.chat_id != other.chat_id || self.sender.id != other.sender.id {
            return false;
        }
        if self.content != other.content {
            return false;
        }
        let delta = (self.created_at - other.created_at).num_milliseconds().abs();
        delta < DEDUP_WINDOW_MS
    }

    /// Mark this message confirmed, adopting the server-assigned id.
    pub fn confirm(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
        self.delivery = DeliveryState::Confirmed;
    }

    /// Mark this message failed after a rejected or timed-out save.
    pub fn mark_failed(&mut self) {
        self.delivery = DeliveryState::Failed;
    }
}

/// Ephemeral typing presence for one user in one room.
///
/// Unique per `(chat_id, user_id)`; a fresh signal replaces the previous
/// one rather than accumulating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingSignal {
    pub chat_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl TypingSignal {
    pub fn new(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::expiring_in(
            chat_id,
            user_id,
            Duration::milliseconds(TYPING_IDLE_MS as i64),
        )
    }

    /// Signal with a caller-chosen time to live, e.g. a receiver-side
    /// staleness window.
    pub fn expiring_in(
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Validate message content before any network call.
///
/// Rejected content never leaves the client: empty (after trimming) and
/// oversized bodies both fail here.
pub fn validate_content(content: &str) -> DeliveryResult<()> {
    if content.trim().is_empty() {
        return Err(DeliveryError::validation("message content is empty"));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(DeliveryError::validation(format!(
            "message content exceeds {} bytes",
            MAX_CONTENT_BYTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_at(sender_id: &str, content: &str, offset_ms: i64) -> ChatMessage {
        let mut message = ChatMessage::pending("room-1", Sender::new(sender_id, sender_id), content);
        message.created_at = message.created_at + Duration::milliseconds(offset_ms);
        message
    }

    #[test]
    fn duplicate_within_window_matches() {
        let a = msg_at("alice", "hi", 0);
        let b = msg_at("alice", "hi", 999);
        assert!(b.is_duplicate_of(&a));
        assert!(a.is_duplicate_of(&b));
    }

    #[test]
    fn duplicate_outside_window_does_not_match() {
        let a = msg_at("alice", "hi", 0);
        let b = msg_at("alice", "hi", 1000);
        assert!(!b.is_duplicate_of(&a));
    }

    #[test]
    fn different_sender_or_content_never_matches() {
        let a = msg_at("alice", "hi", 0);
        assert!(!msg_at("bob", "hi", 10).is_duplicate_of(&a));
        assert!(!msg_at("alice", "hi there", 10).is_duplicate_of(&a));
    }

    #[test]
    fn different_room_never_matches() {
        let a = msg_at("alice", "hi", 0);
        let mut b = msg_at("alice", "hi", 10);
        b.chat_id = "room-2".to_string();
        assert!(!b.is_duplicate_of(&a));
    }

    #[test]
    fn confirm_stamps_id_and_state() {
        let mut message = msg_at("alice", "hi", 0);
        assert!(message.is_pending());
        message.confirm("msg-42");
        assert!(message.is_confirmed());
        assert_eq!(message.id.as_deref(), Some("msg-42"));
    }

    #[test]
    fn mark_failed_flags_the_delivery_state() {
        let mut message = msg_at("alice", "hi", 0);
        message.mark_failed();
        assert!(message.is_failed());
        assert!(message.id.is_none());
    }

    #[test]
    fn content_validation_rejects_empty_and_oversized() {
        assert!(validate_content("hello").is_ok());
        assert!(validate_content("").is_err());
        assert!(validate_content("   \n").is_err());
        assert!(validate_content(&"x".repeat(MAX_CONTENT_BYTES + 1)).is_err());
    }

    #[test]
    fn typing_signal_expires_after_idle_window() {
        let mut signal = TypingSignal::new("room-1", "alice");
        assert!(!signal.is_expired());
        signal.expires_at = Utc::now() - Duration::milliseconds(1);
        assert!(signal.is_expired());
    }
}
