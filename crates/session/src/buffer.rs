//! Client-side reconciliation buffer.
//!
//! One ordered message log per displayed room, merging locally-originated
//! optimistic entries with relay-delivered ones. Because the relay never
//! waits on persistence, the sender's optimistic copy races the relay's
//! echo; the sender+content+time-window rule is the only dedup key
//! available before a server id exists.

use tracing::debug;

use partyline_core::{ChatMessage, DeliveryState};

/// Ordered sequence of messages for one room.
#[derive(Debug)]
pub struct ReconciliationBuffer {
    chat_id: String,
    entries: Vec<ChatMessage>,
}

impl ReconciliationBuffer {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Insert a locally-sent message immediately, before any network round
    /// trip completes.
    pub fn append_optimistic(&mut self, message: ChatMessage) {
        debug_assert!(message.is_pending());
        self.entries.push(message);
    }

    /// Merge a message arriving from the relay.
    ///
    /// Returns `true` if the message was appended, `false` if it was a
    /// duplicate of an existing entry. A duplicate discards the incoming
    /// copy but may promote the kept entry: if the incoming copy carries a
    /// server id or confirmed state, the existing entry adopts it.
    pub fn merge_incoming(&mut self, message: ChatMessage) -> bool {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|entry| message.is_duplicate_of(entry))
        {
            if existing.id.is_none() {
                if let Some(id) = &message.id {
                    existing.id = Some(id.clone());
                }
            }
            if message.is_confirmed() {
                existing.delivery = DeliveryState::Confirmed;
            }
            debug!(chat_id = %self.chat_id, "duplicate delivery discarded");
            return false;
        }
        self.entries.push(message);
        true
    }

    /// Remove a failed optimistic entry, returning its content so the
    /// input field can be restored for a retry.
    ///
    /// Matches the exact entry (sender, content, and creation instant),
    /// never a near-duplicate.
    pub fn rollback(&mut self, message: &ChatMessage) -> Option<String> {
        let position = self.entries.iter().position(|entry| {
            entry.sender.id == message.sender.id
                && entry.content == message.content
                && entry.created_at == message.created_at
        })?;
        let removed = self.entries.remove(position);
        debug!(chat_id = %self.chat_id, "rolled back failed send");
        Some(removed.content)
    }

    /// Mark the pending entry matching a persistence confirmation as
    /// confirmed, adopting the server-assigned id.
    pub fn apply_confirmation(&mut self, confirmed: &ChatMessage) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| confirmed.is_duplicate_of(entry))
        {
            if let Some(id) = &confirmed.id {
                entry.id = Some(id.clone());
            }
            entry.delivery = DeliveryState::Confirmed;
        }
    }

    /// Fill gaps from a gateway-fetched history page, e.g. after a
    /// reconnect. Runs every fetched message through the dedup rule so
    /// entries already displayed (including still-pending optimistic ones)
    /// are kept rather than duplicated.
    pub fn resync(&mut self, history: Vec<ChatMessage>) {
        for message in history {
            self.merge_incoming(message);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
